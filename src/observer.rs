use base::fmt;
use base::marker::PhantomData;
use base::mem;
use base::pin::Pin;
use base::ptr::NonNull;

use crate::control::{Backref, ControlBlock};
use crate::{Expired, ObserverCounted, Owner};

/// A non-owning handle to the value inside an [`Owner`].
///
/// An observer never keeps the value alive. It resolves to a pointer to the value while the owner
/// it was made from (or the owner that took over its registration) is pinned and alive, and
/// reports itself [expired](Observer::expired) otherwise.
///
/// Observers are neither `Send` nor `Sync`: the observer count is not synchronized.
pub struct Observer<T> {
    control: Option<NonNull<ControlBlock<T>>>,
    phantom: PhantomData<ControlBlock<T>>,
}

impl<T> Observer<T> {
    /// An observer of nothing. It is always expired.
    pub const fn new() -> Observer<T> {
        Observer { control: None, phantom: PhantomData }
    }

    /// Observe a pinned owner.
    ///
    /// The owner is [attached](Owner::attach) so that its observers resolve to it. An owner that
    /// gave its registration away yields an observer that is expired from the start.
    pub fn observe(owner: Pin<&Owner<T>>) -> Observer<T> {
        owner.attach();
        let control = owner.get_ref().registration();
        if let Some(block) = control {
            unsafe { block.as_ref() }.add_observer();
        }
        Observer { control, phantom: PhantomData }
    }

    #[inline]
    fn control(&self) -> Option<&ControlBlock<T>> {
        // Every observer holding a block accounts for one count, which keeps the block alive.
        self.control.map(|block| unsafe { &*block.as_ptr() })
    }

    /// Observe `owner` instead of the current target.
    pub fn assign(&mut self, owner: Pin<&Owner<T>>) {
        let mut temp = Observer::observe(owner);
        self.swap(&mut temp);
    }

    /// A pointer to the observed value, or `None` if the observer has expired.
    ///
    /// Dereferencing the pointer is only sound while the owner stays alive and no `&mut` to the
    /// value exists.
    pub fn get(&self) -> Option<NonNull<T>> {
        match self.control()?.owner() {
            Backref::Bound(owner) => Some(unsafe { Owner::value_ptr(owner) }),
            Backref::Detached | Backref::Lost => None,
        }
    }

    /// Like [`get`](Observer::get), reporting expiry as an error.
    pub fn try_get(&self) -> Result<NonNull<T>, Expired> {
        self.get().ok_or(Expired)
    }

    /// Borrow the observed value.
    ///
    /// # Safety
    ///
    /// For as long as the returned reference lives, the owner must neither be dropped nor give
    /// out mutable access to its value.
    pub unsafe fn as_ref(&self) -> Option<&T> {
        self.get().map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    #[inline]
    pub fn valid(&self) -> bool {
        !self.expired()
    }

    /// Whether the observed value is unreachable, either because this observer holds no control
    /// block or because the block has no attached owner.
    pub fn expired(&self) -> bool {
        match self.control() {
            Some(control) => !matches!(control.owner(), Backref::Bound(_)),
            None => true,
        }
    }

    /// The number of observers sharing this observer's control block, or zero if it holds none.
    pub fn use_count(&self) -> usize {
        self.control().map_or(0, ControlBlock::observer_count)
    }

    /// Stop observing. Does nothing on an observer that holds no control block.
    pub fn release(&mut self) {
        if let Some(block) = self.control.take() {
            unsafe { ControlBlock::remove_observer(block) };
        }
    }

    /// Move the registration out, leaving a released observer behind.
    pub fn take(&mut self) -> Observer<T> {
        mem::take(self)
    }

    /// Exchange targets with `other`. Observer counts stay as they are.
    pub fn swap(&mut self, other: &mut Observer<T>) {
        mem::swap(&mut self.control, &mut other.control);
    }

    /// Whether both observers share a control block.
    pub fn ptr_eq(&self, other: &Observer<T>) -> bool {
        match (self.control, other.control) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl<T> Clone for Observer<T> {
    /// Makes another observer of the same target, increasing the observer count.
    fn clone(&self) -> Observer<T> {
        if let Some(control) = self.control() {
            control.add_observer();
        }
        Observer { control: self.control, phantom: PhantomData }
    }

    /// Copy-and-swap: the temporary takes the old target with it when it drops.
    fn clone_from(&mut self, source: &Observer<T>) {
        let mut temp = source.clone();
        self.swap(&mut temp);
    }
}

impl<T> Drop for Observer<T> {
    /// Drops the `Observer`, decreasing the observer count.
    ///
    /// The last observer of a control block whose owner is gone frees the block.
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> Default for Observer<T> {
    fn default() -> Observer<T> {
        Observer::new()
    }
}

impl<'a, T> From<Pin<&'a Owner<T>>> for Observer<T> {
    fn from(owner: Pin<&'a Owner<T>>) -> Self {
        Observer::observe(owner)
    }
}

impl<T> ObserverCounted for Observer<T> {
    fn observer_count(this: &Self) -> usize {
        this.use_count()
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("expired", &self.expired())
            .field("use_count", &self.use_count())
            .finish()
    }
}

use base::borrow;
use base::cell::{Cell, UnsafeCell};
use base::cmp::Ordering;
use base::fmt;
use base::hash::{Hash, Hasher};
use base::marker::PhantomPinned;
use base::mem::{self, ManuallyDrop};
use base::ops::Deref;
use base::pin::Pin;
use base::ptr::{self, NonNull};

use log::trace;

use crate::control::{Backref, ControlBlock};
use crate::{Observer, ObserverCounted};

/// A value that can be watched by [`Observer`]s.
///
/// The value lives inside the `Owner`, not on the heap. Only the small control block shared with
/// the observers is allocated. Observers can resolve the value only while the owner is pinned,
/// which keeps its address stable until it is dropped:
///
/// ```
/// use std::pin::pin;
/// use value_observer::{Observer, Owner};
///
/// let observer = {
///     let owner = pin!(Owner::new(42));
///     let observer = Observer::observe(owner.as_ref());
///     assert_eq!(unsafe { observer.as_ref() }, Some(&42));
///     observer
/// };
///
/// assert!(observer.expired());
/// assert_eq!(observer.get(), None);
/// ```
pub struct Owner<T> {
    value: UnsafeCell<T>,
    // A `Cell` so that `transfer` can take the registration away from a shared source.
    control: Cell<Option<NonNull<ControlBlock<T>>>>,
    _pinned: PhantomPinned,
}

impl<T> Owner<T> {
    /// Wrap `value` and allocate a fresh control block for it.
    pub fn new(value: T) -> Owner<T> {
        Owner::from_parts(value, Some(ControlBlock::allocate()))
    }

    fn from_parts(value: T, control: Option<NonNull<ControlBlock<T>>>) -> Owner<T> {
        Owner {
            value: UnsafeCell::new(value),
            control: Cell::new(control),
            _pinned: PhantomPinned,
        }
    }

    #[inline]
    fn control(&self) -> Option<&ControlBlock<T>> {
        // While an owner holds a block, the block cannot be lost, so it is alive.
        self.control.get().map(|block| unsafe { &*block.as_ptr() })
    }

    /// Give up the control block and leave it detached, ready to be handed to another owner.
    fn take_registration(&self) -> Option<NonNull<ControlBlock<T>>> {
        let control = self.control.take();
        if let Some(block) = control {
            unsafe { block.as_ref() }.rebind_owner(Backref::Detached);
            trace!("owner {:p} gave up control block {:p}", self, block);
        }
        control
    }

    /// Record this pinned owner as the target its observers resolve to.
    ///
    /// Observing a pinned owner attaches it implicitly, so this is only needed for an owner that
    /// took over a registration through [`transfer`](Owner::transfer), [`replace`](Owner::replace)
    /// or [`take`](Owner::take), to make the existing observers resolve again.
    pub fn attach(self: Pin<&Self>) {
        if let Some(control) = self.control() {
            control.rebind_owner(Backref::Bound(NonNull::from(self.get_ref())));
        }
    }

    /// Create an observer of this owner.
    pub fn observer(self: Pin<&Self>) -> Observer<T> {
        Observer::observe(self)
    }

    /// Copy the value into a new owner that takes over this owner's registration.
    ///
    /// Existing observers stay registered with the control block but are expired until the new
    /// owner is pinned and [attached](Owner::attach); they then resolve into the new owner. This
    /// owner keeps its value and no longer participates: its [`use_count`](Owner::use_count) is
    /// zero and observers made from it afterwards are expired from the start.
    ///
    /// ```
    /// use std::pin::pin;
    /// use value_observer::Owner;
    ///
    /// let a = pin!(Owner::new(String::from("a")));
    /// let observer = a.as_ref().observer();
    ///
    /// let b = pin!(a.transfer());
    /// assert!(observer.expired());
    ///
    /// b.as_ref().attach();
    /// assert_eq!(observer.get(), Some(b.as_ptr()));
    /// assert_eq!(b.use_count(), 1);
    /// assert_eq!(a.use_count(), 0);
    /// ```
    pub fn transfer(&self) -> Owner<T>
    where
        T: Clone,
    {
        let value = self.get().clone();
        Owner::from_parts(value, self.take_registration())
    }

    /// Move the value into a new owner that takes over this owner's registration, leaving `value`
    /// in its place.
    ///
    /// This is how a pinned owner is moved. As with [`transfer`](Owner::transfer), the new owner
    /// must be attached before the observers resolve again.
    pub fn replace(self: Pin<&mut Self>, value: T) -> Owner<T> {
        // The value is not structurally pinned, and the registration moves along with it.
        let this = unsafe { self.get_unchecked_mut() };
        let value = mem::replace(this.value.get_mut(), value);
        Owner::from_parts(value, this.take_registration())
    }

    /// Like [`replace`](Owner::replace), leaving the default value behind.
    pub fn take(self: Pin<&mut Self>) -> Owner<T>
    where
        T: Default,
    {
        self.replace(T::default())
    }

    /// Overwrite the value in place. Observers and the registration are left alone.
    pub fn assign(self: Pin<&mut Self>, value: T) {
        *self.get_pinned_mut() = value;
    }

    #[inline]
    pub fn get(&self) -> &T {
        // Shared access through observers goes through `unsafe`, whose callers promise not to
        // alias a `&mut` handed out below.
        unsafe { &*self.value.get() }
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    #[inline]
    pub fn get_pinned_mut(self: Pin<&mut Self>) -> &mut T {
        unsafe { self.get_unchecked_mut() }.value.get_mut()
    }

    /// A raw pointer to the value, the same pointer attached observers resolve to.
    #[inline]
    pub fn as_ptr(&self) -> NonNull<T> {
        unsafe { NonNull::new_unchecked(self.value.get()) }
    }

    /// Resolve the value pointer of an owner without creating a reference to it.
    ///
    /// # Safety
    ///
    /// `this` must point to a live owner.
    #[inline]
    pub(crate) unsafe fn value_ptr(this: NonNull<Self>) -> NonNull<T> {
        let cell = unsafe { ptr::addr_of!((*this.as_ptr()).value) };
        unsafe { NonNull::new_unchecked(UnsafeCell::raw_get(cell)) }
    }

    /// Hand out the control block for a new observer.
    pub(crate) fn registration(&self) -> Option<NonNull<ControlBlock<T>>> {
        self.control.get()
    }

    /// The number of observers registered with this owner, or zero if it holds no registration.
    pub fn use_count(&self) -> usize {
        self.control().map_or(0, ControlBlock::observer_count)
    }

    /// Whether this owner still holds a control block.
    pub fn is_registered(&self) -> bool {
        self.control.get().is_some()
    }

    /// Unwrap the value. All observers expire.
    pub fn into_inner(self) -> T {
        let this = ManuallyDrop::new(self);
        this.release_registration();
        unsafe { ptr::read(this.value.get()) }
    }

    fn release_registration(&self) {
        if let Some(block) = self.control.take() {
            unsafe { ControlBlock::register_owner_loss(block) };
        }
    }
}

impl<T> Drop for Owner<T> {
    /// Drops the `Owner` and the value.
    ///
    /// Observers expire. The control block is freed here unless observers still refer to it, in
    /// which case the last of them frees it.
    fn drop(&mut self) {
        self.release_registration();
    }
}

impl<T: Clone> Clone for Owner<T> {
    /// Copy the value into an independent owner with a fresh control block.
    ///
    /// Observers of `self` are unaffected. Use [`transfer`](Owner::transfer) to move them over.
    fn clone(&self) -> Owner<T> {
        Owner::new(self.get().clone())
    }
}

impl<T> ObserverCounted for Owner<T> {
    fn observer_count(this: &Self) -> usize {
        this.use_count()
    }
}

impl<T> Deref for Owner<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.get()
    }
}

impl<T> borrow::Borrow<T> for Owner<T> {
    fn borrow(&self) -> &T {
        self.get()
    }
}

impl<T> AsRef<T> for Owner<T> {
    fn as_ref(&self) -> &T {
        self.get()
    }
}

impl<T: fmt::Display> fmt::Display for Owner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.get(), f)
    }
}

impl<T: fmt::Debug> fmt::Debug for Owner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("value", self.get())
            .field("use_count", &self.use_count())
            .finish()
    }
}

impl<T: Default> Default for Owner<T> {
    /// Creates a new `Owner<T>`, with the `Default` value for `T`.
    fn default() -> Owner<T> {
        Owner::new(T::default())
    }
}

impl<T> From<T> for Owner<T> {
    fn from(value: T) -> Self {
        Owner::new(value)
    }
}

impl<T: PartialEq> PartialEq for Owner<T> {
    /// Two `Owner`s are equal if their values are equal, regardless of their observers.
    #[inline]
    fn eq(&self, other: &Owner<T>) -> bool {
        self.get().eq(other.get())
    }
}

impl<T: Eq> Eq for Owner<T> {}

impl<T: PartialOrd> PartialOrd for Owner<T> {
    fn partial_cmp(&self, other: &Owner<T>) -> Option<Ordering> {
        self.get().partial_cmp(other.get())
    }
}

impl<T: Ord> Ord for Owner<T> {
    fn cmp(&self, other: &Owner<T>) -> Ordering {
        self.get().cmp(other.get())
    }
}

impl<T: Hash> Hash for Owner<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.get().hash(state)
    }
}

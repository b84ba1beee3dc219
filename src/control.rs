use alloc::boxed::Box;

use base::cell::Cell;
use base::fmt;
use base::ptr::NonNull;

use log::trace;

use crate::Owner;

/// Where the control block currently finds its owner.
pub(crate) enum Backref<T> {
    /// The owner that held this block is gone.
    Lost,
    /// An owner holds this block but has not been attached at a stable address yet.
    Detached,
    /// An owner holds this block and is pinned at this address.
    Bound(NonNull<Owner<T>>),
}

impl<T> Clone for Backref<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Backref<T> {}

impl<T> fmt::Debug for Backref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backref::Lost => f.write_str("Lost"),
            Backref::Detached => f.write_str("Detached"),
            Backref::Bound(ptr) => f.debug_tuple("Bound").field(ptr).finish(),
        }
    }
}

/// The record shared between one `Owner` and its `Observer`s.
///
/// Nobody owns a control block. It frees itself once its owner is lost and the last observer has
/// been removed, see `try_destroy`.
pub(crate) struct ControlBlock<T> {
    owner: Cell<Backref<T>>,
    observers: Cell<usize>,
}

#[cfg(test)]
std::thread_local! {
    pub(crate) static LIVE_BLOCKS: Cell<usize> = Cell::new(0);
}

#[cfg(test)]
pub(crate) fn live_blocks() -> usize {
    LIVE_BLOCKS.with(|live| live.get())
}

impl<T> ControlBlock<T> {
    /// Allocate a fresh block with no observers, held by an owner that is not attached yet.
    pub(crate) fn allocate() -> NonNull<Self> {
        let block = Box::leak(Box::new(ControlBlock {
            owner: Cell::new(Backref::Detached),
            observers: Cell::new(0),
        }));

        #[cfg(test)]
        LIVE_BLOCKS.with(|live| live.set(live.get() + 1));

        trace!("allocated control block {:p}", block);
        NonNull::from(block)
    }

    #[inline]
    pub(crate) fn owner(&self) -> Backref<T> {
        self.owner.get()
    }

    /// Point the block at a different owner state. The observer count is not touched.
    #[inline]
    pub(crate) fn rebind_owner(&self, owner: Backref<T>) {
        self.owner.set(owner);
    }

    #[inline]
    pub(crate) fn observer_count(&self) -> usize {
        self.observers.get()
    }

    #[inline]
    pub(crate) fn add_observer(&self) {
        let observers = self.observers.get();

        // Only reachable by leaking handles. We panic rather than wrap around, since a wrapped
        // count would free the block under the feet of live observers.
        if observers == usize::MAX {
            panic!("observer count overflow");
        }
        self.observers.set(observers + 1);
    }

    /// Signal that the owner holding this block is gone.
    ///
    /// # Safety
    ///
    /// `this` must point to a live block, and the caller must be the owner holding it. The block
    /// may be freed by this call; `this` must not be used afterwards.
    pub(crate) unsafe fn register_owner_loss(this: NonNull<Self>) {
        unsafe { this.as_ref() }.owner.set(Backref::Lost);
        unsafe { Self::try_destroy(this) };
    }

    /// Remove one observer.
    ///
    /// # Safety
    ///
    /// `this` must point to a live block, and every call must be matched by an earlier
    /// `add_observer`. The block may be freed by this call; `this` must not be used afterwards.
    pub(crate) unsafe fn remove_observer(this: NonNull<Self>) {
        let lost = {
            let block = unsafe { this.as_ref() };
            block.observers.set(block.observers.get() - 1);
            matches!(block.owner.get(), Backref::Lost)
        };

        if lost {
            unsafe { Self::try_destroy(this) };
        }
    }

    /// Free the block if no observer refers to it any more.
    ///
    /// Callers only get here once the owner is lost, so the count is all that is left to check.
    unsafe fn try_destroy(this: NonNull<Self>) {
        if unsafe { this.as_ref() }.observers.get() == 0 {
            trace!("destroying control block {:p}", this);

            #[cfg(test)]
            LIVE_BLOCKS.with(|live| live.set(live.get() - 1));

            drop(unsafe { Box::from_raw(this.as_ptr()) });
        }
    }
}

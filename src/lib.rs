#![no_std]
#![allow(unused_unsafe)]
//! Observer handles over values that are owned in place.
//!
//! An [`Owner`] embeds a value and shares a small control block with any number of
//! [`Observer`]s. Observers never keep the value alive; they find out whether it still exists and,
//! if so, resolve to a pointer to it. None of the types are thread-safe.
extern crate alloc;
extern crate maybe_std as base;
#[cfg(any(test, feature = "std"))]
extern crate std;

use base::fmt;

/// A handle that exposes how many observers share its control block.
pub trait ObserverCounted {
    /// Get the number of live observers registered with the same control block.
    ///
    /// Implementations return zero when no control block is held.
    fn observer_count(this: &Self) -> usize;
}

/// The error returned when resolving an observer whose value is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Expired;

impl fmt::Display for Expired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("observed value has expired")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Expired {}

mod control;

mod owner;
pub use owner::*;

mod observer;
pub use observer::*;

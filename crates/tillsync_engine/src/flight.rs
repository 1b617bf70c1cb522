//! Single-flight guards.

use std::sync::atomic::{AtomicBool, Ordering};

/// Holds a busy flag for as long as it lives.
///
/// The flag is released on drop, so a cancelled future never leaves its
/// component stuck in the busy state.
#[derive(Debug)]
pub(crate) struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    /// Sets `flag` if it was clear. Returns `None` if someone else holds it.
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

//! Small value types shared across the hardware layer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque id returned by the native callback registration.
///
/// Owned by exactly one interrupt at a time; passing it back to
/// [`GpioBackend::unregister`](crate::traits::GpioBackend::unregister)
/// cancels the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u32);

impl CallbackHandle {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        CallbackHandle(id)
    }

    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb#{}", self.0)
    }
}

/// Identity of a board within the edge dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoardId(u64);

impl BoardId {
    /// Allocate a fresh, process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        BoardId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "board-{}", self.0)
    }
}

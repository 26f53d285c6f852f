use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::WATCHDOG_LEVEL;

/// Broadcom GPIO line number, the address the native controller uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineId(u32);

impl LineId {
    /// Wrap a raw Broadcom line number.
    #[must_use]
    pub const fn new(line: u32) -> Self {
        LineId(line)
    }

    /// Get the raw line number.
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

impl From<u32> for LineId {
    fn from(line: u32) -> Self {
        LineId(line)
    }
}

/// Logic level reported with an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Decode the level value passed by the native callback.
    ///
    /// Returns `None` for the watchdog marker and any other out-of-range value.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Level::Low),
            1 => Some(Level::High),
            // Watchdog timeout: the line did not change
            WATCHDOG_LEVEL => None,
            _ => None,
        }
    }

    /// The value the native callback uses for this level.
    #[must_use]
    pub const fn as_raw(&self) -> u32 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }

    #[must_use]
    pub fn is_high(&self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

/// A single accepted edge, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Logical name of the interrupt at delivery time.
    pub name: String,

    /// Whether the line went high.
    pub high: bool,

    /// Monotonic timestamp in nanoseconds since an arbitrary epoch.
    pub timestamp_nanos: u64,
}

//! Timing and sizing constants for the GPIO interrupt subsystem.
//!
//! The native GPIO daemon timestamps every edge with a 32-bit microsecond
//! counter that wraps roughly every 71.6 minutes. The constants below describe
//! that counter and the conversions applied before ticks reach consumers.
//!
//! # Usage
//!
//! ```
//! use raspi_core::constants::*;
//!
//! // One full wrap of the hardware counter, in microseconds
//! assert_eq!(TICK_ROLLOVER_PERIOD_US, 4_294_967_296);
//!
//! // Delivered timestamps are nanoseconds
//! let nanos = 1_500 * NANOS_PER_MICRO;
//! assert_eq!(nanos, 1_500_000);
//! ```

// ============================================================================
// Hardware Tick Counter
// ============================================================================

/// Length of one hardware counter period in microseconds (2^32).
///
/// A reconstructed tick is `rollovers * TICK_ROLLOVER_PERIOD_US + raw`.
pub const TICK_ROLLOVER_PERIOD_US: u64 = 1 << 32;

/// Nanoseconds per hardware tick unit.
pub const NANOS_PER_MICRO: u64 = 1_000;

/// Raw level value the daemon reports for a watchdog timeout.
///
/// Not an edge; callbacks carrying it are ignored.
pub const WATCHDOG_LEVEL: u32 = 2;

// ============================================================================
// Pin Numbering
// ============================================================================

/// Highest Broadcom line exposed on the 40-pin header.
pub const MAX_HEADER_LINE: u32 = 27;

/// Number of physical positions on the header.
pub const HEADER_PIN_COUNT: u8 = 40;

// ============================================================================
// Interrupts
// ============================================================================

/// How many pulse widths a servo interrupt averages over.
pub const SERVO_ROLLING_AVERAGE_WINDOW: usize = 10;

/// Default debounce window in milliseconds (disabled).
pub const DEFAULT_DEBOUNCE_MS: u64 = 0;

//! Digital interrupt subsystem for the Raspberry Pi board.
//!
//! This crate turns edge callbacks from the native GPIO daemon into a
//! debounced, monotonically timestamped stream of [`Tick`]s, and lets the
//! set of monitored pins change at runtime without losing counts,
//! subscriptions or hardware callbacks.
//!
//! # Data Flow
//!
//! ```text
//!  native callback ─> bridge ─> registry lookup ─> debounce ─> sink ─> subscribers
//!  (gpio, level,      (tick      (line -> Interrupt,             (count,
//!   raw u32 tick)      rollover)   per board)                     fan-out)
//!
//!  BoardConfig ─> Board::reconfigure ─> reconcile ─> GpioBackend (un)register
//! ```
//!
//! # Components
//!
//! - [`bridge`]: process-wide [`EdgeDispatcher`] and the native entry point
//!   [`interrupt_callback`]. Reconstructs 64-bit time from the wrapping
//!   32-bit hardware counter.
//! - [`registry`]: per-board [`InterruptRegistry`], lookup-or-create and
//!   teardown, plus the lock-free snapshot read by the bridge.
//! - [`reconcile`]: the three-pass diff applied on reconfigure.
//! - [`interrupt`]: live [`Interrupt`] state and its [`InterruptKind`].
//! - [`sink`]: the [`EdgeSink`] edge counter and subscriber fan-out.
//! - [`board`]: the [`Board`] facade tying it all together.
//! - [`traits`]: the [`GpioBackend`] boundary to the native library.
//! - [`mock`]: an in-process backend for tests and development.
//!
//! # Error Handling
//!
//! Configuration and registry operations return [`Result<T>`] with a
//! [`HardwareError`]. The callback path never returns errors: it logs them
//! through `tracing` and drops the edge.
//!
//! [`Tick`]: raspi_core::Tick

pub mod board;
pub mod bridge;
pub mod error;
pub mod interrupt;
pub mod mock;
pub mod reconcile;
pub mod registry;
pub mod sink;
pub mod traits;
pub mod types;

mod sync;

// Re-export commonly used types for convenience
pub use board::Board;
pub use bridge::{EdgeDispatcher, TickClock, interrupt_callback};
pub use error::{HardwareError, Result};
pub use interrupt::{Interrupt, InterruptKind, ServoPulse};
pub use registry::{InterruptMap, InterruptRegistry, InterruptTable};
pub use sink::EdgeSink;
pub use traits::GpioBackend;
pub use types::{BoardId, CallbackHandle};

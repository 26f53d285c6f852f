//! Core domain types for the Raspberry Pi GPIO board.
//!
//! This crate has no hardware access. It holds the static pin identity table,
//! the declarative pin configuration consumed by the board, and the small
//! value types shared with `raspi-hardware`.

pub mod config;
pub mod constants;
pub mod error;
pub mod pins;
pub mod types;

pub use config::{BoardConfig, InterruptType, PinConfig, PinKind, Pull};
pub use error::{Error, Result};
pub use pins::PinTable;
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

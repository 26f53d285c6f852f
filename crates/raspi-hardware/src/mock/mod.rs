//! Mock GPIO backend for testing and development.
//!
//! This module provides a simulated native GPIO library that can be
//! controlled programmatically without requiring a Raspberry Pi.

pub mod gpio;

pub use gpio::{MockGpio, MockGpioHandle};

//! Boundary to the native GPIO library.
//!
//! The board never talks to the GPIO daemon directly. Everything it needs
//! from the native side goes through [`GpioBackend`]: arming and disarming an
//! edge callback on a line, and setting the pull resistor.
//!
//! Calls are synchronous because the native library is; they may be issued
//! from any thread while the board's registry mutex is held, so
//! implementations must not call back into the board.
//!
//! # Examples
//!
//! ```
//! use raspi_core::{LineId, Pull};
//! use raspi_hardware::mock::MockGpio;
//! use raspi_hardware::traits::GpioBackend;
//!
//! let (gpio, handle) = MockGpio::new();
//! let cb = gpio.register(LineId::new(17)).unwrap();
//! gpio.set_pull(LineId::new(17), Pull::Up).unwrap();
//! assert!(handle.is_registered(LineId::new(17)));
//!
//! gpio.unregister(cb).unwrap();
//! assert!(!handle.is_registered(LineId::new(17)));
//! ```

use raspi_core::{LineId, Pull};

use crate::Result;
use crate::types::CallbackHandle;

/// Native GPIO operations consumed by the interrupt subsystem.
pub trait GpioBackend: Send + Sync + 'static {
    /// Configure `line` as an input and arm an either-edge callback on it.
    ///
    /// # Errors
    ///
    /// [`HardwareError::HardwareRegistrationFailed`](crate::HardwareError::HardwareRegistrationFailed)
    /// when the native call reports an error code.
    fn register(&self, line: LineId) -> Result<CallbackHandle>;

    /// Cancel a callback previously returned by [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// [`HardwareError::HardwareRegistrationFailed`](crate::HardwareError::HardwareRegistrationFailed)
    /// when the native call reports an error code.
    fn unregister(&self, handle: CallbackHandle) -> Result<()>;

    /// Set the pull resistor on `line`. [`Pull::Unset`] is a no-op.
    fn set_pull(&self, line: LineId, pull: Pull) -> Result<()>;
}

impl<T: GpioBackend> GpioBackend for std::sync::Arc<T> {
    fn register(&self, line: LineId) -> Result<CallbackHandle> {
        (**self).register(line)
    }

    fn unregister(&self, handle: CallbackHandle) -> Result<()> {
        (**self).unregister(handle)
    }

    fn set_pull(&self, line: LineId, pull: Pull) -> Result<()> {
        (**self).set_pull(line, pull)
    }
}

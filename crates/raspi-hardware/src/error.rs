//! Error types for the interrupt subsystem.
//!
//! Registry and reconciliation errors are always returned to the caller.
//! The callback bridge never returns errors; it logs them and drops the edge.

use raspi_core::LineId;

use crate::types::CallbackHandle;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while managing interrupts.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Label does not resolve through the pin table.
    #[error("Unknown pin: {label}")]
    UnknownPin { label: String },

    /// Native registration or unregistration returned an error code.
    #[error("Hardware registration failed on {target}: {message}")]
    HardwareRegistrationFailed { target: String, message: String },

    /// An interrupt is already tracked at this line.
    ///
    /// Only ever logged; reconciliation invariants make it unreachable.
    #[error("Interrupt already tracked on {line} as {name}")]
    AlreadyTracked { line: LineId, name: String },

    /// Delivery aborted by the cancellation signal.
    #[error("Delivery cancelled")]
    Cancelled,

    /// Operation is not supported by this interrupt kind.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Board has been closed.
    #[error("Board is closed")]
    Closed,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(raspi_core::Error),

    /// Several independent failures, e.g. from teardown.
    #[error("{} errors: {}", .0.len(), join_messages(.0))]
    Multiple(Vec<HardwareError>),
}

fn join_messages(errors: &[HardwareError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl HardwareError {
    /// Create a new unknown pin error.
    pub fn unknown_pin(label: impl Into<String>) -> Self {
        Self::UnknownPin {
            label: label.into(),
        }
    }

    /// Create a new registration failure.
    pub fn registration_failed(line: LineId, message: impl Into<String>) -> Self {
        Self::HardwareRegistrationFailed {
            target: line.to_string(),
            message: message.into(),
        }
    }

    /// Create a new failure for an operation on an existing callback.
    pub fn callback_failed(handle: CallbackHandle, message: impl Into<String>) -> Self {
        Self::HardwareRegistrationFailed {
            target: handle.to_string(),
            message: message.into(),
        }
    }

    /// Create a new already-tracked error.
    pub fn already_tracked(line: LineId, name: impl Into<String>) -> Self {
        Self::AlreadyTracked {
            line,
            name: name.into(),
        }
    }

    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Collapse a list of errors: none is `Ok`, one is itself, more is `Multiple`.
    pub fn combine(mut errors: Vec<HardwareError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

impl From<raspi_core::Error> for HardwareError {
    fn from(error: raspi_core::Error) -> Self {
        match error {
            raspi_core::Error::UnknownPin(label) => Self::UnknownPin { label },
            other => Self::Config(other),
        }
    }
}

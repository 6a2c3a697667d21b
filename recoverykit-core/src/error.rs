use thiserror::Error;

use crate::device::DeviceError;
use crate::store::StorageError;

/// Result type used throughout the recovery engine.
pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// Error outputs from `RecoveryKit`
#[derive(Debug, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum RecoveryError {
    /// The hardware device failed, was disconnected or the user declined on the device.
    #[error("device_error: {0}")]
    Device(#[from] DeviceError),
    /// A chain node request failed. Aborts the identity scan that issued it.
    #[error("network_error: {url} (status: {status:?}): {error}")]
    Network {
        /// The requested URL.
        url: String,
        /// The HTTP status code, when a response was received.
        status: Option<u16>,
        /// Error details.
        error: String,
    },
    /// The derivation primitive rejected its input.
    #[error("derivation_error: {0}")]
    Derivation(String),
    /// The local store could not be read or written.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The presented input is not valid for the requested operation
    #[error("invalid_input_{attribute}: {reason}")]
    InvalidInput {
        /// The attribute which is invalid.
        attribute: String,
        /// Why the attribute was rejected.
        reason: String,
    },
    /// The recovery session was stopped through its controller.
    #[error("cancelled")]
    Cancelled,
}

impl RecoveryError {
    pub(crate) fn invalid_input(attribute: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error was caused by the hardware device.
    #[must_use]
    pub const fn is_device_error(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}

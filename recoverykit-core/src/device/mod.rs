//! Hardware device boundary.
//!
//! The recovery engine only needs two things from the device: a stable
//! identifier to pair it with a local wallet, and the PRF key seed of each
//! identity. Both are user-confirmed round trips that may take arbitrarily
//! long and may be declined.

use std::future::Future;

use thiserror::Error;

use crate::derivation::PrfKeySeed;

mod software;

pub use software::SoftwareDevice;

/// Errors raised by the hardware device transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The device is not connected or was unplugged mid-session.
    #[error("device disconnected")]
    Disconnected,
    /// The user rejected the request on the device.
    #[error("request declined on the device")]
    Declined,
    /// The device did not answer in time.
    #[error("device timed out")]
    Timeout,
    /// Any other transport failure.
    #[error("device transport error: {0}")]
    Transport(String),
}

/// A hardware wallet capable of exporting per-identity PRF key seeds.
///
/// Calls are serialized by the caller: the device is stateful and each request
/// waits for a physical confirmation.
pub trait HardwareDevice: Send + Sync {
    /// Returns the public key of the pairing path, which identifies the device.
    ///
    /// # Errors
    /// Returns an error if the device cannot be reached.
    fn wallet_identifier(&self) -> impl Future<Output = Result<Vec<u8>, DeviceError>> + Send;

    /// Exports the PRF key seed of identity `identity_number`.
    ///
    /// # Errors
    /// Returns an error if the device is unreachable, times out or the user declines.
    fn prf_key_seed(
        &self,
        identity_number: u32,
    ) -> impl Future<Output = Result<PrfKeySeed, DeviceError>> + Send;
}

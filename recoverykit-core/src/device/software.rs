//! Software emulation of a hardware device.
//!
//! NOT suitable for holding real funds: the master secret lives in process
//! memory. It backs the developer CLI and the test-suite, where it stands in
//! for the hardware wallet while keeping seeds deterministic.

use std::collections::HashSet;
use std::sync::Mutex;

use hkdf::Hkdf;
use secrecy::{ExposeSecret, SecretBox};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{DeviceError, HardwareDevice};
use crate::derivation::PrfKeySeed;
use crate::error::{RecoveryError, RecoveryResult};

/// Label for deriving per-identity PRF key seeds.
const LABEL_PRF_KEY_SEED: &[u8] = b"recoverykit:prf-key-seed";

/// Label for deriving the pairing public key.
const LABEL_PAIRING: &[u8] = b"recoverykit:pairing";

/// Deterministic device keyed by a 32-byte master secret.
pub struct SoftwareDevice {
    master: SecretBox<[u8; 32]>,
    declined: HashSet<u32>,
    requests: Mutex<Vec<u32>>,
}

impl SoftwareDevice {
    /// Creates a device from a master secret.
    #[must_use]
    pub fn new(master: [u8; 32]) -> Self {
        Self {
            master: SecretBox::new(Box::new(master)),
            declined: HashSet::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates a device from a hex encoded master secret.
    ///
    /// # Errors
    /// Returns an error if the string is not 32 bytes of hex.
    pub fn from_hex(s: &str) -> RecoveryResult<Self> {
        let mut master = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(s.trim(), &mut *master)
            .map_err(|e| RecoveryError::invalid_input("master_secret", e.to_string()))?;
        Ok(Self::new(*master))
    }

    /// Makes the device decline the seed export of `identity_number`, as if the
    /// user rejected it on screen.
    #[must_use]
    pub fn declining(mut self, identity_number: u32) -> Self {
        self.declined.insert(identity_number);
        self
    }

    /// Returns the PRF key seed of `identity_number` without a device round trip.
    ///
    /// # Errors
    /// Returns [`DeviceError::Transport`] if the key expansion fails.
    pub fn seed_for(&self, identity_number: u32) -> Result<PrfKeySeed, DeviceError> {
        let seed = self.expand(LABEL_PRF_KEY_SEED, &identity_number.to_le_bytes())?;
        Ok(PrfKeySeed::new(*seed))
    }

    /// Identity numbers requested so far, in request order.
    #[must_use]
    pub fn requested_identities(&self) -> Vec<u32> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn expand(&self, label: &[u8], context: &[u8]) -> Result<Zeroizing<[u8; 32]>, DeviceError> {
        let mut okm = Zeroizing::new([0u8; 32]);
        hkdf_expand(self.master.expose_secret(), label, context, &mut *okm)?;
        Ok(okm)
    }
}

fn hkdf_expand(
    master: &[u8; 32],
    label: &[u8],
    context: &[u8],
    okm: &mut [u8],
) -> Result<(), DeviceError> {
    let hk = Hkdf::<Sha256>::new(None, master);
    let mut info = Vec::with_capacity(label.len() + context.len());
    info.extend_from_slice(label);
    info.extend_from_slice(context);
    hk.expand(&info, okm)
        .map_err(|e| DeviceError::Transport(format!("key expansion failed: {e}")))
}

impl HardwareDevice for SoftwareDevice {
    async fn wallet_identifier(&self) -> Result<Vec<u8>, DeviceError> {
        Ok(self.expand(LABEL_PAIRING, &[])?.to_vec())
    }

    async fn prf_key_seed(&self, identity_number: u32) -> Result<PrfKeySeed, DeviceError> {
        self.requests
            .lock()
            .map_err(|_| DeviceError::Transport("request log poisoned".to_string()))?
            .push(identity_number);
        if self.declined.contains(&identity_number) {
            return Err(DeviceError::Declined);
        }
        self.seed_for(identity_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeds_are_deterministic_per_identity() {
        let device = SoftwareDevice::new([3u8; 32]);
        let a = device.prf_key_seed(0).await.unwrap();
        let b = device.prf_key_seed(0).await.unwrap();
        let c = device.prf_key_seed(1).await.unwrap();
        assert_eq!(a.expose(), b.expose());
        assert_ne!(a.expose(), c.expose());
        assert_eq!(device.requested_identities(), vec![0, 0, 1]);
    }

    #[tokio::test]
    async fn test_declined_identity() {
        let device = SoftwareDevice::new([3u8; 32]).declining(2);
        assert!(device.prf_key_seed(1).await.is_ok());
        assert_eq!(device.prf_key_seed(2).await.unwrap_err(), DeviceError::Declined);
    }

    #[test]
    fn test_oversized_expansion_is_a_transport_error() {
        // HKDF-SHA256 cannot produce more than 255 blocks of output
        let mut okm = vec![0u8; 255 * 32 + 1];
        let result = hkdf_expand(&[1u8; 32], LABEL_PRF_KEY_SEED, &[], &mut okm);
        assert!(matches!(result, Err(DeviceError::Transport(message)) if message.contains("expansion")));

        let mut okm = [0u8; 32];
        assert!(hkdf_expand(&[1u8; 32], LABEL_PRF_KEY_SEED, &[], &mut okm).is_ok());
        assert_ne!(okm, [0u8; 32]);
    }

    #[tokio::test]
    async fn test_wallet_identifier_depends_on_master() {
        let a = SoftwareDevice::new([1u8; 32]).wallet_identifier().await.unwrap();
        let b = SoftwareDevice::new([2u8; 32]).wallet_identifier().await.unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}

//! Credential id derivation.
//!
//! This module defines the boundary to the derivation primitive:
//!
//! - [`PrfKeySeed`] - per-identity secret exported by the hardware device
//! - [`GlobalParams`] - chain-wide cryptographic parameters
//! - [`CredentialDeriver`] - `(seed, credential_number, global) -> CredentialId`
//!
//! and a reference [`HkdfCredentialDeriver`] used by tests and the developer CLI.

use std::fmt;

use hkdf::Hkdf;
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{RecoveryError, RecoveryResult};
use crate::types::{AccountAddress, CredentialId, IdentityVersion};

// Domain Separation Labels

/// Label for deriving credential ids.
const LABEL_CREDENTIAL_ID: &[u8] = b"recoverykit:cred-id";

/// Label for binding the derivation to the chain's global parameters.
const LABEL_GLOBAL_CONTEXT: &[u8] = b"recoverykit:global-context";

// Seeds & Parameters

/// Secret PRF key seed of one identity, as exported by the hardware device.
///
/// The bytes are zeroized on drop and never printed.
pub struct PrfKeySeed(SecretBox<[u8; 32]>);

impl PrfKeySeed {
    /// Wraps raw seed bytes.
    #[must_use]
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(SecretBox::new(Box::new(bytes)))
    }

    /// Parses a seed from its hexadecimal form.
    ///
    /// # Errors
    /// Returns an error if the string is not 32 bytes of hex.
    pub fn from_hex(s: &str) -> RecoveryResult<Self> {
        let mut bytes = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(s.trim(), &mut *bytes)
            .map_err(|e| RecoveryError::invalid_input("prf_key_seed", e.to_string()))?;
        Ok(Self::new(*bytes))
    }

    pub(crate) fn expose(&self) -> &[u8; 32] {
        self.0.expose_secret()
    }
}

impl fmt::Debug for PrfKeySeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrfKeySeed(<redacted>)")
    }
}

/// Chain-wide cryptographic parameters, read once per session at the snapshot block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalParams {
    /// Human readable genesis description string.
    pub genesis_string: String,
    /// Hex encoded on-chain commitment key.
    pub on_chain_commitment_key: String,
}

// Derivation Primitive

/// Deterministic credential id derivation.
///
/// Implementations must be pure: the same inputs always yield the same id.
pub trait CredentialDeriver: Send + Sync {
    /// Derives the credential id at `credential_number` for the identity owning `seed`.
    ///
    /// # Errors
    /// Returns [`RecoveryError::Derivation`] if the inputs are outside the
    /// primitive's domain. This is not expected for valid inputs.
    fn derive_credential_id(
        &self,
        seed: &PrfKeySeed,
        credential_number: u32,
        global: &GlobalParams,
        version: IdentityVersion,
    ) -> RecoveryResult<CredentialId>;
}

/// HKDF-SHA256 based derivation.
///
/// ```text
/// salt    = SHA256("recoverykit:global-context" || genesis_string || commitment_key)
/// cred_id = HKDF-Expand(
///     prk  = HKDF-Extract(salt, seed),
///     info = "recoverykit:cred-id" || version (1 byte) || credential_number (1 byte),
///     len  = 48
/// )
/// ```
///
/// Credential numbers are a single byte on the wire, so numbers above 255 are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct HkdfCredentialDeriver;

impl CredentialDeriver for HkdfCredentialDeriver {
    fn derive_credential_id(
        &self,
        seed: &PrfKeySeed,
        credential_number: u32,
        global: &GlobalParams,
        version: IdentityVersion,
    ) -> RecoveryResult<CredentialId> {
        let counter = u8::try_from(credential_number).map_err(|_| {
            RecoveryError::Derivation(format!(
                "credential number {credential_number} exceeds the one byte counter"
            ))
        })?;

        let salt = global_context(global);
        let hk = Hkdf::<Sha256>::new(Some(&salt), seed.expose());

        let mut info = Vec::with_capacity(LABEL_CREDENTIAL_ID.len() + 2);
        info.extend_from_slice(LABEL_CREDENTIAL_ID);
        info.push(version.as_u8());
        info.push(counter);

        let mut okm = [0u8; CredentialId::LEN];
        hk.expand(&info, &mut okm)
            .map_err(|e| RecoveryError::Derivation(e.to_string()))?;
        Ok(CredentialId::new(okm))
    }
}

/// Hashes the global parameters into the HKDF salt.
fn global_context(global: &GlobalParams) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(LABEL_GLOBAL_CONTEXT);
    hasher.update(global.genesis_string.as_bytes());
    hasher.update(global.on_chain_commitment_key.as_bytes());
    hasher.finalize().into()
}

// Address Derivation

/// Computes the address of the account whose first credential is `credential_id`:
/// ```text
/// address = SHA256(credential_id)
/// ```
#[must_use]
pub fn address_from_credential_id(credential_id: &CredentialId) -> AccountAddress {
    let hash = Sha256::digest(credential_id.as_bytes());
    AccountAddress::new(hash.into())
}

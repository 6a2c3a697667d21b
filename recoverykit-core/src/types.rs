//! Core type definitions for the recovery engine.
//!
//! Identifiers, the persisted records (identities, credentials, accounts and
//! address-book entries) and the pairs produced by a credential scan.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RecoveryError, RecoveryResult};

// Identifiers

macro_rules! hex_identifier {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Length of the identifier in bytes.
            pub const LEN: usize = $len;

            /// Creates the identifier from raw bytes.
            #[must_use]
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Returns the raw bytes of the identifier.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Converts the identifier to a hexadecimal string.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Creates the identifier from a hexadecimal string.
            ///
            /// # Errors
            /// Returns an error if the string is not valid hex or has the wrong length.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(s, &mut bytes)?;
                Ok(Self(bytes))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_identifier!(
    /// A 48-byte credential identifier (the registration id of a credential).
    ///
    /// Derived deterministically from a PRF key seed and a credential number,
    /// so it is globally unique and never changes once derived.
    CredentialId,
    48
);

hex_identifier!(
    /// A 32-byte block hash. One finalized block is frozen per recovery session.
    BlockHash,
    32
);

/// Version byte prefixed to account addresses before base58check encoding.
const ADDRESS_VERSION: u8 = 1;

/// A 32-byte account address, rendered as base58check with version byte `1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountAddress(pub [u8; 32]);

impl AccountAddress {
    /// Creates a new `AccountAddress` from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the address.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encodes the address in its base58check form.
    #[must_use]
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0)
            .with_check_version(ADDRESS_VERSION)
            .into_string()
    }

    /// Parses an address from its base58check form.
    ///
    /// # Errors
    /// Returns an error if the checksum or version byte is wrong, or the payload
    /// is not 32 bytes long.
    pub fn from_base58(s: &str) -> RecoveryResult<Self> {
        let decoded = bs58::decode(s)
            .with_check(Some(ADDRESS_VERSION))
            .into_vec()
            .map_err(|e| RecoveryError::invalid_input("address", e.to_string()))?;
        let payload: [u8; 32] = decoded
            .get(1..)
            .and_then(|rest| rest.try_into().ok())
            .ok_or_else(|| {
                RecoveryError::invalid_input("address", "expected a 32 byte payload")
            })?;
        Ok(Self(payload))
    }
}

impl fmt::Debug for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountAddress({})", self.to_base58())
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl FromStr for AccountAddress {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

impl Serialize for AccountAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for AccountAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base58(&s).map_err(serde::de::Error::custom)
    }
}

/// Local row id of a paired hardware wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(pub u32);

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local row id of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub u32);

impl IdentityId {
    /// Placeholder carried by records scanned under an identity number that has
    /// no local row yet. Row ids start at 1, so it never collides with a stored id.
    pub const UNASSIGNED: Self = Self(0);
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Policy

/// A `YYYYMM` year-month stamp as used by credential policies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct YearMonth(String);

impl YearMonth {
    /// The current year-month in UTC.
    #[must_use]
    pub fn current() -> Self {
        Self(chrono::Utc::now().format("%Y%m").to_string())
    }

    /// Returns the `YYYYMM` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for YearMonth {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The attribute policy a credential was deployed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Month the credential was created.
    pub created_at: YearMonth,
    /// Month the credential expires.
    pub valid_to: YearMonth,
    /// Attributes revealed on chain, keyed by attribute tag.
    #[serde(default)]
    pub revealed_attributes: BTreeMap<String, String>,
}

impl Policy {
    /// Conservative policy for a credential that was removed from its account:
    /// both dates set to the current month and nothing revealed.
    #[must_use]
    pub fn placeholder() -> Self {
        let now = YearMonth::current();
        Self {
            created_at: now.clone(),
            valid_to: now,
            revealed_attributes: BTreeMap::new(),
        }
    }
}

// Statuses

/// Lifecycle status of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "camelCase")]
pub enum IdentityStatus {
    /// Issuance requested, not yet confirmed by the identity provider.
    Pending,
    /// Issued by the identity provider.
    Confirmed,
    /// Rejected by the identity provider.
    Rejected,
    /// Rejected, and the user has been warned about it.
    RejectedAndWarned,
    /// Placeholder synthesized from chain evidence during recovery.
    Recovered,
    /// Created at genesis.
    Genesis,
}

/// Key generation scheme an identity's PRF key and credentials were created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "camelCase")]
pub enum IdentityVersion {
    /// Legacy key generation.
    Legacy,
    /// Current key generation. Used for identities synthesized by recovery.
    Current,
}

impl IdentityVersion {
    /// Numeric tag of the version.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Legacy => 0,
            Self::Current => 1,
        }
    }
}

/// Lifecycle status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "camelCase")]
pub enum AccountStatus {
    /// Deployment submitted, not yet finalized.
    Pending,
    /// Present on chain.
    Confirmed,
    /// Deployment rejected.
    Rejected,
    /// Created at genesis.
    Genesis,
}

// Records

/// An identity stored in the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Local row id.
    pub id: IdentityId,
    /// Wallet the identity belongs to.
    pub wallet_id: WalletId,
    /// Index of the identity on the hardware device. Unique per wallet.
    pub identity_number: u32,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: IdentityStatus,
    /// Key generation scheme.
    pub version: IdentityVersion,
    /// Serialized identity object as issued by the identity provider.
    pub identity_object: String,
}

/// An identity that has not been inserted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIdentity {
    /// Wallet the identity belongs to.
    pub wallet_id: WalletId,
    /// Index of the identity on the hardware device.
    pub identity_number: u32,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: IdentityStatus,
    /// Key generation scheme.
    pub version: IdentityVersion,
    /// Serialized identity object.
    pub identity_object: String,
}

impl NewIdentity {
    /// Attaches the row id assigned on insert.
    #[must_use]
    pub fn into_identity(self, id: IdentityId) -> Identity {
        Identity {
            id,
            wallet_id: self.wallet_id,
            identity_number: self.identity_number,
            name: self.name,
            status: self.status,
            version: self.version,
            identity_object: self.identity_object,
        }
    }
}

/// A credential derived from an identity at a specific credential number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Deterministic credential id. Unique key of the credentials table.
    pub cred_id: CredentialId,
    /// Identity the credential was derived from.
    pub identity_id: IdentityId,
    /// Account the credential was deployed on.
    pub account_address: AccountAddress,
    /// Derivation index of the credential on its identity.
    pub credential_number: u32,
    /// Position of the credential on the account, `None` if it was removed from the account.
    pub credential_index: Option<u8>,
    /// Attribute policy of the credential.
    pub policy: Policy,
}

/// An account stored in the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// On-chain address, derived from the account's first credential.
    pub address: AccountAddress,
    /// Display name.
    pub name: String,
    /// Identity owning the credential through which the account was found.
    pub identity_id: IdentityId,
    /// Lifecycle status.
    pub status: AccountStatus,
    /// Number of credential signatures required to sign for the account.
    pub signature_threshold: u8,
    /// Whether the account was created by the identity provider (credential number 0).
    pub is_initial: bool,
}

/// An address-book entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBookEntry {
    /// Address the entry points at.
    pub address: AccountAddress,
    /// Display name.
    pub name: String,
    /// Free-form note.
    pub note: Option<String>,
    /// Entries for the wallet's own accounts cannot be edited.
    pub read_only: bool,
}

// Scan results

/// A discovered account together with the credential that led to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredPair {
    /// The account the credential is (or was) deployed on.
    pub account: Account,
    /// The credential whose on-chain presence revealed the account.
    pub credential: Credential,
}

impl RecoveredPair {
    /// Re-tags both records with the given identity.
    pub fn assign_identity(&mut self, identity_id: IdentityId) {
        self.account.identity_id = identity_id;
        self.credential.identity_id = identity_id;
    }
}

/// The ordered result of scanning one identity.
///
/// Pairs are sorted by ascending credential number. Because each account is
/// stored next to the credential that revealed it, `accounts()` and
/// `credentials()` always have equal length and correspond index by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveredCredentials(Vec<RecoveredPair>);

impl RecoveredCredentials {
    /// Wraps pairs that are already ordered by credential number.
    #[must_use]
    pub fn new(pairs: Vec<RecoveredPair>) -> Self {
        debug_assert!(pairs
            .windows(2)
            .all(|w| w[0].credential.credential_number < w[1].credential.credential_number));
        Self(pairs)
    }

    /// The discovered pairs.
    #[must_use]
    pub fn pairs(&self) -> &[RecoveredPair] {
        &self.0
    }

    /// Mutable access to the pairs, for re-tagging before import.
    pub fn pairs_mut(&mut self) -> &mut [RecoveredPair] {
        &mut self.0
    }

    /// The discovered accounts, in credential-number order.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.0.iter().map(|pair| &pair.account)
    }

    /// The discovered credentials, in credential-number order.
    pub fn credentials(&self) -> impl Iterator<Item = &Credential> {
        self.0.iter().map(|pair| &pair.credential)
    }

    /// Number of discovered pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of an idempotent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The row was inserted.
    Applied,
    /// The row was already present; nothing changed.
    NoOp,
}

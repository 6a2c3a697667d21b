//! Chain oracle boundary.
//!
//! Every account lookup of a recovery session is answered against the single
//! finalized block frozen at session start, so the scan observes one
//! consistent chain state while new blocks keep arriving.

use std::collections::BTreeMap;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::derivation::GlobalParams;
use crate::error::RecoveryResult;
use crate::types::{BlockHash, CredentialId, Policy};

mod http;
mod memory;

pub use http::HttpChainClient;
pub use memory::MemoryChain;

/// A credential deployed on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "contents", rename_all = "camelCase")]
pub enum AccountCredential {
    /// The credential created by the identity provider together with the identity.
    #[serde(rename_all = "camelCase")]
    Initial {
        /// Registration id of the credential.
        reg_id: CredentialId,
        /// Attribute policy.
        policy: Policy,
    },
    /// A credential deployed by the account holder.
    #[serde(rename_all = "camelCase")]
    Normal {
        /// Id of the credential.
        cred_id: CredentialId,
        /// Attribute policy.
        policy: Policy,
    },
}

impl AccountCredential {
    /// The credential id, whichever variant carries it.
    #[must_use]
    pub const fn cred_id(&self) -> &CredentialId {
        match self {
            Self::Initial { reg_id, .. } => reg_id,
            Self::Normal { cred_id, .. } => cred_id,
        }
    }

    /// The attribute policy.
    #[must_use]
    pub const fn policy(&self) -> &Policy {
        match self {
            Self::Initial { policy, .. } | Self::Normal { policy, .. } => policy,
        }
    }
}

/// On-chain state of an account as seen at a given block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    /// Number of credential signatures required.
    pub account_threshold: u8,
    /// Current credentials, keyed by their index on the account.
    pub account_credentials: BTreeMap<u8, AccountCredential>,
}

impl AccountInfo {
    /// Position of `cred_id` in the account's current credential set.
    #[must_use]
    pub fn credential_index_of(&self, cred_id: &CredentialId) -> Option<u8> {
        self.account_credentials
            .iter()
            .find(|(_, credential)| credential.cred_id() == cred_id)
            .map(|(index, _)| *index)
    }

    /// The credential the account was created with: the one at index 0, or the
    /// lowest index present.
    #[must_use]
    pub fn first_credential(&self) -> Option<&AccountCredential> {
        self.account_credentials
            .get(&0)
            .or_else(|| self.account_credentials.values().next())
    }
}

/// Read access to a chain node.
pub trait ChainOracle: Send + Sync {
    /// Hash of the last finalized block. Called once per session to fix the snapshot.
    ///
    /// # Errors
    /// Returns [`crate::RecoveryError::Network`] if the node cannot be reached.
    fn last_finalized_block_hash(&self) -> impl Future<Output = RecoveryResult<BlockHash>> + Send;

    /// Chain-wide cryptographic parameters at `block_hash`.
    ///
    /// # Errors
    /// Returns [`crate::RecoveryError::Network`] if the node cannot be reached.
    fn global_params(
        &self,
        block_hash: &BlockHash,
    ) -> impl Future<Output = RecoveryResult<GlobalParams>> + Send;

    /// The account holding `cred_id` at `block_hash`, or `None` if no account
    /// ever held it.
    ///
    /// Accounts keep answering for credentials that were removed from them, so
    /// the returned account may no longer list `cred_id`.
    ///
    /// # Errors
    /// Returns [`crate::RecoveryError::Network`] if the request fails.
    fn account_info(
        &self,
        cred_id: &CredentialId,
        block_hash: &BlockHash,
    ) -> impl Future<Output = RecoveryResult<Option<AccountInfo>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::YearMonth;

    fn policy() -> Policy {
        Policy {
            created_at: YearMonth::from("202401"),
            valid_to: YearMonth::from("202901"),
            revealed_attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_account_info_wire_format() {
        let json = serde_json::json!({
            "accountThreshold": 2,
            "accountCredentials": {
                "0": {
                    "type": "initial",
                    "contents": {
                        "regId": "11".repeat(48),
                        "policy": { "createdAt": "202401", "validTo": "202901", "revealedAttributes": {} }
                    }
                },
                "3": {
                    "type": "normal",
                    "contents": {
                        "credId": "22".repeat(48),
                        "policy": { "createdAt": "202401", "validTo": "202901" }
                    }
                }
            }
        });

        let info: AccountInfo = serde_json::from_value(json).unwrap();
        assert_eq!(info.account_threshold, 2);
        assert_eq!(
            info.credential_index_of(&CredentialId::new([0x22; 48])),
            Some(3)
        );
        assert_eq!(info.credential_index_of(&CredentialId::new([0x33; 48])), None);
        assert_eq!(
            info.first_credential().unwrap().cred_id(),
            &CredentialId::new([0x11; 48])
        );
    }

    #[test]
    fn test_first_credential_falls_back_to_lowest_index() {
        let mut account_credentials = BTreeMap::new();
        account_credentials.insert(
            4,
            AccountCredential::Normal {
                cred_id: CredentialId::new([4; 48]),
                policy: policy(),
            },
        );
        account_credentials.insert(
            2,
            AccountCredential::Normal {
                cred_id: CredentialId::new([2; 48]),
                policy: policy(),
            },
        );
        let info = AccountInfo {
            account_threshold: 1,
            account_credentials,
        };
        assert_eq!(
            info.first_credential().unwrap().cred_id(),
            &CredentialId::new([2; 48])
        );

        let empty = AccountInfo {
            account_threshold: 1,
            account_credentials: BTreeMap::new(),
        };
        assert!(empty.first_credential().is_none());
    }
}

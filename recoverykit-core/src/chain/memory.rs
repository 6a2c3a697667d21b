//! In-memory chain oracle.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{AccountInfo, ChainOracle};
use crate::derivation::{address_from_credential_id, GlobalParams};
use crate::error::{RecoveryError, RecoveryResult};
use crate::types::{AccountAddress, BlockHash, CredentialId};

#[derive(Default)]
struct ChainState {
    accounts: HashMap<AccountAddress, AccountInfo>,
    /// Every credential id that was ever deployed, current or removed.
    credentials: HashMap<CredentialId, AccountAddress>,
    failing: HashSet<CredentialId>,
}

/// A chain frozen at one block, with accounts registered by hand.
///
/// Lookups against any other block hash fail, and every account lookup is
/// counted so tests can assert on the number of lookups.
pub struct MemoryChain {
    block_hash: BlockHash,
    global: GlobalParams,
    state: Mutex<ChainState>,
    lookups: AtomicUsize,
}

impl MemoryChain {
    /// Creates an empty chain whose last finalized block is `block_hash`.
    #[must_use]
    pub fn new(block_hash: BlockHash, global: GlobalParams) -> Self {
        Self {
            block_hash,
            global,
            state: Mutex::new(ChainState::default()),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Registers an account and indexes its current credentials. Returns the
    /// address, derived from the account's first credential.
    ///
    /// # Errors
    /// Returns an error if the account has no credentials.
    pub fn insert_account(&self, info: AccountInfo) -> RecoveryResult<AccountAddress> {
        let first = info.first_credential().ok_or_else(|| {
            RecoveryError::invalid_input("account_credentials", "an account needs a credential")
        })?;
        let address = address_from_credential_id(first.cred_id());
        let mut state = self.state()?;
        for credential in info.account_credentials.values() {
            state.credentials.insert(*credential.cred_id(), address);
        }
        state.accounts.insert(address, info);
        Ok(address)
    }

    /// Records that `cred_id` was once deployed on `address` and has since been
    /// removed: lookups still find the account, which no longer lists it.
    ///
    /// # Errors
    /// Returns an error if no account is registered at `address`.
    pub fn insert_removed_credential(
        &self,
        address: AccountAddress,
        cred_id: CredentialId,
    ) -> RecoveryResult<()> {
        let mut state = self.state()?;
        if !state.accounts.contains_key(&address) {
            return Err(RecoveryError::invalid_input(
                "address",
                format!("no account at {address}"),
            ));
        }
        state.credentials.insert(cred_id, address);
        Ok(())
    }

    /// Makes every lookup of `cred_id` fail with a network error.
    ///
    /// # Errors
    /// Returns an error if the chain state is poisoned.
    pub fn fail_on(&self, cred_id: CredentialId) -> RecoveryResult<()> {
        self.state()?.failing.insert(cred_id);
        Ok(())
    }

    /// Number of account lookups served so far.
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn state(&self) -> RecoveryResult<MutexGuard<'_, ChainState>> {
        self.state.lock().map_err(|_| RecoveryError::Network {
            url: "memory://chain".to_string(),
            status: None,
            error: "chain state poisoned".to_string(),
        })
    }

    fn check_block(&self, block_hash: &BlockHash) -> RecoveryResult<()> {
        if *block_hash == self.block_hash {
            Ok(())
        } else {
            Err(RecoveryError::Network {
                url: format!("memory://chain/blocks/{block_hash}"),
                status: Some(404),
                error: "unknown block".to_string(),
            })
        }
    }
}

impl ChainOracle for MemoryChain {
    async fn last_finalized_block_hash(&self) -> RecoveryResult<BlockHash> {
        Ok(self.block_hash)
    }

    async fn global_params(&self, block_hash: &BlockHash) -> RecoveryResult<GlobalParams> {
        self.check_block(block_hash)?;
        Ok(self.global.clone())
    }

    async fn account_info(
        &self,
        cred_id: &CredentialId,
        block_hash: &BlockHash,
    ) -> RecoveryResult<Option<AccountInfo>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_block(block_hash)?;
        let state = self.state()?;
        if state.failing.contains(cred_id) {
            return Err(RecoveryError::Network {
                url: format!("memory://chain/accounts/by-credential/{cred_id}"),
                status: Some(503),
                error: "node unavailable".to_string(),
            });
        }
        Ok(state
            .credentials
            .get(cred_id)
            .and_then(|address| state.accounts.get(address))
            .cloned())
    }
}

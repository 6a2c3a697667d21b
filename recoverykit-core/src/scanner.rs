//! Credential index scanner.
//!
//! For one identity, walks the credential numbers `start_index..max_credentials`,
//! derives the candidate credential id at each number and asks the chain
//! whether any account holds it. Gaps never end the scan: a credential can be
//! removed from an account while higher numbers remain in use, so the fixed
//! upper bound is the only limit.

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::cancel::RecoveryController;
use crate::chain::{AccountInfo, ChainOracle};
use crate::derivation::{address_from_credential_id, CredentialDeriver, GlobalParams, PrfKeySeed};
use crate::error::{RecoveryError, RecoveryResult};
use crate::types::{
    Account, AccountStatus, BlockHash, Credential, CredentialId, IdentityId, IdentityVersion,
    Policy, RecoveredCredentials, RecoveredPair,
};

/// Number of address characters used as the default account name.
const ACCOUNT_NAME_LEN: usize = 8;

/// Identity whose credentials are scanned.
#[derive(Debug, Clone, Copy)]
pub struct ScanTarget<'a> {
    /// PRF key seed exported by the device for this identity.
    pub seed: &'a PrfKeySeed,
    /// Local id of the identity, or [`IdentityId::UNASSIGNED`] if it has no row yet.
    pub identity_id: IdentityId,
    /// Key generation scheme of the identity.
    pub version: IdentityVersion,
    /// First credential number to look up.
    pub start_index: u32,
}

/// Looks up a bounded range of credential numbers against a frozen block.
pub struct CredentialScanner<'a, C> {
    chain: &'a C,
    deriver: &'a dyn CredentialDeriver,
    global: &'a GlobalParams,
    controller: &'a RecoveryController,
    block_hash: BlockHash,
    max_credentials: u32,
    concurrency: usize,
}

impl<'a, C: ChainOracle> CredentialScanner<'a, C> {
    /// Creates a scanner probing `chain` at `block_hash`.
    #[must_use]
    pub fn new(
        chain: &'a C,
        deriver: &'a dyn CredentialDeriver,
        global: &'a GlobalParams,
        controller: &'a RecoveryController,
        block_hash: BlockHash,
    ) -> Self {
        Self {
            chain,
            deriver,
            global,
            controller,
            block_hash,
            max_credentials: 200,
            concurrency: 1,
        }
    }

    /// Sets the exclusive upper bound of credential numbers.
    #[must_use]
    pub const fn with_max_credentials(mut self, max_credentials: u32) -> Self {
        self.max_credentials = max_credentials;
        self
    }

    /// Sets how many lookups may be in flight at once. Results keep their order.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Scans the credentials of `target`.
    ///
    /// Issues exactly `max_credentials - start_index` lookups when nothing fails,
    /// and returns the discovered pairs ordered by credential number.
    ///
    /// # Errors
    /// Any failed lookup or derivation fails the whole scan; no pairs are
    /// returned. Returns [`RecoveryError::Cancelled`] if the controller is
    /// aborted while scanning.
    pub async fn scan_credentials(
        &self,
        target: ScanTarget<'_>,
    ) -> RecoveryResult<RecoveredCredentials> {
        let lookups = (target.start_index..self.max_credentials)
            .map(|credential_number| self.check_credential(target, credential_number));

        let found: Vec<Option<RecoveredPair>> = stream::iter(lookups)
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(RecoveredCredentials::new(found.into_iter().flatten().collect()))
    }

    async fn check_credential(
        &self,
        target: ScanTarget<'_>,
        credential_number: u32,
    ) -> RecoveryResult<Option<RecoveredPair>> {
        self.controller.check()?;
        let cred_id = self.deriver.derive_credential_id(
            target.seed,
            credential_number,
            self.global,
            target.version,
        )?;

        let lookup = self.chain.account_info(&cred_id, &self.block_hash);
        let Some(info) = self.controller.guard(lookup).await?? else {
            log::debug!("credential {credential_number}: no account");
            return Ok(None);
        };

        log::debug!("credential {credential_number}: found account");
        recovered_pair(cred_id, credential_number, target.identity_id, &info).map(Some)
    }
}

/// Builds the account and credential records for a credential found on chain.
fn recovered_pair(
    cred_id: CredentialId,
    credential_number: u32,
    identity_id: IdentityId,
    info: &AccountInfo,
) -> RecoveryResult<RecoveredPair> {
    let first = info.first_credential().ok_or_else(|| {
        RecoveryError::invalid_input(
            "account_credentials",
            format!("account holding credential {credential_number} lists no credentials"),
        )
    })?;
    let address = address_from_credential_id(first.cred_id());

    // Removed credentials keep their account but lose their index and live policy.
    let credential_index = info.credential_index_of(&cred_id);
    let policy = credential_index
        .and_then(|index| info.account_credentials.get(&index))
        .map_or_else(Policy::placeholder, |credential| credential.policy().clone());

    let account = Account {
        address,
        name: address.to_base58().chars().take(ACCOUNT_NAME_LEN).collect(),
        identity_id,
        status: AccountStatus::Confirmed,
        signature_threshold: info.account_threshold,
        is_initial: credential_number == 0,
    };
    let credential = Credential {
        cred_id,
        identity_id,
        account_address: address,
        credential_number,
        credential_index,
        policy,
    };
    Ok(RecoveredPair {
        account,
        credential,
    })
}

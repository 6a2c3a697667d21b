//! Identity index walker and the empty-run stopping heuristic.
//!
//! The walker handles one identity number per call: it asks the device for the
//! identity's seed, scans its credentials and imports what was found. Whether
//! to keep going is decided by the caller, fed by [`StoppingHeuristic`].

use tokio::sync::mpsc::UnboundedSender;

use crate::cancel::RecoveryController;
use crate::chain::ChainOracle;
use crate::config::RecoveryConfig;
use crate::derivation::{CredentialDeriver, GlobalParams};
use crate::device::HardwareDevice;
use crate::error::RecoveryResult;
use crate::import::{import_recovered, recovered_identity_name, ImportSummary};
use crate::scanner::{CredentialScanner, ScanTarget};
use crate::session::RecoveryEvent;
use crate::store::{AtomicBlobStore, WalletStore};
use crate::types::{Account, BlockHash, IdentityId, IdentityVersion, WalletId};

/// Whether an identity result ends the current empty run.
///
/// A locally known identity counts as evidence even when no account was
/// found under it, since the user created it at some point.
#[must_use]
pub const fn should_reset_counter(known_identity: bool, found_any: bool) -> bool {
    known_identity || found_any
}

/// What to do after recording an identity result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicVerdict {
    /// Go on with the next identity.
    Continue,
    /// Ask the user whether to go on; `empty_run` identities in a row had nothing.
    Checkpoint {
        /// Length of the current empty run.
        empty_run: u32,
    },
}

/// Counts consecutive identity numbers without any evidence and asks for a
/// checkpoint every `spaces_between_warning` of them.
///
/// The counter only resets on evidence; continuing past a checkpoint does not
/// reset it, so the next checkpoint comes after another full stretch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoppingHeuristic {
    spaces_between_warning: u32,
    empty_indices_counter: u32,
}

impl StoppingHeuristic {
    /// Creates a heuristic with an empty counter. `spaces_between_warning` is
    /// clamped to at least 1.
    #[must_use]
    pub fn new(spaces_between_warning: u32) -> Self {
        Self {
            spaces_between_warning: spaces_between_warning.max(1),
            empty_indices_counter: 0,
        }
    }

    /// Length of the current empty run.
    #[must_use]
    pub const fn empty_indices_counter(&self) -> u32 {
        self.empty_indices_counter
    }

    /// Records the result of one identity and returns the updated heuristic.
    #[must_use]
    pub const fn record(self, known_identity: bool, found_any: bool) -> (Self, HeuristicVerdict) {
        if should_reset_counter(known_identity, found_any) {
            let next = Self {
                empty_indices_counter: 0,
                ..self
            };
            return (next, HeuristicVerdict::Continue);
        }

        let empty_run = self.empty_indices_counter.saturating_add(1);
        let next = Self {
            empty_indices_counter: empty_run,
            ..self
        };
        if empty_run % self.spaces_between_warning == 0 {
            (next, HeuristicVerdict::Checkpoint { empty_run })
        } else {
            (next, HeuristicVerdict::Continue)
        }
    }
}

/// Outcome of handling one identity number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryStep {
    /// The identity number that was handled.
    pub identity_number: u32,
    /// Whether the wallet already had an identity with this number.
    pub known_identity: bool,
    /// Name of the identity the accounts belong to.
    pub identity_name: String,
    /// Accounts discovered by this scan, including ones that were already stored.
    pub accounts: Vec<Account>,
    /// What the import wrote.
    pub imported: ImportSummary,
}

impl RecoveryStep {
    /// Whether the scan discovered any account.
    #[must_use]
    pub const fn found_any(&self) -> bool {
        !self.accounts.is_empty()
    }
}

/// Walks identity numbers of one device.
pub struct IdentityWalker<'a, D, C, B> {
    device: &'a D,
    chain: &'a C,
    deriver: &'a dyn CredentialDeriver,
    store: &'a WalletStore<B>,
    global: &'a GlobalParams,
    config: &'a RecoveryConfig,
    controller: &'a RecoveryController,
    events: Option<&'a UnboundedSender<RecoveryEvent>>,
}

impl<'a, D, C, B> IdentityWalker<'a, D, C, B>
where
    D: HardwareDevice,
    C: ChainOracle,
    B: AtomicBlobStore,
{
    /// Creates a walker.
    #[must_use]
    pub const fn new(
        device: &'a D,
        chain: &'a C,
        deriver: &'a dyn CredentialDeriver,
        store: &'a WalletStore<B>,
        global: &'a GlobalParams,
        config: &'a RecoveryConfig,
        controller: &'a RecoveryController,
    ) -> Self {
        Self {
            device,
            chain,
            deriver,
            store,
            global,
            config,
            controller,
            events: None,
        }
    }

    /// Reports `AwaitingDevice` and `Searching` progress on `events`.
    #[must_use]
    pub const fn with_events(mut self, events: &'a UnboundedSender<RecoveryEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Handles identity `identity_number` of `wallet_id` against the frozen `block_hash`:
    ///
    /// 1. exports the identity's seed from the device
    /// 2. resumes after the last stored credential of a known identity, else starts at 0
    /// 3. scans the credentials
    /// 4. names the result after the known identity, or synthesizes a name
    /// 5. imports the result in one store transaction
    ///
    /// The controller is checked before the device call, before every lookup and
    /// right before the import, so an aborted walk never imports a partial result.
    ///
    /// # Errors
    /// Device, network, derivation and storage failures are returned as is.
    /// Returns [`crate::RecoveryError::Cancelled`] once the controller is aborted.
    pub async fn next_identity(
        &self,
        wallet_id: WalletId,
        identity_number: u32,
        block_hash: BlockHash,
    ) -> RecoveryResult<RecoveryStep> {
        self.emit(RecoveryEvent::AwaitingDevice { identity_number });
        let seed = self
            .controller
            .guard(self.device.prf_key_seed(identity_number))
            .await??;

        let (known, start_index) = self.store.read(|db| {
            let known = db.find_identity(wallet_id, identity_number).cloned();
            let start_index = known
                .as_ref()
                .map_or(0, |identity| db.next_credential_number(identity.id));
            (known, start_index)
        })?;

        self.emit(RecoveryEvent::Searching { identity_number });
        log::info!("scanning identity {identity_number} from credential {start_index}");
        let found = CredentialScanner::new(
            self.chain,
            self.deriver,
            self.global,
            self.controller,
            block_hash,
        )
        .with_max_credentials(self.config.max_credentials_on_account)
        .with_concurrency(self.config.scan_concurrency)
        .scan_credentials(ScanTarget {
            seed: &seed,
            identity_id: known
                .as_ref()
                .map_or(IdentityId::UNASSIGNED, |identity| identity.id),
            version: known
                .as_ref()
                .map_or(IdentityVersion::Current, |identity| identity.version),
            start_index,
        })
        .await?;

        let identity_name = known.as_ref().map_or_else(
            || recovered_identity_name(identity_number),
            |identity| identity.name.clone(),
        );
        let accounts: Vec<Account> = found.accounts().cloned().collect();

        self.controller.check()?;
        let imported =
            import_recovered(self.store, wallet_id, identity_number, known.as_ref(), found)?;
        log::info!(
            "identity {identity_number}: {} accounts found, {} new",
            accounts.len(),
            imported.accounts_added
        );

        Ok(RecoveryStep {
            identity_number,
            known_identity: known.is_some(),
            identity_name,
            accounts,
            imported,
        })
    }

    fn emit(&self, event: RecoveryEvent) {
        if let Some(events) = self.events {
            let _ = events.send(event);
        }
    }
}

//! Recovery session orchestration.
//!
//! A session freezes the last finalized block, pairs the device with a local
//! wallet and then walks identity numbers from 0 until the user stops at a
//! checkpoint or the session is cancelled. Progress is reported as
//! [`RecoveryEvent`]s; the host answers checkpoints through the
//! [`CheckpointPrompt`] carried by the event.
//!
//! ```text
//! freeze block ──► device seed ──► scan ──► import ──► heuristic ─┬─► next identity
//!                       ▲                                         │
//!                       └─────────────── continue ◄── checkpoint ◄┘
//! ```

use tokio::sync::{mpsc, oneshot};

use crate::cancel::RecoveryController;
use crate::chain::ChainOracle;
use crate::config::RecoveryConfig;
use crate::derivation::CredentialDeriver;
use crate::device::HardwareDevice;
use crate::error::{RecoveryError, RecoveryResult};
use crate::store::{AtomicBlobStore, WalletStore};
use crate::types::{Account, BlockHash, WalletId};
use crate::walker::{HeuristicVerdict, IdentityWalker, RecoveryStep, StoppingHeuristic};

/// Receiving half of a session's progress events.
pub type RecoveryEvents = mpsc::UnboundedReceiver<RecoveryEvent>;

/// Answer to a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointDecision {
    /// Keep scanning identity numbers.
    Continue,
    /// End the session.
    Stop,
}

/// A pending checkpoint question. Dropping it without answering means [`CheckpointDecision::Stop`].
#[derive(Debug)]
pub struct CheckpointPrompt {
    /// Number of identities in a row that had nothing.
    pub empty_run: u32,
    /// The identity number the session resumes at on `Continue`.
    pub next_identity_number: u32,
    reply: oneshot::Sender<CheckpointDecision>,
}

impl CheckpointPrompt {
    /// Answers the checkpoint.
    pub fn respond(self, decision: CheckpointDecision) {
        let _ = self.reply.send(decision);
    }
}

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user chose to stop at a checkpoint.
    UserStopped,
    /// The session's controller was aborted.
    Cancelled,
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Identity numbers fully handled.
    pub identities_scanned: u32,
    /// Accounts discovered across all identities.
    pub recovered_total: usize,
    /// How the session ended.
    pub stop_reason: StopReason,
}

/// Progress of a recovery session.
#[derive(Debug)]
pub enum RecoveryEvent {
    /// The snapshot block is frozen and the device is paired.
    SessionStarted {
        /// The block every lookup is answered against.
        block_hash: BlockHash,
        /// Local wallet of the device.
        wallet_id: WalletId,
    },
    /// Waiting for the user to confirm the seed export on the device.
    AwaitingDevice {
        /// The identity whose seed was requested.
        identity_number: u32,
    },
    /// Probing the credentials of an identity.
    Searching {
        /// The identity being scanned.
        identity_number: u32,
    },
    /// An identity was scanned and imported.
    IdentityDone {
        /// The identity that was handled.
        identity_number: u32,
        /// Its name, stored or synthesized.
        identity_name: String,
        /// Accounts found under it.
        accounts: Vec<Account>,
    },
    /// The empty run reached a checkpoint; the session waits for an answer.
    Checkpoint(CheckpointPrompt),
    /// The session ended without an error.
    Stopped(RecoveryReport),
    /// The session ended with an error.
    Failed(String),
}

/// State of a running session. Each step produces the next state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverySessionState {
    /// Block frozen at session start.
    pub block_hash: BlockHash,
    /// Next identity number to handle.
    pub current_identity_number: u32,
    /// Empty-run bookkeeping.
    pub heuristic: StoppingHeuristic,
    /// Accounts discovered so far.
    pub recovered_total: usize,
    /// Whether the session was cancelled.
    pub cancelled: bool,
    /// Highest identity number the wallet already stores. The session does
    /// not stop before it has handled this identity.
    pub max_known_identity: Option<u32>,
}

impl RecoverySessionState {
    /// Initial state: identity 0, empty counter.
    #[must_use]
    pub fn new(block_hash: BlockHash, spaces_between_warning: u32) -> Self {
        Self {
            block_hash,
            current_identity_number: 0,
            heuristic: StoppingHeuristic::new(spaces_between_warning),
            recovered_total: 0,
            cancelled: false,
            max_known_identity: None,
        }
    }

    /// Sets the highest identity number already stored for the wallet.
    #[must_use]
    pub const fn with_max_known_identity(self, max_known_identity: Option<u32>) -> Self {
        Self {
            max_known_identity,
            ..self
        }
    }

    /// Whether stored identities remain at or beyond the next identity number.
    #[must_use]
    pub const fn known_identities_ahead(&self) -> bool {
        match self.max_known_identity {
            Some(max) => self.current_identity_number <= max,
            None => false,
        }
    }

    /// Length of the current empty run.
    #[must_use]
    pub const fn empty_indices_counter(&self) -> u32 {
        self.heuristic.empty_indices_counter()
    }

    /// Folds a finished step into the state and moves to the next identity number.
    #[must_use]
    pub const fn advance(self, step: &RecoveryStep) -> (Self, HeuristicVerdict) {
        let (heuristic, verdict) = self.heuristic.record(step.known_identity, step.found_any());
        let next = Self {
            current_identity_number: self.current_identity_number.saturating_add(1),
            heuristic,
            recovered_total: self.recovered_total + step.accounts.len(),
            ..self
        };
        (next, verdict)
    }

    /// Marks the state as cancelled.
    #[must_use]
    pub const fn cancel(self) -> Self {
        Self {
            cancelled: true,
            ..self
        }
    }

    /// Summary of the session as of this state.
    #[must_use]
    pub const fn report(&self, stop_reason: StopReason) -> RecoveryReport {
        RecoveryReport {
            identities_scanned: self.current_identity_number,
            recovered_total: self.recovered_total,
            stop_reason,
        }
    }
}

/// One recovery run over a device.
pub struct RecoverySession<'a, D, C, B> {
    device: &'a D,
    chain: &'a C,
    deriver: &'a dyn CredentialDeriver,
    store: &'a WalletStore<B>,
    config: RecoveryConfig,
    controller: RecoveryController,
    events: mpsc::UnboundedSender<RecoveryEvent>,
}

impl<'a, D, C, B> RecoverySession<'a, D, C, B>
where
    D: HardwareDevice,
    C: ChainOracle,
    B: AtomicBlobStore,
{
    /// Prepares a session and returns it with its event stream. Nothing runs
    /// until [`run`](Self::run) is awaited.
    ///
    /// # Errors
    /// Returns [`RecoveryError::InvalidInput`] if `config` is out of range.
    pub fn new(
        device: &'a D,
        chain: &'a C,
        deriver: &'a dyn CredentialDeriver,
        store: &'a WalletStore<B>,
        config: RecoveryConfig,
    ) -> RecoveryResult<(Self, RecoveryEvents)> {
        config.validate()?;
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            device,
            chain,
            deriver,
            store,
            config,
            controller: RecoveryController::new(),
            events,
        };
        Ok((session, receiver))
    }

    /// The controller used to stop the session from outside.
    #[must_use]
    pub fn controller(&self) -> RecoveryController {
        self.controller.clone()
    }

    /// Runs the session to its end.
    ///
    /// Identities imported before an error or a cancellation stay imported.
    /// The last event is always `Stopped` or `Failed`.
    ///
    /// # Errors
    /// Device, network, derivation and storage failures end the session and
    /// are returned. Cancellation is not an error: it yields a report with
    /// [`StopReason::Cancelled`].
    pub async fn run(self) -> RecoveryResult<RecoveryReport> {
        let result = match self.drive().await {
            // Cancelled before the first identity
            Err(RecoveryError::Cancelled) => Ok(RecoveryReport {
                identities_scanned: 0,
                recovered_total: 0,
                stop_reason: StopReason::Cancelled,
            }),
            other => other,
        };
        self.controller.finish();

        match result {
            Ok(report) => {
                log::info!(
                    "recovery stopped after {} identities ({:?}), {} accounts found",
                    report.identities_scanned,
                    report.stop_reason,
                    report.recovered_total
                );
                self.emit(RecoveryEvent::Stopped(report.clone()));
                Ok(report)
            }
            Err(error) => {
                log::error!("recovery failed: {error}");
                self.emit(RecoveryEvent::Failed(error.to_string()));
                Err(error)
            }
        }
    }

    async fn drive(&self) -> RecoveryResult<RecoveryReport> {
        let block_hash = self
            .controller
            .guard(self.chain.last_finalized_block_hash())
            .await??;
        let global = self
            .controller
            .guard(self.chain.global_params(&block_hash))
            .await??;
        let identifier = self
            .controller
            .guard(self.device.wallet_identifier())
            .await??;
        let wallet_id = self
            .store
            .with_txn(|db| Ok(db.wallet_id_for(&identifier)))?;
        let max_known_identity = self.store.read(|db| {
            db.identities_of_wallet(wallet_id)
                .map(|identity| identity.identity_number)
                .max()
        })?;
        log::info!("recovery started at block {block_hash} for wallet {wallet_id}");
        self.emit(RecoveryEvent::SessionStarted {
            block_hash,
            wallet_id,
        });

        let walker = IdentityWalker::new(
            self.device,
            self.chain,
            self.deriver,
            self.store,
            &global,
            &self.config,
            &self.controller,
        )
        .with_events(&self.events);

        let mut state =
            RecoverySessionState::new(block_hash, self.config.identity_spaces_between_warning)
                .with_max_known_identity(max_known_identity);
        loop {
            let step = match walker
                .next_identity(wallet_id, state.current_identity_number, state.block_hash)
                .await
            {
                Ok(step) => step,
                Err(RecoveryError::Cancelled) => {
                    return Ok(state.cancel().report(StopReason::Cancelled));
                }
                Err(error) => return Err(error),
            };

            let (next, verdict) = state.advance(&step);
            state = next;
            self.emit(RecoveryEvent::IdentityDone {
                identity_number: step.identity_number,
                identity_name: step.identity_name,
                accounts: step.accounts,
            });

            if let HeuristicVerdict::Checkpoint { empty_run } = verdict {
                if state.known_identities_ahead() {
                    log::debug!(
                        "{empty_run} empty identities, continuing to stored identity {:?}",
                        state.max_known_identity
                    );
                    continue;
                }
                match self
                    .checkpoint(empty_run, state.current_identity_number)
                    .await
                {
                    Some(CheckpointDecision::Continue) => {}
                    Some(CheckpointDecision::Stop) => {
                        return Ok(state.report(StopReason::UserStopped));
                    }
                    None => return Ok(state.cancel().report(StopReason::Cancelled)),
                }
            }
        }
    }

    /// Asks the host whether to go on. Returns `None` if the session is
    /// cancelled while waiting.
    async fn checkpoint(
        &self,
        empty_run: u32,
        next_identity_number: u32,
    ) -> Option<CheckpointDecision> {
        log::warn!("{empty_run} identities in a row without accounts, asking whether to continue");
        let (reply, decision) = oneshot::channel();
        let prompt = CheckpointPrompt {
            empty_run,
            next_identity_number,
            reply,
        };
        if self.events.send(RecoveryEvent::Checkpoint(prompt)).is_err() {
            // Nobody is listening, so nobody can say continue.
            return Some(CheckpointDecision::Stop);
        }

        tokio::select! {
            biased;
            () = self.controller.cancelled() => None,
            decision = decision => Some(decision.unwrap_or(CheckpointDecision::Stop)),
        }
    }

    fn emit(&self, event: RecoveryEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::ImportSummary;
    use crate::types::{AccountAddress, AccountStatus, IdentityId};

    fn step(known_identity: bool, accounts: usize) -> RecoveryStep {
        let account = Account {
            address: AccountAddress::new([1; 32]),
            name: "account".to_string(),
            identity_id: IdentityId(1),
            status: AccountStatus::Confirmed,
            signature_threshold: 1,
            is_initial: true,
        };
        RecoveryStep {
            identity_number: 0,
            known_identity,
            identity_name: "identity".to_string(),
            accounts: vec![account; accounts],
            imported: ImportSummary::default(),
        }
    }

    #[test]
    fn test_state_advances_immutably() {
        let start = RecoverySessionState::new(BlockHash::new([7; 32]), 2);

        let (after_found, verdict) = start.clone().advance(&step(false, 3));
        assert_eq!(verdict, HeuristicVerdict::Continue);
        assert_eq!(after_found.current_identity_number, 1);
        assert_eq!(after_found.recovered_total, 3);
        assert_eq!(after_found.block_hash, start.block_hash);
        assert_eq!(start.current_identity_number, 0);

        let (after_empty, _) = after_found.advance(&step(false, 0));
        let (after_second_empty, verdict) = after_empty.advance(&step(false, 0));
        assert_eq!(verdict, HeuristicVerdict::Checkpoint { empty_run: 2 });
        assert_eq!(after_second_empty.empty_indices_counter(), 2);

        let report = after_second_empty.cancel().report(StopReason::Cancelled);
        assert_eq!(
            report,
            RecoveryReport {
                identities_scanned: 3,
                recovered_total: 3,
                stop_reason: StopReason::Cancelled,
            }
        );
    }

    #[test]
    fn test_known_identities_ahead() {
        let state = RecoverySessionState::new(BlockHash::new([7; 32]), 1);
        assert!(!state.known_identities_ahead());

        let state = state.with_max_known_identity(Some(1));
        assert!(state.known_identities_ahead());
        let (state, _) = state.advance(&step(false, 0));
        assert!(state.known_identities_ahead());
        let (state, _) = state.advance(&step(true, 0));
        assert_eq!(state.current_identity_number, 2);
        assert!(!state.known_identities_ahead());
    }

    #[test]
    fn test_dropped_prompt_means_stop() {
        let (reply, mut decision) = oneshot::channel();
        let prompt = CheckpointPrompt {
            empty_run: 5,
            next_identity_number: 5,
            reply,
        };
        drop(prompt);
        assert!(decision.try_recv().is_err());

        let (reply, mut decision) = oneshot::channel();
        CheckpointPrompt {
            empty_run: 5,
            next_identity_number: 5,
            reply,
        }
        .respond(CheckpointDecision::Continue);
        assert_eq!(decision.try_recv().unwrap(), CheckpointDecision::Continue);
    }
}

#![allow(dead_code)]

//! Common test utilities shared across integration tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use recoverykit_core::{
    AccountAddress, AccountCredential, AccountInfo, AtomicBlobStore, BlockHash, ChainOracle,
    CheckpointDecision, CredentialDeriver, CredentialId, GlobalParams, HardwareDevice,
    HkdfCredentialDeriver, IdentityVersion, MemoryChain, Policy, RecoveryController,
    RecoveryEvent, RecoveryEvents, RecoveryReport, RecoveryResult, RecoverySession,
    SoftwareDevice, StopReason, YearMonth,
};

pub const MASTER: [u8; 32] = [0x42; 32];
pub const BLOCK: BlockHash = BlockHash::new([0xF1; 32]);

pub fn global_params() -> GlobalParams {
    GlobalParams {
        genesis_string: "recoverykit integration".to_string(),
        on_chain_commitment_key: "ab".repeat(48),
    }
}

pub fn device() -> SoftwareDevice {
    SoftwareDevice::new(MASTER)
}

pub fn chain() -> MemoryChain {
    MemoryChain::new(BLOCK, global_params())
}

pub fn policy() -> Policy {
    Policy {
        created_at: YearMonth::from("202310"),
        valid_to: YearMonth::from("202810"),
        revealed_attributes: BTreeMap::new(),
    }
}

/// The credential id the device's identity `identity_number` has at `credential_number`.
pub fn cred_id(identity_number: u32, credential_number: u32) -> CredentialId {
    HkdfCredentialDeriver
        .derive_credential_id(
            &device().seed_for(identity_number).unwrap(),
            credential_number,
            &global_params(),
            IdentityVersion::Current,
        )
        .unwrap()
}

/// Deploys one account holding the given credentials of `identity_number`.
pub fn deploy(chain: &MemoryChain, identity_number: u32, credential_numbers: &[u32]) -> AccountAddress {
    let account_credentials = credential_numbers
        .iter()
        .zip(0u8..)
        .map(|(credential_number, index)| {
            let cred_id = cred_id(identity_number, *credential_number);
            let credential = if *credential_number == 0 {
                AccountCredential::Initial {
                    reg_id: cred_id,
                    policy: policy(),
                }
            } else {
                AccountCredential::Normal {
                    cred_id,
                    policy: policy(),
                }
            };
            (index, credential)
        })
        .collect();
    chain
        .insert_account(AccountInfo {
            account_threshold: 1,
            account_credentials,
        })
        .unwrap()
}

/// Events without their checkpoint responders, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Started,
    AwaitingDevice(u32),
    Searching(u32),
    IdentityDone { identity_number: u32, accounts: usize },
    Checkpoint { empty_run: u32, next_identity_number: u32 },
    Stopped(StopReason),
    Failed(String),
}

/// What the event consumer does at a checkpoint.
#[derive(Debug, Clone, Copy)]
pub enum Answer {
    Decide(CheckpointDecision),
    /// Aborts the session and leaves the prompt unanswered.
    Abort,
}

/// Runs `session`, answering checkpoints with `answers` in order (Stop once
/// they run out) and collecting every event.
pub async fn run_session<D, C, B>(
    session: RecoverySession<'_, D, C, B>,
    mut events: RecoveryEvents,
    answers: &[Answer],
) -> (RecoveryResult<RecoveryReport>, Vec<Seen>)
where
    D: HardwareDevice,
    C: ChainOracle,
    B: AtomicBlobStore,
{
    let controller = session.controller();
    let mut answers: VecDeque<Answer> = answers.iter().copied().collect();

    let consumer = async move {
        let mut seen = Vec::new();
        let mut unanswered = Vec::new();
        while let Some(event) = events.recv().await {
            match event {
                RecoveryEvent::SessionStarted { .. } => seen.push(Seen::Started),
                RecoveryEvent::AwaitingDevice { identity_number } => {
                    seen.push(Seen::AwaitingDevice(identity_number));
                }
                RecoveryEvent::Searching { identity_number } => {
                    seen.push(Seen::Searching(identity_number));
                }
                RecoveryEvent::IdentityDone {
                    identity_number,
                    accounts,
                    ..
                } => seen.push(Seen::IdentityDone {
                    identity_number,
                    accounts: accounts.len(),
                }),
                RecoveryEvent::Checkpoint(prompt) => {
                    seen.push(Seen::Checkpoint {
                        empty_run: prompt.empty_run,
                        next_identity_number: prompt.next_identity_number,
                    });
                    match answers
                        .pop_front()
                        .unwrap_or(Answer::Decide(CheckpointDecision::Stop))
                    {
                        Answer::Decide(decision) => prompt.respond(decision),
                        Answer::Abort => {
                            controller.abort();
                            unanswered.push(prompt);
                        }
                    }
                }
                RecoveryEvent::Stopped(report) => seen.push(Seen::Stopped(report.stop_reason)),
                RecoveryEvent::Failed(message) => seen.push(Seen::Failed(message)),
            }
        }
        drop(unanswered);
        seen
    };

    tokio::join!(session.run(), consumer)
}

/// Chain wrapper that aborts a controller from inside the n-th account lookup,
/// after the lookup itself has been answered.
pub struct AbortingChain {
    inner: MemoryChain,
    abort_on_lookup: usize,
    lookups: AtomicUsize,
    controller: Mutex<Option<RecoveryController>>,
}

impl AbortingChain {
    pub fn new(inner: MemoryChain, abort_on_lookup: usize) -> Self {
        Self {
            inner,
            abort_on_lookup,
            lookups: AtomicUsize::new(0),
            controller: Mutex::new(None),
        }
    }

    pub fn arm(&self, controller: RecoveryController) {
        *self.controller.lock().unwrap() = Some(controller);
    }

    pub fn inner(&self) -> &MemoryChain {
        &self.inner
    }
}

impl ChainOracle for AbortingChain {
    async fn last_finalized_block_hash(&self) -> RecoveryResult<BlockHash> {
        self.inner.last_finalized_block_hash().await
    }

    async fn global_params(&self, block_hash: &BlockHash) -> RecoveryResult<GlobalParams> {
        self.inner.global_params(block_hash).await
    }

    async fn account_info(
        &self,
        cred_id: &CredentialId,
        block_hash: &BlockHash,
    ) -> RecoveryResult<Option<AccountInfo>> {
        let result = self.inner.account_info(cred_id, block_hash).await;
        if self.lookups.fetch_add(1, Ordering::SeqCst) + 1 == self.abort_on_lookup {
            if let Some(controller) = self.controller.lock().unwrap().as_ref() {
                controller.abort();
            }
        }
        result
    }
}

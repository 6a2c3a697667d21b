//! `recoverykit-core` rebuilds a wallet's identities, credentials and accounts
//! from public chain state, using only a hardware device able to export
//! per-identity PRF key seeds.
//!
//! A [`RecoverySession`] walks identity numbers from 0. For each one it asks
//! the device for the identity's seed, derives the candidate credential ids
//! `0..max_credentials_on_account`, looks each of them up on a block frozen at
//! session start and imports whatever was found. After a stretch of identities
//! without any evidence the session pauses and asks whether to go on.
//!
//! ```rust,no_run
//! use recoverykit_core::{
//!     CheckpointDecision, HkdfCredentialDeriver, HttpChainClient, MemoryBlobStore,
//!     RecoveryConfig, RecoveryEvent, RecoverySession, SoftwareDevice, WalletStore,
//! };
//!
//! # async fn recover() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RecoveryConfig::default();
//! let chain = HttpChainClient::new(&config.node_url)?;
//! let device = SoftwareDevice::new([7u8; 32]);
//! let store = WalletStore::open(MemoryBlobStore::new())?;
//!
//! let (session, mut events) =
//!     RecoverySession::new(&device, &chain, &HkdfCredentialDeriver, &store, config)?;
//! let ui = async move {
//!     while let Some(event) = events.recv().await {
//!         if let RecoveryEvent::Checkpoint(prompt) = event {
//!             prompt.respond(CheckpointDecision::Stop);
//!         }
//!     }
//! };
//! let (report, ()) = tokio::join!(session.run(), ui);
//! println!("recovered {} accounts", report?.recovered_total);
//! # Ok(())
//! # }
//! ```
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

mod cancel;
pub use cancel::RecoveryController;

pub mod chain;
pub use chain::{AccountCredential, AccountInfo, ChainOracle, HttpChainClient, MemoryChain};

mod config;
pub use config::{Environment, RecoveryConfig, MAINNET_NODE_URL, TESTNET_NODE_URL};

pub mod derivation;
pub use derivation::{
    address_from_credential_id, CredentialDeriver, GlobalParams, HkdfCredentialDeriver, PrfKeySeed,
};

pub mod device;
pub use device::{DeviceError, HardwareDevice, SoftwareDevice};

mod error;
pub use error::*;

mod import;
pub use import::{
    import_recovered, recovered_identity, recovered_identity_name, ImportSummary,
    RECOVERED_ACCOUNT_NOTE,
};

pub mod logger;

mod scanner;
pub use scanner::{CredentialScanner, ScanTarget};

mod session;
pub use session::{
    CheckpointDecision, CheckpointPrompt, RecoveryEvent, RecoveryEvents, RecoveryReport,
    RecoverySession, RecoverySessionState, StopReason,
};

pub mod store;
pub use store::{
    AtomicBlobStore, FsBlobStore, MemoryBlobStore, StorageError, StorageResult, WalletDatabase,
    WalletStore,
};

mod types;
pub use types::*;

mod walker;
pub use walker::{
    should_reset_counter, HeuristicVerdict, IdentityWalker, RecoveryStep, StoppingHeuristic,
};

// private modules
mod http_request;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!("recoverykit_core");

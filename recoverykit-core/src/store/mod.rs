//! Local wallet database.
//!
//! The whole database is a single CBOR document kept in an [`AtomicBlobStore`].
//! [`WalletStore::with_txn`] gives every import step all-or-nothing semantics:
//! mutations run against a copy of the database and the copy is written back
//! (atomically) only when the closure succeeds.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod database;
mod fs;
mod memory;

pub use database::WalletDatabase;
pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

/// Name of the blob holding the wallet database.
pub const WALLET_BLOB: &str = "wallet.cbor";

/// Current envelope format version.
const FORMAT_VERSION: u32 = 1;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the local store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The blob store backend failed.
    #[error("blob_store_error: {0}")]
    BlobStore(String),
    /// The stored database could not be encoded or decoded.
    #[error("serialization_error: {0}")]
    Serialization(String),
    /// A file system operation failed.
    #[error("io_error: {context}")]
    Io {
        /// What was being done.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A write would violate a uniqueness constraint.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Atomic storage for small named blobs.
///
/// Writes must be atomic: a reader sees either the complete old content or the
/// complete new content.
pub trait AtomicBlobStore: Send + Sync {
    /// Reads a blob by name. Returns `Ok(None)` if it does not exist.
    ///
    /// # Errors
    /// Returns an error if reading fails.
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Atomically writes a blob, replacing any existing content.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Deletes a blob. Deleting a missing blob is not an error.
    ///
    /// # Errors
    /// Returns an error if deletion fails.
    fn delete(&self, name: &str) -> StorageResult<()>;
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    database: WalletDatabase,
}

/// Transactional access to the wallet database stored in a blob store.
pub struct WalletStore<B> {
    blobs: B,
    database: Mutex<WalletDatabase>,
}

impl<B: AtomicBlobStore> WalletStore<B> {
    /// Opens the database kept in `blobs`, starting empty if none was stored yet.
    ///
    /// # Errors
    /// Returns an error if the stored blob cannot be read or decoded.
    pub fn open(blobs: B) -> StorageResult<Self> {
        let database = match blobs.read(WALLET_BLOB)? {
            Some(bytes) => decode(&bytes)?,
            None => WalletDatabase::default(),
        };
        Ok(Self {
            blobs,
            database: Mutex::new(database),
        })
    }

    /// Runs a read-only query against the current database.
    ///
    /// # Errors
    /// Returns an error if the database lock is poisoned.
    pub fn read<T>(&self, query: impl FnOnce(&WalletDatabase) -> T) -> StorageResult<T> {
        let database = self.lock()?;
        Ok(query(&database))
    }

    /// Runs `txn` against a copy of the database and persists the copy if the
    /// closure returns `Ok`. On error nothing is written and the in-memory
    /// database is left untouched.
    ///
    /// Transactions are serialized.
    ///
    /// # Errors
    /// Returns the closure's error, or a storage error if the commit fails.
    pub fn with_txn<T>(
        &self,
        txn: impl FnOnce(&mut WalletDatabase) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut database = self.lock()?;
        let mut working = database.clone();
        let output = txn(&mut working)?;
        self.blobs.write_atomic(WALLET_BLOB, &encode(&working)?)?;
        *database = working;
        Ok(output)
    }

    /// Returns a copy of the whole database.
    ///
    /// # Errors
    /// Returns an error if the database lock is poisoned.
    pub fn snapshot(&self) -> StorageResult<WalletDatabase> {
        self.read(WalletDatabase::clone)
    }

    /// The underlying blob store.
    pub const fn blobs(&self) -> &B {
        &self.blobs
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, WalletDatabase>> {
        self.database
            .lock()
            .map_err(|_| StorageError::BlobStore("wallet database lock poisoned".to_string()))
    }
}

fn encode(database: &WalletDatabase) -> StorageResult<Vec<u8>> {
    let envelope = Envelope {
        version: FORMAT_VERSION,
        database: database.clone(),
    };
    let mut bytes = Vec::new();
    ciborium::into_writer(&envelope, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> StorageResult<WalletDatabase> {
    let envelope: Envelope =
        ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
    if envelope.version != FORMAT_VERSION {
        return Err(StorageError::Serialization(format!(
            "unsupported wallet format version {}",
            envelope.version
        )));
    }
    Ok(envelope.database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IdentityStatus, IdentityVersion, NewIdentity, WalletId};

    fn new_identity(wallet_id: WalletId, identity_number: u32) -> NewIdentity {
        NewIdentity {
            wallet_id,
            identity_number,
            name: format!("Identity {identity_number}"),
            status: IdentityStatus::Confirmed,
            version: IdentityVersion::Current,
            identity_object: "{}".to_string(),
        }
    }

    #[test]
    fn test_txn_commits_on_ok() {
        let store = WalletStore::open(MemoryBlobStore::new()).unwrap();
        let wallet_id = store.with_txn(|db| Ok(db.wallet_id_for(b"device"))).unwrap();
        store
            .with_txn(|db| db.insert_identity(new_identity(wallet_id, 0)))
            .unwrap();

        let reopened = WalletStore::open(store.blobs().clone()).unwrap();
        assert_eq!(reopened.snapshot().unwrap(), store.snapshot().unwrap());
        assert_eq!(
            reopened
                .read(|db| db.identities_of_wallet(wallet_id).count())
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_txn_rolls_back_on_error() {
        let store = WalletStore::open(MemoryBlobStore::new()).unwrap();
        let wallet_id = store.with_txn(|db| Ok(db.wallet_id_for(b"device"))).unwrap();
        let before = store.snapshot().unwrap();

        let result = store.with_txn(|db| {
            db.insert_identity(new_identity(wallet_id, 0))?;
            // Same identity number twice violates uniqueness
            db.insert_identity(new_identity(wallet_id, 0))
        });
        assert!(matches!(result, Err(StorageError::Conflict(_))));
        assert_eq!(store.snapshot().unwrap(), before);

        let reopened = WalletStore::open(store.blobs().clone()).unwrap();
        assert_eq!(reopened.snapshot().unwrap(), before);
    }

    #[test]
    fn test_rejects_unknown_format_version() {
        let mut bytes = Vec::new();
        ciborium::into_writer(
            &Envelope {
                version: 99,
                database: WalletDatabase::default(),
            },
            &mut bytes,
        )
        .unwrap();
        let blobs = MemoryBlobStore::new();
        blobs.write_atomic(WALLET_BLOB, &bytes).unwrap();

        assert!(matches!(
            WalletStore::open(blobs),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        let blobs = MemoryBlobStore::new();
        blobs.write_atomic(WALLET_BLOB, b"not cbor at all").unwrap();
        assert!(WalletStore::open(blobs).is_err());
    }
}

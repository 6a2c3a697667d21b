//! In-memory blob store for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{AtomicBlobStore, StorageError, StorageResult};

/// In-memory [`AtomicBlobStore`]. Clones share the same blobs.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| StorageError::BlobStore("memory blob store poisoned".to_string()))
    }
}

impl AtomicBlobStore for MemoryBlobStore {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.lock()?.get(name).cloned())
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        self.lock()?.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        self.lock()?.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_blob_store_lifecycle() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.read("a").unwrap(), None);

        store.write_atomic("a", b"one").unwrap();
        store.write_atomic("a", b"two").unwrap();
        assert_eq!(store.read("a").unwrap(), Some(b"two".to_vec()));

        // Clones see the same data
        let clone = store.clone();
        clone.delete("a").unwrap();
        assert_eq!(store.read("a").unwrap(), None);
        store.delete("a").unwrap();
    }
}

//! File system blob store.
//!
//! Writes follow the write-to-temp-then-rename pattern:
//!
//! 1. Write data to a temporary file in the same directory
//! 2. `fsync` the temporary file
//! 3. Rename the temporary file over the target
//! 4. `fsync` the parent directory
//!
//! so readers always see either the old or the new content.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{AtomicBlobStore, StorageError, StorageResult};

fn io_error(context: impl Into<String>, source: std::io::Error) -> StorageError {
    StorageError::Io {
        context: context.into(),
        source,
    }
}

/// Removes a temporary file on drop unless it was committed.
struct TempFile<'a> {
    path: &'a Path,
    committed: bool,
}

impl<'a> TempFile<'a> {
    const fn new(path: &'a Path) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for TempFile<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(self.path);
        }
    }
}

/// [`AtomicBlobStore`] backed by one directory on disk.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    directory: PathBuf,
}

impl FsBlobStore {
    /// Opens a blob store in `directory`, creating the directory if needed.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn new(directory: impl AsRef<Path>) -> StorageResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|e| {
            io_error(
                format!("failed to create blob directory '{}'", directory.display()),
                e,
            )
        })?;
        Ok(Self { directory })
    }

    /// Directory holding the blobs.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!(".{name}.tmp"))
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.directory)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| io_error("failed to fsync blob directory", e))
    }

    #[cfg(not(unix))]
    #[allow(clippy::unnecessary_wraps, clippy::unused_self)]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl AtomicBlobStore for FsBlobStore {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.blob_path(name);
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(format!("failed to read '{}'", path.display()), e)),
        }
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        let final_path = self.blob_path(name);
        let temp_path = self.temp_path(name);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| io_error(format!("failed to create '{}'", temp_path.display()), e))?;
        let temp = TempFile::new(&temp_path);
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| io_error(format!("failed to write '{}'", temp_path.display()), e))?;
        drop(file);

        fs::rename(&temp_path, &final_path).map_err(|e| {
            io_error(
                format!(
                    "failed to rename '{}' to '{}'",
                    temp_path.display(),
                    final_path.display()
                ),
                e,
            )
        })?;
        temp.commit();

        self.sync_directory()
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        let path = self.blob_path(name);
        match fs::remove_file(&path) {
            Ok(()) => self.sync_directory(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(format!("failed to delete '{}'", path.display()), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_blob_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("nested")).unwrap();

        assert_eq!(store.read("wallet.cbor").unwrap(), None);
        store.write_atomic("wallet.cbor", b"first").unwrap();
        store.write_atomic("wallet.cbor", b"second").unwrap();
        assert_eq!(store.read("wallet.cbor").unwrap(), Some(b"second".to_vec()));

        // No temporary file is left behind
        assert!(!store.temp_path("wallet.cbor").exists());

        store.delete("wallet.cbor").unwrap();
        assert_eq!(store.read("wallet.cbor").unwrap(), None);
        store.delete("wallet.cbor").unwrap();
    }

    #[test]
    fn test_failed_write_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();

        // A non-empty directory in place of the blob makes the rename fail
        fs::create_dir(store.blob_path("wallet.cbor")).unwrap();
        fs::write(store.blob_path("wallet.cbor").join("keep"), b"x").unwrap();

        let result = store.write_atomic("wallet.cbor", b"data");
        assert!(matches!(result, Err(StorageError::Io { .. })));
        assert!(!store.temp_path("wallet.cbor").exists());
    }

    #[test]
    fn test_uncommitted_temp_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".blob.tmp");

        fs::write(&path, b"partial").unwrap();
        drop(TempFile::new(&path));
        assert!(!path.exists());

        fs::write(&path, b"complete").unwrap();
        TempFile::new(&path).commit();
        assert!(path.exists());
    }
}

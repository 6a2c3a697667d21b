pub mod accounts;
pub mod recover;

use std::path::PathBuf;

use eyre::{eyre, WrapErr};
use recoverykit_core::{FsBlobStore, WalletStore};

/// Store used by every command.
pub type CliStore = WalletStore<FsBlobStore>;

/// Opens the wallet store in `dir`, or in `<data dir>/recoverykit`.
pub fn open_store(dir: Option<PathBuf>) -> eyre::Result<CliStore> {
    let dir = match dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .ok_or_else(|| eyre!("no data directory on this platform, pass --store-dir"))?
            .join("recoverykit"),
    };
    tracing::debug!(store = %dir.display(), "opening wallet store");
    let blobs = FsBlobStore::new(&dir)
        .wrap_err_with(|| format!("failed to open store directory {}", dir.display()))?;
    Ok(WalletStore::open(blobs)?)
}

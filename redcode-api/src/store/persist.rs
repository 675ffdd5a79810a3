//! On-disk format and the atomic write protocol.
//!
//! The database is one pretty-printed JSON document. Writes go to a sibling
//! `.tmp` file which is synced and then renamed over the target, so readers
//! only ever see the old or the new document.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::dataset::{Dataset, Records};
use super::error::StoreError;

pub(crate) fn encode(data: &Dataset) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(&data.records()).map_err(StoreError::Encode)
}

pub(crate) fn decode(path: &Path, bytes: &[u8]) -> Result<Dataset, StoreError> {
    let records: Records = serde_json::from_slice(bytes).map_err(|source| StoreError::Corrupt {
        path: path.to_owned(),
        source,
    })?;
    Dataset::from_records(records).map_err(|id| StoreError::DuplicateBotId {
        path: path.to_owned(),
        id,
    })
}

/// Reads the database at `path`. `Ok(None)` means the file does not exist yet.
pub(crate) async fn load(path: &Path) -> Result<Option<Dataset>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => decode(path, &bytes).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Sibling of `path` used as the staging file for [`write_atomic`].
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("database"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces `path` with `bytes` via write-temp-then-rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::io(dir, e))?;
    }

    let tmp = temp_path(path);
    if let Err(e) = write_synced(&tmp, bytes).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(StoreError::io(&tmp, e));
    }

    fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))?;

    debug!(path = %path.display(), bytes = bytes.len(), "database written");
    Ok(())
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

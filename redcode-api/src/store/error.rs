use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The database file exists but does not parse. Fatal at startup.
    #[error("database file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("database file {} contains bot id {id} more than once", path.display())]
    DuplicateBotId { path: PathBuf, id: i64 },

    #[error("failed to encode database: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("username {0:?} already exists")]
    DuplicateUsername(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

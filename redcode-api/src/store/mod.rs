//! In-memory record store with durable snapshotting.
//!
//! A single [`RwLock`] guards the user and bot collections together with the
//! bot name index. Every mutation takes it exclusively; queries and the
//! persistence snapshot take it shared. Disk I/O only ever happens on an
//! encoded copy, after the guard is released.

mod dataset;
mod error;
mod index;
mod persist;

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Mutex;
use tracing::info;

pub use dataset::{Dataset, Stats};
pub use error::StoreError;

use crate::models::Bot;

pub struct Store {
    data: RwLock<Dataset>,
    path: PathBuf,
    /// Serializes saves so an older snapshot never lands after a newer one.
    save_lock: Mutex<()>,
    /// Dataset generation captured by the last successful save.
    saved_generation: AtomicU64,
}

/// Shared, read-only view of the whole dataset. Holds the store guard until dropped.
///
/// The guard is not reentrant: calling a mutating [`Store`] method on the same
/// thread while a snapshot is alive deadlocks.
pub struct Snapshot<'a>(RwLockReadGuard<'a, Dataset>);

impl Deref for Snapshot<'_> {
    type Target = Dataset;

    fn deref(&self) -> &Dataset {
        &self.0
    }
}

impl Store {
    /// Loads the database at `path`, creating and persisting an empty one if
    /// the file does not exist. A file that fails to parse is an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        match persist::load(&path).await? {
            Some(data) => {
                info!(
                    path = %path.display(),
                    users = data.users().len(),
                    bots = data.bots().len(),
                    "database loaded"
                );
                Ok(Self::with_dataset(path, data))
            }
            None => {
                info!(path = %path.display(), "no database found, creating an empty one");
                let store = Self::with_dataset(path, Dataset::new());
                store.persist_now().await?;
                Ok(store)
            }
        }
    }

    fn with_dataset(path: PathBuf, data: Dataset) -> Self {
        Store {
            data: RwLock::new(data),
            path,
            save_lock: Mutex::new(()),
            saved_generation: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // A panic inside a closure cannot leave a half-applied update behind any
    // more than an early return can, so poisoning is not propagated.
    fn read_guard(&self) -> RwLockReadGuard<'_, Dataset> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Dataset> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read-only view for listings and aggregate queries.
    ///
    /// Writers block until the snapshot is dropped; do not hold it across an
    /// `.await`.
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot(self.read_guard())
    }

    /// Runs `f` with exclusive access. Multi-step edits (such as deleting a bot
    /// from both the index and the collection) are atomic with respect to
    /// every other reader and writer.
    pub fn with_exclusive<R>(&self, f: impl FnOnce(&mut Dataset) -> R) -> R {
        let mut guard = self.write_guard();
        f(&mut guard)
    }

    /// Hot path: finds a bot by name through the index and mutates it in
    /// place under the exclusive guard. `None` if no bot has that name.
    pub fn with_bot<R>(&self, name: &str, f: impl FnOnce(&mut Bot) -> R) -> Option<R> {
        self.with_exclusive(|data| data.bot_by_name_mut(name).map(f))
    }

    /// Writes the current dataset to disk now.
    pub async fn persist_now(&self) -> Result<(), StoreError> {
        let _saving = self.save_lock.lock().await;

        let (bytes, generation) = {
            let data = self.read_guard();
            (persist::encode(&data)?, data.generation())
        };

        persist::write_atomic(&self.path, &bytes).await?;
        self.saved_generation.fetch_max(generation, Ordering::SeqCst);
        Ok(())
    }

    /// Saves only when something may have changed since the last successful
    /// save. Returns whether a write happened.
    pub async fn persist_if_dirty(&self) -> Result<bool, StoreError> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.persist_now().await?;
        Ok(true)
    }

    pub fn is_dirty(&self) -> bool {
        self.read_guard().generation() != self.saved_generation.load(Ordering::SeqCst)
    }
}

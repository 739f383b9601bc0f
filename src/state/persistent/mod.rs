//! Durable change-state backend.
//!
//! Keeps the state of one deployment in a directory:
//! - an exclusive lock file, held while the store is open
//! - one CRC-framed JSON snapshot, replaced atomically on save
//!
//! Only one store may be open per directory, which is what keeps two cycles
//! from racing on the same state.

mod codec;
mod file_lock;
mod store;

pub use file_lock::{StateLock, LOCK_FILE_NAME};
pub use store::{FileStateStore, STATE_FILE_NAME};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Configuration for the on-disk state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateFileConfig {
    /// Whether to fsync the snapshot before renaming it into place.
    pub sync_on_write: bool,
}

impl Default for StateFileConfig {
    fn default() -> Self {
        Self { sync_on_write: true }
    }
}

/// Open or create a persistent state store in `dir`.
///
/// # Errors
/// - If the directory cannot be created or accessed
/// - If another store holds the lock
///
/// # Example
/// ```rust,ignore
/// use statuscast::state::open_state_store;
///
/// let store = open_state_store("./state", None)?;
/// let state = store.load()?;
/// ```
pub fn open_state_store(
    dir: impl AsRef<Path>,
    config: Option<StateFileConfig>,
) -> Result<FileStateStore, StateError> {
    FileStateStore::open(dir.as_ref(), config.unwrap_or_default())
}

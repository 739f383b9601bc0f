use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use crate::error::StateError;
use crate::state::{ChangeState, StateStore};

use super::codec;
use super::file_lock::StateLock;
use super::StateFileConfig;

/// Name of the state snapshot inside the state directory.
pub const STATE_FILE_NAME: &str = "change_state.stcs";

/// Change-state persisted as a single CRC-framed file in a locked directory.
///
/// Saves go to a temporary sibling first and are renamed over the snapshot,
/// so a crash mid-save leaves the previous state intact.
#[derive(Debug)]
pub struct FileStateStore {
    dir: PathBuf,
    path: PathBuf,
    cfg: StateFileConfig,
    _lock: StateLock,
}

impl FileStateStore {
    /// Open (creating if needed) the state directory and take its lock.
    ///
    /// # Errors
    /// - `StateError::Locked` if another store holds the directory
    /// - `StateError::Io` if the directory cannot be created or locked
    pub fn open(dir: &Path, cfg: StateFileConfig) -> Result<Self, StateError> {
        fs::create_dir_all(dir)?;
        let lock = StateLock::acquire(dir).map_err(|e| match e.kind() {
            ErrorKind::WouldBlock => StateError::Locked {
                path: dir.display().to_string(),
            },
            _ => StateError::Io(e),
        })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            path: dir.join(STATE_FILE_NAME),
            cfg,
            _lock: lock,
        })
    }

    /// Path of the state snapshot.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{STATE_FILE_NAME}.tmp"))
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<ChangeState, StateError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ChangeState::default()),
            Err(e) => return Err(StateError::Io(e)),
        };

        let mut reader = BufReader::new(file);
        match codec::decode::<ChangeState>(&mut reader) {
            Ok(state) => Ok(state),
            Err(e) if matches!(e.kind(), ErrorKind::InvalidData | ErrorKind::UnexpectedEof) => {
                // Starting over only risks re-announcing live events once.
                tracing::warn!(path = %self.path.display(), error = %e, "state file corrupted; starting fresh");
                Ok(ChangeState::default())
            }
            Err(e) => Err(StateError::Io(e)),
        }
    }

    fn save(&self, state: &ChangeState) -> Result<(), StateError> {
        let image = codec::encode(state).map_err(|e| StateError::Serialization(e.to_string()))?;
        let tmp = self.temp_path();

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            codec::write_image(&mut file, &image)?;
            if self.cfg.sync_on_write {
                file.sync_all()?;
            }
        }

        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), bytes = image.len(), tracked = state.tracked_count(), "state saved");
        Ok(())
    }
}

//! Persistence of the pending queue between runs.
//!
//! The queue, including its undo and redo histories, is stored as versioned
//! JSON together with the number of audit records it already reflects. Writes
//! go to a sibling temporary file which is then renamed over the original, so
//! an interrupted save leaves the previous state intact.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::domain::ReversibleQueue;

/// The queue as last saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQueue {
    /// Pending tickets and their histories.
    pub queue: ReversibleQueue,
    /// How many audit records were already applied to `queue` when it was
    /// saved. Records past this point may describe tickets the queue still
    /// shows as pending.
    #[serde(default)]
    pub audited: usize,
}

/// Errors raised while loading or saving the queue file.
#[derive(Debug, thiserror::Error)]
pub enum QueueFileError {
    /// The file could not be read or written.
    #[error("failed to access queue file {path}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The file content is not a valid queue.
    #[error("queue file {path} is corrupt")]
    Json {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },
}

/// Loads the queue from `path`. A missing file is an empty queue.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load(path: &Path) -> Result<SavedQueue, QueueFileError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("no queue file at {}, starting empty", path.display());
            return Ok(SavedQueue::default());
        }
        Err(source) => {
            return Err(QueueFileError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&content).map_err(|source| QueueFileError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Saves the queue to `path`, replacing any previous content.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save(path: &Path, saved: &SavedQueue) -> Result<(), QueueFileError> {
    let io_error = |source| QueueFileError::Io {
        path: path.to_path_buf(),
        source,
    };
    let content = serde_json::to_string_pretty(saved).map_err(|source| QueueFileError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, content).map_err(io_error)?;
    fs::rename(&staging, path).map_err(io_error)
}

//! Error type for checkpoint persistence

use std::io;
use std::path::PathBuf;

/// Failure to load or save the checkpoint backing file.
#[derive(Debug)]
pub enum CheckpointError {
    /// Writing the backing file failed; the previously persisted file is intact.
    Persist { path: PathBuf, source: io::Error },
    /// The backing file exists but cannot be read or parsed into a consistent state.
    Corrupt { path: PathBuf, reason: String },
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persist { path, source } => {
                write!(f, "failed to persist checkpoint {}: {source}", path.display())
            }
            Self::Corrupt { path, reason } => {
                write!(f, "corrupt checkpoint {}: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Persist { source, .. } => Some(source),
            Self::Corrupt { .. } => None,
        }
    }
}

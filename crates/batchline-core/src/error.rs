//! Error type for the ingestion pipeline

use std::io;
use std::path::PathBuf;

use batchline_checkpoint::CheckpointError;

use crate::source::Codec;

/// Boxed error returned by line handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error from reading or handling one input file, or from the run itself.
///
/// [`Canceled`](IngestError::Canceled) is the expected result of an external
/// interrupt and is never reported as a run failure.
#[derive(Debug)]
pub enum IngestError {
    /// Input file missing or unreadable
    Open { path: PathBuf, source: io::Error },
    /// Decompression layer could not start (bad or truncated header)
    DecodeInit {
        path: PathBuf,
        codec: Codec,
        source: io::Error,
    },
    /// I/O or decode failure after the file was opened
    Read {
        path: PathBuf,
        line: u64,
        source: io::Error,
    },
    /// Line handler returned an error
    Handler {
        path: PathBuf,
        line: u64,
        source: BoxError,
    },
    /// Checkpoint file could not be loaded or saved
    Checkpoint(CheckpointError),
    /// Cancellation observed between lines
    Canceled,
    /// Invalid pipeline configuration
    Config(String),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { path, source } => write!(f, "cannot open {}: {source}", path.display()),
            Self::DecodeInit {
                path,
                codec,
                source,
            } => write!(f, "cannot start {codec} decoder for {}: {source}", path.display()),
            Self::Read { path, line, source } => {
                write!(f, "read error in {} at line {line}: {source}", path.display())
            }
            Self::Handler { path, line, source } => {
                write!(f, "handle error in {} at line {line}: {source}", path.display())
            }
            Self::Checkpoint(e) => write!(f, "{e}"),
            Self::Canceled => write!(f, "canceled"),
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { source, .. }
            | Self::DecodeInit { source, .. }
            | Self::Read { source, .. } => Some(source),
            Self::Handler { source, .. } => Some(source.as_ref()),
            Self::Checkpoint(e) => Some(e),
            Self::Canceled | Self::Config(_) => None,
        }
    }
}

impl From<CheckpointError> for IngestError {
    fn from(e: CheckpointError) -> Self {
        Self::Checkpoint(e)
    }
}

impl IngestError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

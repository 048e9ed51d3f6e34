//! Batchline Core - resumable concurrent line ingestion
//!
//! Reads plain, gzip and zstd files line by line on a fixed pool of workers,
//! hands each line to a user handler, and checkpoints per-file progress so an
//! interrupted run picks up where it stopped.

pub mod discover;
pub mod error;
pub mod handler;
pub mod logging;
pub mod progress;
pub mod runner;
pub mod shutdown;
pub mod source;
pub mod work_queue;
pub mod worker;

// Re-exports for convenience
pub use batchline_checkpoint::{CheckpointError, CheckpointState, CheckpointStore};
pub use discover::{check_files, load_files, resolve_inputs};
pub use error::{BoxError, IngestError};
pub use handler::{FnHandler, LineHandler, handler_fn};
pub use logging::{IndicatifLogger, Verbosity, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use runner::{Dispatcher, RunSummary};
pub use shutdown::CancelToken;
pub use source::{Codec, LineSource, read_lines};
pub use work_queue::{FileTask, TaskQueue};
pub use worker::{FileReport, FileStatus, PROGRESS_INTERVAL, process_file};

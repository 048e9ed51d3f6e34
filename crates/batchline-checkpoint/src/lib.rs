//! batchline-checkpoint: durable per-file read progress
//!
//! Tracks how far each input file has been read and which files are fully
//! done, so an interrupted ingestion run can resume where it stopped.

pub mod error;
pub mod hash;
pub mod store;

pub use error::CheckpointError;
pub use hash::{path_key, short_key};
pub use store::{CheckpointEntry, CheckpointState, CheckpointStore};

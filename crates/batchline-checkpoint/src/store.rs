//! Checkpoint store: last-read line per file plus the set of finished files
//!
//! Backing file layout:
//! ```text
//! {
//!   "name": "/abs/path/status.json",
//!   "in_progress": {
//!     "<blake3 hex of file path>": { "file": "/abs/path/a.txt", "line": 42 }
//!   },
//!   "done": ["/abs/path/b.txt"]
//! }
//! ```
//!
//! A path is never both in `in_progress` and `done`. Every read and write
//! goes through one mutex, so workers can share a `&CheckpointStore`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;
use crate::hash::path_key;

/// A file read through `line` but not yet finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub file: String,
    pub line: u64,
}

/// Serialized form of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Absolute path of the backing file this state was written to
    #[serde(default)]
    pub name: String,
    /// In-progress files keyed by [`path_key`]
    #[serde(default)]
    pub in_progress: BTreeMap<String, CheckpointEntry>,
    /// Finished files in completion order
    #[serde(default)]
    pub done: Vec<String>,
}

impl CheckpointState {
    fn empty(name: &Path) -> Self {
        Self {
            name: name.display().to_string(),
            ..Default::default()
        }
    }

    /// Re-key entries by their path hash and check that no file is both
    /// in progress and done.
    fn normalize(mut self) -> Result<Self, String> {
        let done: FxHashSet<&str> = self.done.iter().map(String::as_str).collect();
        let mut in_progress = BTreeMap::new();
        for (key, entry) in std::mem::take(&mut self.in_progress) {
            if done.contains(entry.file.as_str()) {
                return Err(format!("{} is both in progress and done", entry.file));
            }
            let expected = path_key(&entry.file);
            if key != expected {
                log::debug!("checkpoint: re-keying {} ({key} -> {expected})", entry.file);
            }
            let shadowed = in_progress
                .get(&expected)
                .is_some_and(|kept: &CheckpointEntry| kept.line >= entry.line);
            if !shadowed {
                in_progress.insert(expected, entry);
            }
        }
        self.in_progress = in_progress;
        Ok(self)
    }
}

struct Inner {
    state: CheckpointState,
    done_index: FxHashSet<String>,
}

impl Inner {
    fn new(state: CheckpointState) -> Self {
        let done_index = state.done.iter().cloned().collect();
        Self { state, done_index }
    }
}

/// Durable mapping from file path to last processed line.
pub struct CheckpointStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CheckpointStore {
    /// Open the store backed by `path`, loading it if the file exists.
    ///
    /// A missing file yields an empty store. Unreadable or malformed content
    /// fails with [`CheckpointError::Corrupt`] rather than resetting progress.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let store = Self {
            inner: Mutex::new(Inner::new(CheckpointState::empty(&path))),
            path,
        };
        store.load()?;
        Ok(store)
    }

    /// Backing file path (absolute).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace in-memory state with the contents of the backing file.
    ///
    /// Leaves the state untouched if the file does not exist.
    pub fn load(&self) -> Result<(), CheckpointError> {
        let corrupt = |reason: String| CheckpointError::Corrupt {
            path: self.path.clone(),
            reason,
        };

        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("checkpoint: {} not found, starting fresh", self.path.display());
                return Ok(());
            }
            Err(e) => return Err(corrupt(e.to_string())),
        };

        let mut state: CheckpointState =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if state.name.is_empty() {
            state.name = self.path.display().to_string();
        }
        let state = state.normalize().map_err(corrupt)?;

        log::debug!(
            "checkpoint: loaded {} ({} in progress, {} done)",
            self.path.display(),
            state.in_progress.len(),
            state.done.len()
        );
        *self.lock() = Inner::new(state);
        Ok(())
    }

    /// True iff `file` has been read to its end in this or an earlier run.
    pub fn is_complete(&self, file: &Path) -> bool {
        self.lock().done_index.contains(&*file_str(file))
    }

    /// Last recorded line for an in-progress `file`, or 0 to start from the top.
    pub fn resume_line(&self, file: &Path) -> u64 {
        let file = file_str(file);
        let inner = self.lock();
        match inner.state.in_progress.get(&path_key(&file)) {
            Some(entry) if entry.file == file => entry.line,
            _ => 0,
        }
    }

    /// Record the outcome of reading `file` through `line`.
    ///
    /// `completed` moves the file into the done set (an empty file finishes
    /// at line 0). Otherwise a non-zero `line` is stored as the resume point,
    /// never lowering one already recorded; `line == 0` records nothing.
    pub fn record_progress(&self, file: &Path, line: u64, completed: bool) {
        let file = file_str(file).into_owned();
        let key = path_key(&file);
        let mut inner = self.lock();

        if completed {
            inner.state.in_progress.remove(&key);
            if inner.done_index.insert(file.clone()) {
                inner.state.done.push(file);
            }
            return;
        }

        if line == 0 {
            return;
        }
        if inner.done_index.contains(&file) {
            log::warn!("checkpoint: ignoring progress for finished file {file}");
            return;
        }

        let entry = inner
            .state
            .in_progress
            .entry(key)
            .or_insert_with(|| CheckpointEntry {
                file,
                line: 0,
            });
        entry.line = entry.line.max(line);
    }

    /// Write the full state to the backing file atomically.
    ///
    /// The new content goes to `<file>.tmp`, is fsynced, then renamed over the
    /// backing file, so a failed write never corrupts what was there before.
    pub fn persist(&self) -> Result<(), CheckpointError> {
        let inner = self.lock();
        let persist_err = |source: io::Error| CheckpointError::Persist {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_vec_pretty(&inner.state)
            .map_err(|e| persist_err(io::Error::other(e)))?;
        let tmp = tmp_path(&self.path);
        if let Err(e) = write_atomic(&tmp, &self.path, &json) {
            let _ = fs::remove_file(&tmp);
            return Err(persist_err(e));
        }

        log::debug!(
            "checkpoint: saved {} ({} in progress, {} done)",
            self.path.display(),
            inner.state.in_progress.len(),
            inner.state.done.len()
        );
        Ok(())
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> CheckpointState {
        self.lock().state.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A worker panicking mid-update cannot leave a half-written entry:
        // every mutation above is a single map/vec operation.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn file_str(file: &Path) -> std::borrow::Cow<'_, str> {
    file.to_string_lossy()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_atomic(tmp: &Path, dest: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(tmp, dest)
}

//! Lock-free task queue distributing files across workers

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use batchline_checkpoint::CheckpointStore;
use rustc_hash::FxHashSet;

/// One file to read, starting after `resume_line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub path: PathBuf,
    /// Last line already handled in an earlier run (0 = start of file)
    pub resume_line: u64,
}

/// Queue filled once, before any worker starts, then drained concurrently.
///
/// Workers call [`next()`](TaskQueue::next) to atomically claim a task.
/// Because nothing is added after construction, `None` means the run has no
/// work left rather than "nothing yet".
pub struct TaskQueue {
    tasks: Vec<FileTask>,
    cursor: AtomicUsize,
    skipped: usize,
}

impl TaskQueue {
    /// Queue the given tasks as-is
    pub fn new(tasks: Vec<FileTask>) -> Self {
        Self {
            tasks,
            cursor: AtomicUsize::new(0),
            skipped: 0,
        }
    }

    /// Build the run from `files` in input order: skip files the checkpoint
    /// marks done, resume the rest from their recorded line.
    ///
    /// A path listed twice is queued once so two workers never share a file.
    pub fn build(files: &[PathBuf], store: &CheckpointStore) -> Self {
        let mut seen = FxHashSet::default();
        let mut tasks = Vec::with_capacity(files.len());
        let mut skipped = 0;

        for path in files {
            if !seen.insert(path) {
                log::warn!("{}: listed more than once, queued once", path.display());
                continue;
            }
            if store.is_complete(path) {
                log::info!("{}: already done, skipping", path.display());
                skipped += 1;
                continue;
            }
            let resume_line = store.resume_line(path);
            if resume_line > 0 {
                log::debug!("{}: resuming after line {resume_line}", path.display());
            }
            tasks.push(FileTask {
                path: path.clone(),
                resume_line,
            });
        }

        log::debug!("{} tasks in work queue", tasks.len());
        Self {
            tasks,
            cursor: AtomicUsize::new(0),
            skipped,
        }
    }

    /// Claim the next task (lock-free)
    pub fn next(&self) -> Option<&FileTask> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.tasks.get(i)
    }

    /// Tasks queued for this run
    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    /// Files left out because they were already done
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Tasks not yet claimed
    pub fn remaining(&self) -> usize {
        self.total()
            .saturating_sub(self.cursor.load(Ordering::Relaxed))
    }
}

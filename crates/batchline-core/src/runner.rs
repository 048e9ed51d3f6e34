//! Worker pool orchestration over a checkpointed file list

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use batchline_checkpoint::CheckpointStore;

use crate::error::IngestError;
use crate::handler::LineHandler;
use crate::progress::{ProgressContext, SharedProgress, fmt_num};
use crate::shutdown::CancelToken;
use crate::work_queue::TaskQueue;
use crate::worker::{FileReport, FileStatus, display_name, process_file};

/// Runs files through a fixed pool of workers against one checkpoint store.
///
/// The store is owned here and shared by reference with every worker; it is
/// the only state workers mutate.
pub struct Dispatcher {
    store: CheckpointStore,
    workers: usize,
    progress: SharedProgress,
}

impl Dispatcher {
    pub fn new(store: CheckpointStore, workers: usize) -> Self {
        Self {
            store,
            workers,
            progress: Arc::new(ProgressContext::hidden()),
        }
    }

    /// Open (or create) the checkpoint at `checkpoint` and build a dispatcher.
    ///
    /// Fails if the checkpoint exists but is malformed: resuming from a guess
    /// would silently reprocess or skip lines.
    pub fn open(checkpoint: impl AsRef<Path>, workers: usize) -> Result<Self, IngestError> {
        Ok(Self::new(CheckpointStore::open(checkpoint)?, workers))
    }

    /// Draw per-file progress through `progress`.
    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Process `files` (in order of queueing) with `handler` until done or canceled.
    ///
    /// Files already done are skipped; others resume after their recorded
    /// line. A failing file only stops the worker that hit it; other workers
    /// keep draining the queue. Returns `Err` only if the pool cannot start.
    pub fn run<H: LineHandler + ?Sized>(
        &self,
        cancel: &CancelToken,
        files: &[PathBuf],
        handler: &H,
    ) -> Result<RunSummary, IngestError> {
        if self.workers == 0 {
            return Err(IngestError::Config("worker count must be positive".into()));
        }
        let start = Instant::now();

        let queue = TaskQueue::build(files, &self.store);
        log::info!(
            "{} files: {} queued, {} already done, {} workers",
            files.len(),
            queue.total(),
            queue.skipped(),
            self.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("batchline-worker-{i}"))
            .build()
            .map_err(|e| IngestError::Config(format!("failed to create worker pool: {e}")))?;

        let overall_pb = self.progress.overall_bar(queue.total());
        let reports: Mutex<Vec<FileReport>> = Mutex::new(Vec::with_capacity(queue.total()));

        pool.scope(|s| {
            for id in 0..self.workers {
                let (queue, reports, overall_pb) = (&queue, &reports, &overall_pb);
                s.spawn(move |_| loop {
                    if cancel.is_canceled() {
                        log::debug!("worker {id}: canceled, exiting");
                        break;
                    }
                    let Some(task) = queue.next() else {
                        log::debug!("worker {id}: queue drained");
                        break;
                    };

                    let pb = self
                        .progress
                        .file_bar(&display_name(&task.path), task.resume_line);
                    let report = process_file(task, &self.store, handler, cancel, &pb);
                    pb.finish_and_clear();
                    overall_pb.inc(1);

                    let keep_going = report.is_completed();
                    if let FileStatus::Failed(_) = report.status {
                        log::warn!("worker {id}: stopping after failed file");
                    }
                    reports
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(report);
                    if !keep_going {
                        break;
                    }
                });
            }
        });
        overall_pb.finish_and_clear();

        let summary = RunSummary {
            total_files: files.len(),
            skipped_files: queue.skipped(),
            unstarted_files: queue.remaining(),
            canceled: cancel.is_canceled(),
            reports: reports.into_inner().unwrap_or_else(PoisonError::into_inner),
            elapsed: start.elapsed(),
        };
        summary.log();
        Ok(summary)
    }
}

/// Summary of one dispatcher run
#[derive(Debug)]
pub struct RunSummary {
    /// Files passed in
    pub total_files: usize,
    /// Files already done before this run
    pub skipped_files: usize,
    /// Queued files no worker got to (cancel, or every worker failed)
    pub unstarted_files: usize,
    /// Cancellation was requested during the run
    pub canceled: bool,
    /// One report per file a worker picked up, in finishing order
    pub reports: Vec<FileReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn completed_files(&self) -> usize {
        self.reports.iter().filter(|r| r.is_completed()).count()
    }

    pub fn stopped_files(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.status, FileStatus::Stopped))
            .count()
    }

    pub fn failed_files(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.status, FileStatus::Failed(_)))
            .count()
    }

    /// Lines handled during this run across all files
    pub fn total_lines(&self) -> u64 {
        self.reports.iter().map(FileReport::lines_handled).sum()
    }

    /// Report for `path`, if a worker picked it up
    pub fn report(&self, path: &Path) -> Option<&FileReport> {
        self.reports.iter().find(|r| r.task.path == path)
    }

    pub fn log(&self) {
        log::info!("=== Run Summary ===");
        log::info!(
            "Files: {}/{} completed, {} failed, {} stopped, {} skipped, {} not started",
            self.completed_files(),
            self.total_files,
            self.failed_files(),
            self.stopped_files(),
            self.skipped_files,
            self.unstarted_files
        );
        log::info!("Lines: {}", fmt_num(self.total_lines()));
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        let secs = self.elapsed.as_secs_f64();
        if self.total_lines() > 0 && secs > 0.0 {
            log::info!("Throughput: {:.0} lines/sec", self.total_lines() as f64 / secs);
        }
        if self.canceled {
            log::info!("Run interrupted; progress saved for resume");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work_queue::FileTask;

    fn report(path: &str, resume: u64, line: u64, status: FileStatus) -> FileReport {
        FileReport {
            task: FileTask {
                path: PathBuf::from(path),
                resume_line: resume,
            },
            line,
            status,
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn zero_workers_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::open(dir.path().join("status.json"), 0).unwrap();
        let handler = crate::handler::handler_fn(|_, _| Ok(()));
        let err = dispatcher
            .run(&CancelToken::new(), &[], &handler)
            .unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn empty_file_list_runs() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::open(dir.path().join("status.json"), 2).unwrap();
        let handler = crate::handler::handler_fn(|_, _| Ok(()));
        let summary = dispatcher.run(&CancelToken::new(), &[], &handler).unwrap();
        assert_eq!(summary.total_files, 0);
        assert!(summary.reports.is_empty());
        assert!(!dispatcher.store().path().exists());
    }

    #[test]
    fn summary_counts() {
        let summary = RunSummary {
            total_files: 5,
            skipped_files: 1,
            unstarted_files: 0,
            canceled: false,
            reports: vec![
                report("/a", 0, 10, FileStatus::Completed),
                report("/b", 4, 9, FileStatus::Stopped),
                report("/c", 0, 2, FileStatus::Failed(IngestError::Canceled)),
                report("/d", 0, 0, FileStatus::Completed),
            ],
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(summary.completed_files(), 2);
        assert_eq!(summary.stopped_files(), 1);
        assert_eq!(summary.failed_files(), 1);
        assert_eq!(summary.total_lines(), 10 + 5 + 2);
        assert_eq!(summary.report(Path::new("/b")).unwrap().line, 9);
        assert!(summary.report(Path::new("/e")).is_none());
        summary.log();
    }

    #[test]
    fn summary_log_zero_elapsed() {
        let summary = RunSummary {
            total_files: 0,
            skipped_files: 0,
            unstarted_files: 0,
            canceled: true,
            reports: vec![],
            elapsed: Duration::ZERO,
        };
        // Just verify it doesn't panic
        summary.log();
    }
}

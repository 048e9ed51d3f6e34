//! Per-file processing: read lines, hand them off, checkpoint the outcome

use std::path::Path;
use std::time::{Duration, Instant};

use batchline_checkpoint::CheckpointStore;
use indicatif::ProgressBar;

use crate::error::IngestError;
use crate::handler::LineHandler;
use crate::progress::fmt_num;
use crate::shutdown::CancelToken;
use crate::source::read_lines;
use crate::work_queue::FileTask;

/// Progress log interval (every N lines)
pub const PROGRESS_INTERVAL: u64 = 10_000;

/// Progress bar refresh interval (every N lines)
const BAR_INTERVAL: u64 = 1_000;

/// Terminal state of one file task
#[derive(Debug)]
pub enum FileStatus {
    /// Read to the end; now in the checkpoint's done set
    Completed,
    /// Cancellation observed; resume point recorded
    Stopped,
    /// Open, decode, read or handler error; resume point recorded
    Failed(IngestError),
}

/// What happened to one file during a run
#[derive(Debug)]
pub struct FileReport {
    pub task: FileTask,
    /// Last line handled successfully (equals `task.resume_line` if none)
    pub line: u64,
    pub status: FileStatus,
    pub elapsed: Duration,
}

impl FileReport {
    /// Lines handled during this run
    pub fn lines_handled(&self) -> u64 {
        self.line - self.task.resume_line
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, FileStatus::Completed)
    }
}

/// Fires every `interval` lines with the time since the previous event.
#[derive(Debug)]
struct ProgressTicker {
    interval: u64,
    last: Instant,
}

impl ProgressTicker {
    fn new(interval: u64, start: Instant) -> Self {
        Self {
            interval,
            last: start,
        }
    }

    /// Lap time if line `n` is on the interval; the baseline moves to `now`.
    fn on_line(&mut self, n: u64, now: Instant) -> Option<Duration> {
        if n % self.interval != 0 {
            return None;
        }
        let lap = now.duration_since(self.last);
        self.last = now;
        Some(lap)
    }
}

/// Short name used in log lines
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Process one task end-to-end and record its outcome in `store`.
///
/// The checkpoint is written (and persisted) for every terminal state; only
/// a clean end of file marks the file done. A failed persist is logged and
/// the in-memory state kept, to be retried by the next save.
pub fn process_file<H: LineHandler + ?Sized>(
    task: &FileTask,
    store: &CheckpointStore,
    handler: &H,
    cancel: &CancelToken,
    pb: &ProgressBar,
) -> FileReport {
    let start = Instant::now();
    let name = display_name(&task.path);
    log::info!("{name}: start reading at line {}", task.resume_line + 1);

    let mut line = task.resume_line;
    let mut ticker = ProgressTicker::new(PROGRESS_INTERVAL, start);
    let result = read_lines(&task.path, task.resume_line + 1, cancel, |n, data| {
        handler
            .handle(cancel, data)
            .map_err(|source| IngestError::Handler {
                path: task.path.clone(),
                line: n,
                source,
            })?;
        line = n;

        if n % BAR_INTERVAL == 0 {
            pb.set_position(n);
        }
        if let Some(lap) = ticker.on_line(n, Instant::now()) {
            log::info!(
                "{name}: progress line {} ({:.2}s)",
                fmt_num(n),
                lap.as_secs_f64()
            );
        }
        Ok(())
    });

    let status = match result {
        Ok(total) => {
            if total < task.resume_line {
                log::warn!(
                    "{name}: file has {total} lines but checkpoint was at line {}",
                    task.resume_line
                );
            }
            store.record_progress(&task.path, line, true);
            log::info!(
                "{name}: end read file at line {} in {:.1}s",
                fmt_num(line),
                start.elapsed().as_secs_f64()
            );
            FileStatus::Completed
        }
        Err(IngestError::Canceled) => {
            store.record_progress(&task.path, line, false);
            log::info!("{name}: stop read file at line {}", fmt_num(line));
            FileStatus::Stopped
        }
        Err(e) => {
            store.record_progress(&task.path, line, false);
            log::error!("{name}: {e}");
            FileStatus::Failed(e)
        }
    };

    if let Err(e) = store.persist() {
        log::error!("{e}");
    }

    FileReport {
        task: task.clone(),
        line,
        status,
        elapsed: start.elapsed(),
    }
}

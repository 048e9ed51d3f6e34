//! `batchline run` - stream lines from input files with checkpointed resume

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use batchline_core::{CancelToken, Dispatcher, RunSummary, SharedProgress, handler_fn};
use clap::Args;

use crate::config::Config;

/// Exit code for an interrupted run (128 + SIGINT)
pub const EXIT_INTERRUPTED: u8 = 130;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input files, directories or glob patterns
    #[arg(required = true)]
    pub inputs: Vec<String>,

    /// Descend into subdirectories of directory inputs
    #[arg(short, long)]
    pub recursive: bool,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Checkpoint file (default: from config, ./status.json)
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Append lines to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: RunArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let workers = config.workers.resolve(args.workers)?;
    let files = batchline_core::resolve_inputs(&args.inputs, args.recursive)
        .context("failed to resolve inputs")?;
    if files.is_empty() {
        log::warn!("No input files");
        return Ok(ExitCode::SUCCESS);
    }

    let checkpoint = args
        .checkpoint
        .unwrap_or_else(|| config.checkpoint.path.clone());
    let dispatcher = Dispatcher::open(&checkpoint, workers)
        .with_context(|| format!("failed to open checkpoint {}", checkpoint.display()))?
        .with_progress(progress.clone());
    log::info!("Checkpoint: {}", dispatcher.store().path().display());

    let sink = LineSink::open(args.output.as_deref())?;
    let cancel = CancelToken::new();
    setup_signal_handler(&cancel)?;

    let handler = handler_fn(|_, line| sink.write_line(line).map_err(Into::into));
    let summary = dispatcher.run(&cancel, &files, &handler)?;
    sink.flush()?;

    Ok(exit_code(&summary))
}

/// Map a finished run onto the process exit code.
fn exit_code(summary: &RunSummary) -> ExitCode {
    if summary.canceled {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if summary.failed_files() > 0 || summary.unstarted_files > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// First SIGINT/SIGTERM cancels the run; a second one exits immediately.
fn setup_signal_handler(cancel: &CancelToken) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};

    for signal in [SIGINT, SIGTERM] {
        let cancel = cancel.clone();
        // SAFETY: the handler only touches an atomic flag and calls exit.
        unsafe {
            signal_hook::low_level::register(signal, move || {
                if cancel.swap_cancel() {
                    std::process::exit(i32::from(EXIT_INTERRUPTED));
                }
            })
        }
        .with_context(|| format!("failed to register handler for signal {signal}"))?;
    }
    Ok(())
}

/// Line-buffered output shared by all workers.
///
/// Each line is written whole under the lock, so lines from different files
/// interleave but never tear.
struct LineSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl LineSink {
    fn open(output: Option<&Path>) -> Result<Self> {
        let out: Box<dyn Write + Send> = match output {
            Some(path) => {
                let file: File = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("failed to open output {}", path.display()))?;
                Box::new(LineWriter::new(file))
            }
            None => Box::new(LineWriter::new(io::stdout())),
        };
        Ok(Self::new(out))
    }

    fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(line)?;
        out.write_all(b"\n")
    }

    fn flush(&self) -> io::Result<()> {
        self.out
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}

//! batchline - resumable line ingestion over plain, gzip and zstd files
//!
//! Streams every line of the given inputs to stdout (or a file) on a pool of
//! workers, checkpointing per-file progress so an interrupted run resumes
//! where it stopped.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

/// Exit code for configuration and startup errors
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "batchline")]
#[command(about = "Resumable concurrent line ingestion")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true, conflicts_with = "quiet")]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./batchline.toml or ~/.config/batchline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Read input files line by line, resuming from the checkpoint
    Run(cmd::run::RunArgs),
    /// Show checkpoint contents
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(batchline_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug; progress bars show activity
    //   non-TTY: info unless --quiet; logs are the only progress indicator
    let is_tty = progress.is_tty();
    let verbosity = if cli.debug {
        batchline_core::Verbosity::Debug
    } else if cli.quiet || is_tty {
        batchline_core::Verbosity::Quiet
    } else {
        batchline_core::Verbosity::Normal
    };
    let multi = if is_tty { Some(progress.multi()) } else { None };
    if let Err(e) = batchline_core::init_logging(verbosity, multi) {
        eprintln!("failed to initialize logging: {e}");
    }

    match dispatch(cli, &progress) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn dispatch(cli: Cli, progress: &batchline_core::SharedProgress) -> Result<ExitCode> {
    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &config, progress),
        Command::Status(args) => cmd::status::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec![
                "Workers",
                &format!(
                    "{} (max: {})",
                    config.workers.default_workers(),
                    config.workers.max
                ),
            ]);
            table.add_row(vec![
                "Checkpoint",
                &config.checkpoint.path.display().to_string(),
            ]);

            eprintln!("\n{table}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

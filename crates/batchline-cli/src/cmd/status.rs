//! `batchline status` - show checkpoint contents

use std::path::PathBuf;

use anyhow::{Context, Result};
use batchline_checkpoint::{CheckpointState, CheckpointStore, short_key};
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Checkpoint file (default: from config, ./status.json)
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
}

pub fn run(args: StatusArgs, config: &Config) -> Result<()> {
    let path = args
        .checkpoint
        .unwrap_or_else(|| config.checkpoint.path.clone());
    let store = CheckpointStore::open(&path)
        .with_context(|| format!("failed to open checkpoint {}", path.display()))?;

    if !store.path().exists() {
        eprintln!("No checkpoint at {}", store.path().display());
        return Ok(());
    }

    let state = store.snapshot();
    eprintln!("\n{}", status_table(&state));
    eprintln!(
        "{}: {} in progress, {} done",
        store.path().display(),
        state.in_progress.len(),
        state.done.len()
    );
    Ok(())
}

fn status_table(state: &CheckpointState) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Key").fg(Color::Cyan),
            Cell::new("File").fg(Color::Cyan),
            Cell::new("Line").fg(Color::Cyan),
            Cell::new("State").fg(Color::Cyan),
        ]);

    for (key, entry) in &state.in_progress {
        table.add_row(vec![
            Cell::new(short_key(key)),
            Cell::new(&entry.file),
            Cell::new(batchline_core::fmt_num(entry.line)),
            Cell::new("in progress").fg(Color::Yellow),
        ]);
    }
    for file in &state.done {
        table.add_row(vec![
            Cell::new(""),
            Cell::new(file),
            Cell::new("-"),
            Cell::new("done").fg(Color::Green),
        ]);
    }
    table
}

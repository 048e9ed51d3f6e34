//! Input file discovery

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory names never descended into
const SKIP_DIRS: &[&str] = &[".git"];

/// List regular files under `root` as absolute paths, sorted by name.
///
/// Subdirectories are walked only if `recursive`; symlinked directories are
/// never followed.
pub fn load_files(root: &Path, recursive: bool) -> io::Result<Vec<PathBuf>> {
    let dir = std::path::absolute(root)?;
    let mut entries = fs::read_dir(&dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let skip = SKIP_DIRS.iter().any(|d| entry.file_name() == *d);
            if recursive && !skip {
                files.extend(load_files(&path, true)?);
            }
        } else if file_type.is_symlink() && path.is_dir() {
            log::debug!("not following directory symlink {}", path.display());
        } else {
            files.push(path);
        }
    }
    Ok(files)
}

/// Fail on the first path that does not exist.
pub fn check_files(files: &[PathBuf]) -> io::Result<()> {
    match files.iter().find(|f| !f.exists()) {
        Some(missing) => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} does not exist", missing.display()),
        )),
        None => Ok(()),
    }
}

/// Expand command-line inputs into an ordered, absolute file list.
///
/// Each input is a directory (listed via [`load_files`]), a glob pattern
/// (`*`, `?` or `[`), or a plain file path. Plain paths must exist.
pub fn resolve_inputs(inputs: &[String], recursive: bool) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            files.extend(load_files(path, recursive)?);
        } else if is_pattern(input) {
            let paths = glob::glob(input)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let mut matched = Vec::new();
            for p in paths {
                let p = p?;
                if p.is_file() {
                    matched.push(std::path::absolute(p)?);
                }
            }
            if matched.is_empty() {
                log::warn!("pattern {input} matched no files");
            }
            files.extend(matched);
        } else {
            files.push(std::path::absolute(path)?);
        }
    }
    check_files(&files)?;
    Ok(files)
}

fn is_pattern(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

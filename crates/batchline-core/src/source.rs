//! Line source over plain, gzip or zstd files.
//!
//! The codec is picked from the file extension. Lines are `\n`-delimited
//! records numbered from 1 at the start of the file; resuming skips records
//! without handing them to the caller so numbering always matches what was
//! checkpointed.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::IngestError;
use crate::shutdown::CancelToken;

/// Buffer size for the decoded line reader (256KB)
const READ_BUF_SIZE: usize = 256 * 1024;

/// Initial capacity for the per-record buffer
const LINE_BUF_CAPACITY: usize = 4096;

/// Decompression layer applied to an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Plain,
    Gzip,
    Zstd,
}

impl Codec {
    /// Pick codec from extension (case-insensitive); unknown means plain.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        match ext.as_deref() {
            Some("gz") => Self::Gzip,
            Some("zst") => Self::Zstd,
            _ => Self::Plain,
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
        })
    }
}

/// Sequential reader of numbered records from one file.
///
/// Owns the file handle and decoder; both are released when it drops.
pub struct LineSource {
    reader: Box<dyn BufRead + Send>,
    path: PathBuf,
    codec: Codec,
    line: u64,
    buf: Vec<u8>,
}

impl std::fmt::Debug for LineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSource")
            .field("path", &self.path)
            .field("codec", &self.codec)
            .field("line", &self.line)
            .finish_non_exhaustive()
    }
}

impl LineSource {
    /// Open `path` and wrap it in the decoder its extension calls for.
    ///
    /// Compressed sources are primed with one buffer fill so a corrupt header
    /// fails here with `DecodeInit` instead of surfacing as a read error later.
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let file = File::open(path).map_err(|source| IngestError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let codec = Codec::from_path(path);
        let init_err = |source| IngestError::DecodeInit {
            path: path.to_path_buf(),
            codec,
            source,
        };

        let mut reader: Box<dyn BufRead + Send> = match codec {
            Codec::Plain => Box::new(BufReader::with_capacity(READ_BUF_SIZE, file)),
            Codec::Gzip => Box::new(BufReader::with_capacity(
                READ_BUF_SIZE,
                MultiGzDecoder::new(file),
            )),
            Codec::Zstd => {
                let decoder = zstd::stream::read::Decoder::new(file).map_err(init_err)?;
                Box::new(BufReader::with_capacity(READ_BUF_SIZE, decoder))
            }
        };
        if codec != Codec::Plain {
            reader.fill_buf().map_err(init_err)?;
        }

        Ok(Self {
            reader,
            path: path.to_path_buf(),
            codec,
            line: 0,
            buf: Vec::with_capacity(LINE_BUF_CAPACITY),
        })
    }

    /// Number of records consumed so far
    pub fn lines_read(&self) -> u64 {
        self.line
    }

    /// Read the next record as `(line number, bytes)` with leading and
    /// trailing `\n` stripped.
    ///
    /// A final record without a trailing newline is still returned; `None`
    /// marks end of stream.
    pub fn next_record(&mut self) -> Result<Option<(u64, &[u8])>, IngestError> {
        self.buf.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .map_err(|source| IngestError::Read {
                path: self.path.clone(),
                line: self.line + 1,
                source,
            })?;
        if n == 0 {
            return Ok(None);
        }
        self.line += 1;
        Ok(Some((self.line, trim_newlines(&self.buf))))
    }
}

fn trim_newlines(mut record: &[u8]) -> &[u8] {
    while let [b'\n', rest @ ..] = record {
        record = rest;
    }
    while let [rest @ .., b'\n'] = record {
        record = rest;
    }
    record
}

/// Feed every line of `path` numbered `>= start_line` to `on_line`.
///
/// Lines before `start_line` are read and dropped. Cancellation is checked
/// before each record; once seen, returns [`IngestError::Canceled`] without
/// touching further input. An error from `on_line` stops reading and is
/// returned as-is.
///
/// Returns the total number of records in the file.
pub fn read_lines(
    path: &Path,
    start_line: u64,
    cancel: &CancelToken,
    mut on_line: impl FnMut(u64, &[u8]) -> Result<(), IngestError>,
) -> Result<u64, IngestError> {
    let mut source = LineSource::open(path)?;
    loop {
        if cancel.is_canceled() {
            return Err(IngestError::Canceled);
        }
        let Some((line, record)) = source.next_record()? else {
            break;
        };
        if line < start_line {
            continue;
        }
        on_line(line, record)?;
    }
    Ok(source.lines_read())
}

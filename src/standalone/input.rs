//! Input discovery and byte-range splits.
//!
//! A split owns the lines whose first byte falls inside `[start, end)`.
//! It skips the tail of a line straddling `start` and finishes its own
//! last line past `end`, so every line is read by exactly one split and
//! only the first split of a file sees offset 0.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use glob::glob;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Resolves the job input to a sorted list of files.
///
/// `input` may name a file, a directory (hidden and `_`-prefixed entries
/// are ignored) or a glob pattern.
pub fn list_inputs(input: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(input);
    let mut files = if path.is_file() {
        vec![path.to_path_buf()]
    } else if path.is_dir() {
        fs::read_dir(path)
            .with_context(|| format!("listing input directory {}", input))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && !is_hidden(p))
            .collect()
    } else {
        glob(input)?
            .flatten()
            .filter(|p| p.is_file())
            .collect::<Vec<_>>()
    };

    if files.is_empty() {
        bail!("Input path does not exist: {}", input);
    }
    files.sort();
    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.starts_with('_') || name.starts_with('.'))
}

/// A byte range of one input file, processed by one map task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputSplit {
    pub path: PathBuf,
    pub start: u64,
    pub end: u64,
}

impl fmt::Display for InputSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}+{}", self.path.display(), self.start, self.end - self.start)
    }
}

/// Cuts every file into splits of at most `split_size` bytes.
pub fn plan_splits(files: &[PathBuf], split_size: u64) -> Result<Vec<InputSplit>> {
    if split_size == 0 {
        bail!("split size must be positive");
    }

    let mut splits = Vec::new();
    for path in files {
        let len = fs::metadata(path)
            .with_context(|| format!("reading metadata of {}", path.display()))?
            .len();
        let mut start = 0;
        while start < len {
            let end = len.min(start + split_size);
            splits.push(InputSplit {
                path: path.clone(),
                start,
                end,
            });
            start = end;
        }
    }
    Ok(splits)
}

impl InputSplit {
    /// Opens the split for reading, positioned on its first owned line.
    pub fn open(&self) -> Result<LineReader<File>> {
        let file =
            File::open(&self.path).with_context(|| format!("opening {}", self.path.display()))?;
        Ok(LineReader::new(file, self.start, self.end)?)
    }
}

/// Yields `(offset, line)` for each line owned by a split, without the
/// line terminator (LF, or CRLF).
pub struct LineReader<R> {
    reader: BufReader<R>,
    pos: u64,
    end: u64,
    buf: Vec<u8>,
}

impl<R: io::Read + Seek> LineReader<R> {
    pub fn new(inner: R, start: u64, end: u64) -> io::Result<Self> {
        let mut reader = BufReader::new(inner);
        let mut pos = 0;
        if start > 0 {
            // The byte before `start` tells whether a line begins at `start`.
            reader.seek(SeekFrom::Start(start - 1))?;
            let mut partial = Vec::new();
            pos = start - 1 + reader.read_until(b'\n', &mut partial)? as u64;
        }
        Ok(Self {
            reader,
            pos,
            end,
            buf: Vec::new(),
        })
    }
}

impl<R: io::Read> Iterator for LineReader<R> {
    type Item = io::Result<(u64, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }

        self.buf.clear();
        let read = match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => return None,
            Ok(n) => n,
            Err(e) => return Some(Err(e)),
        };
        let offset = self.pos;
        self.pos += read as u64;

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Some(Ok((offset, Bytes::copy_from_slice(&self.buf))))
    }
}

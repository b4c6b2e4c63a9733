//! Append-only JSONL trade journals.
//!
//! Two files live side by side in the journal directory:
//! - `open_trades.jsonl`: one OPEN record per opened trade
//! - `closed_trades.jsonl`: one CLOSED record per closed trade
//!
//! Records are never rewritten. Each line is an independent JSON object, so
//! a partial write damages at most one line, and malformed lines are skipped
//! on read. The set of closed trade keys is indexed once when the journal is
//! opened; duplicate closes are rejected against that index.

use quorum_core::domain::{ClosedTradeRecord, OpenTradeRecord, TradeKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const OPEN_TRADES_FILE: &str = "open_trades.jsonl";
pub const CLOSED_TRADES_FILE: &str = "closed_trades.jsonl";

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode journal record: {0}")]
    Encode(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> JournalError + '_ {
    move |source| JournalError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Whether the file is empty or its last byte is a newline.
fn ends_cleanly(file: &mut fs::File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Append one record as a JSON line and flush.
///
/// A torn last line (no trailing newline) is terminated first so the new
/// record always starts on its own line.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<(), JournalError> {
    let json = serde_json::to_string(record)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(io_err(path))?;

    if !ends_cleanly(&mut file).map_err(io_err(path))? {
        writeln!(file).map_err(io_err(path))?;
    }
    writeln!(file, "{json}").map_err(io_err(path))?;
    file.flush().map_err(io_err(path))?;
    Ok(())
}

/// Read every well-formed record. Returns the records and the count of
/// skipped malformed lines.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, usize), JournalError> {
    if !path.exists() {
        return Ok((Vec::new(), 0));
    }

    let file = fs::File::open(path).map_err(io_err(path))?;
    let reader = io::BufReader::new(file);
    let mut records = Vec::new();
    let mut skipped = 0;

    for line in reader.lines() {
        let line = line.map_err(io_err(path))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(record) => records.push(record),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(path = %path.display(), skipped, "skipped malformed journal lines");
    }
    Ok((records, skipped))
}

/// The pair of OPEN / CLOSED journals plus the closed-key index.
#[derive(Debug)]
pub struct TradeJournal {
    dir: PathBuf,
    closed_keys: HashSet<TradeKey>,
}

impl TradeJournal {
    /// Open (or create lazily) the journals under `dir` and index closed keys.
    pub fn open(dir: &Path) -> Result<Self, JournalError> {
        let mut journal = Self {
            dir: dir.to_path_buf(),
            closed_keys: HashSet::new(),
        };
        let (closed, _) = journal.read_closed()?;
        journal.closed_keys = closed.iter().map(ClosedTradeRecord::key).collect();
        Ok(journal)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn open_path(&self) -> PathBuf {
        self.dir.join(OPEN_TRADES_FILE)
    }

    pub fn closed_path(&self) -> PathBuf {
        self.dir.join(CLOSED_TRADES_FILE)
    }

    pub fn append_open(&mut self, record: &OpenTradeRecord) -> Result<(), JournalError> {
        append_jsonl(&self.open_path(), record)
    }

    /// Append a CLOSED record unless its key is already closed.
    ///
    /// Returns `Ok(false)` for a duplicate, which leaves the journal untouched.
    pub fn append_closed(&mut self, record: &ClosedTradeRecord) -> Result<bool, JournalError> {
        let key = record.key();
        if self.closed_keys.contains(&key) {
            return Ok(false);
        }
        append_jsonl(&self.closed_path(), record)?;
        self.closed_keys.insert(key);
        Ok(true)
    }

    pub fn is_closed(&self, key: &TradeKey) -> bool {
        self.closed_keys.contains(key)
    }

    pub fn closed_count(&self) -> usize {
        self.closed_keys.len()
    }

    pub fn read_open(&self) -> Result<Vec<OpenTradeRecord>, JournalError> {
        Ok(read_jsonl(&self.open_path())?.0)
    }

    pub fn read_closed(&self) -> Result<(Vec<ClosedTradeRecord>, usize), JournalError> {
        read_jsonl(&self.closed_path())
    }

    /// OPEN records that have no CLOSED counterpart yet.
    pub fn unclosed(&self) -> Result<Vec<OpenTradeRecord>, JournalError> {
        Ok(self
            .read_open()?
            .into_iter()
            .filter(|r| !self.closed_keys.contains(&r.key()))
            .collect())
    }
}

//! CSV ledgers: search feedback and tacit knowledge.
//!
//! Both ledgers are plain CSV files with a header row, readable by any
//! spreadsheet tool. Every read-modify-write runs under two locks:
//!
//! - an in-process mutex per ledger path
//! - an advisory `fs2` exclusive lock on the `<ledger>.lock` sidecar,
//!   which serialises writers in other processes
//!
//! Writes go to `<ledger>.tmp` and are renamed over the ledger, so a
//! reader sees either the old or the new file, never a partial one.
//!
//! An unreadable ledger is an error, never an empty ledger.

pub mod feedback;
pub mod stats;
pub mod tacit;

pub use feedback::{record_feedback, FeedbackRecord, FEEDBACK_COLUMNS};
pub use stats::{load_feedback_stats, DailyHelpfulRate, FeedbackStats};
pub use tacit::{
    append_tacit, approve_tacit, list_tacit_knowledge, update_tacit_status, NewTacitNote,
    TacitRecord, APPROVED_STATUS, PENDING_STATUS, TACIT_COLUMNS,
};

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use fs2::FileExt;
use tracing::debug;

use crate::error::{LedgerError, Result};

/// Ledger contents: header plus string rows of the same width.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LedgerTable {
    /// Column names.
    pub headers: Vec<String>,
    /// Rows, each `headers.len()` wide.
    pub rows: Vec<Vec<String>>,
}

impl LedgerTable {
    /// Creates an empty ledger with the given header.
    pub fn with_headers<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell value by row and column name.
    pub fn value(&self, row: usize, name: &str) -> Option<&str> {
        let col = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(col)).map(String::as_str)
    }

    /// Returns the column position, appending an empty column if needed.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(i) = self.column_index(name) {
            return i;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    /// Appends a record given as ordered `(column, value)` pairs.
    ///
    /// Unknown columns extend the header; a repeated column keeps the
    /// last value given.
    pub fn push_record(&mut self, record: &[(String, String)]) {
        for (name, _) in record {
            self.ensure_column(name);
        }
        let mut row = vec![String::new(); self.headers.len()];
        for (name, value) in record {
            if let Some(i) = self.column_index(name) {
                row[i] = value.clone();
            }
        }
        self.rows.push(row);
    }

    /// Sets a cell by row and column name; the column must exist.
    pub fn set(&mut self, row: usize, name: &str, value: impl Into<String>) {
        if let Some(col) = self.column_index(name) {
            if let Some(cells) = self.rows.get_mut(row) {
                cells[col] = value.into();
            }
        }
    }
}

/// Reads a ledger. Returns `None` if the file does not exist.
///
/// # Errors
///
/// Returns `Ledger::Parse` for malformed CSV (including ragged rows).
pub fn read_ledger(path: &Path) -> Result<Option<LedgerTable>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_path(path)
        .map_err(|e| LedgerError::parse(path, e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| LedgerError::parse(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| LedgerError::parse(path, e))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    debug!(path = %path.display(), rows = rows.len(), "Ledger read");
    Ok(Some(LedgerTable { headers, rows }))
}

/// Writes a ledger through a temp file and atomic rename.
pub fn write_ledger(path: &Path, table: &LedgerTable) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| LedgerError::write(path, e))?;
    }
    let tmp = sidecar(path, "tmp");

    let mut writer = csv::Writer::from_path(&tmp).map_err(|e| LedgerError::write(path, e))?;
    writer
        .write_record(&table.headers)
        .map_err(|e| LedgerError::write(path, e))?;
    for row in &table.rows {
        writer
            .write_record(row)
            .map_err(|e| LedgerError::write(path, e))?;
    }
    let file = writer
        .into_inner()
        .map_err(|e| LedgerError::write(path, e.to_string()))?;
    file.sync_all().map_err(|e| LedgerError::write(path, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| LedgerError::write(path, e))?;
    debug!(path = %path.display(), rows = table.len(), "Ledger written");
    Ok(())
}

/// `<ledger>.<suffix>` next to the ledger.
fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn process_locks() -> &'static Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    LOCKS.get_or_init(Default::default)
}

/// Runs `f` holding both the in-process and the cross-process lock of
/// the ledger at `path`.
pub(crate) fn with_ledger_lock<T>(path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let local = {
        let mut locks = process_locks()
            .lock()
            .map_err(|_| LedgerError::lock(path, "ledger lock registry poisoned"))?;
        Arc::clone(locks.entry(key).or_default())
    };
    let _local_guard = local
        .lock()
        .map_err(|_| LedgerError::lock(path, "ledger lock poisoned"))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| LedgerError::lock(path, e))?;
    }
    let lock_file: File = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(sidecar(path, "lock"))
        .map_err(|e| LedgerError::lock(path, e))?;
    lock_file
        .lock_exclusive()
        .map_err(|e| LedgerError::lock(path, e))?;

    let result = f();

    // Closing the handle releases the lock as well
    let _ = FileExt::unlock(&lock_file);
    result
}

/// Parses a ledger boolean (`True`/`False`, `1`/`0`, `yes`/`no`).
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "1.0" | "yes" | "y" => Some(true),
        "false" | "0" | "0.0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Renders a boolean the way the ledgers have always stored it.
pub(crate) fn format_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Parses a finite number; empty and non-numeric values are `None`.
pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Ledger timestamp format (local time, microseconds).
pub(crate) fn format_timestamp(ts: chrono::NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

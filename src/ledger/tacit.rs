//! Tacit knowledge ledger and its approval workflow.
//!
//! Notes enter as `pending`, get approved by id, and approved notes are
//! later merged into the searchable metadata (see [`crate::merge`]).
//!
//! Ids are assigned as `max(numeric ids) + 1`. A ledger whose rows carry
//! no usable id (no `id` column, or one with no numeric value) is addressed
//! by row position, and the next id is the row count rather than 0. That fallback can hand out an id equal to a non-numeric id
//! already present; it is logged at WARN.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Local;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{format_timestamp, read_ledger, with_ledger_lock, write_ledger, LedgerTable};
use crate::error::Result;

/// Base header of the tacit knowledge ledger, in order.
pub const TACIT_COLUMNS: [&str; 8] = [
    "id",
    "timestamp",
    "case_id",
    "note",
    "category",
    "status",
    "author",
    "approver",
];

/// Status of newly submitted notes.
pub const PENDING_STATUS: &str = "pending";

/// Status of notes cleared for merging.
pub const APPROVED_STATUS: &str = "approved";

const BASE_FIELDS: [&str; 7] = [
    "timestamp",
    "case_id",
    "note",
    "category",
    "status",
    "author",
    "approver",
];

/// A note to append to the tacit ledger.
#[derive(Clone, Debug, PartialEq)]
pub struct NewTacitNote {
    /// Case the note is about.
    pub case_id: String,
    /// Note text.
    pub note: String,
    /// Optional category label.
    pub category: Option<String>,
    /// Initial status (`pending` by default).
    pub status: String,
    /// Who wrote it.
    pub author: Option<String>,
    /// Who approved it, if submitted pre-approved.
    pub approver: Option<String>,
    /// Extra columns. A key equal to a base column overrides it.
    pub extra: BTreeMap<String, String>,
}

impl NewTacitNote {
    /// Creates a pending note.
    pub fn new(case_id: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            note: note.into(),
            category: None,
            status: PENDING_STATUS.to_string(),
            author: None,
            approver: None,
            extra: BTreeMap::new(),
        }
    }

    /// Sets the category.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the initial status.
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Sets the author.
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Sets the approver.
    pub fn approver(mut self, approver: impl Into<String>) -> Self {
        self.approver = Some(approver.into());
        self
    }

    /// Adds an extra column.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    fn to_pairs(&self, id: i64, timestamp: String) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("id".to_string(), id.to_string()),
            ("timestamp".to_string(), timestamp),
            ("case_id".to_string(), self.case_id.clone()),
            ("note".to_string(), self.note.clone()),
            ("category".to_string(), self.category.clone().unwrap_or_default()),
            ("status".to_string(), self.status.clone()),
            ("author".to_string(), self.author.clone().unwrap_or_default()),
            ("approver".to_string(), self.approver.clone().unwrap_or_default()),
        ];
        pairs.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }
}

/// One row of the tacit ledger as read back.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TacitRecord {
    /// Row id; `None` when the id cell is not an integer.
    pub id: Option<i64>,
    /// Submission time as written.
    pub timestamp: Option<String>,
    /// Case the note is about.
    pub case_id: Option<String>,
    /// Note text.
    pub note: Option<String>,
    /// Category label.
    pub category: Option<String>,
    /// Workflow status.
    pub status: Option<String>,
    /// Author.
    pub author: Option<String>,
    /// Approver.
    pub approver: Option<String>,
    /// Any other columns.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl TacitRecord {
    fn from_row(table: &LedgerTable, row: usize, id: Option<i64>) -> Self {
        let field = |name: &str| {
            table
                .value(row, name)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let extra = table
            .headers
            .iter()
            .filter(|h| h.as_str() != "id" && !BASE_FIELDS.contains(&h.as_str()))
            .filter_map(|h| table.value(row, h).map(|v| (h.clone(), v.to_string())))
            .collect();
        Self {
            id,
            timestamp: field("timestamp"),
            case_id: field("case_id"),
            note: field("note"),
            category: field("category"),
            status: field("status"),
            author: field("author"),
            approver: field("approver"),
            extra,
        }
    }

    /// Returns true if the record has the given status.
    pub fn has_status(&self, status: &str) -> bool {
        self.status.as_deref() == Some(status)
    }
}

/// Parses an id cell. Integral floats (`3.0`) count as integers.
fn parse_id(raw: &str) -> Option<i64> {
    let s = raw.trim();
    s.parse::<i64>().ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15)
            .map(|f| f as i64)
    })
}

/// Id of every row: the parsed id column, or the row position when the
/// ledger has no id column.
fn row_ids(table: &LedgerTable) -> Vec<Option<i64>> {
    match table.column_index("id") {
        Some(col) => table.rows.iter().map(|r| parse_id(&r[col])).collect(),
        None => (0..table.len()).map(|i| Some(i as i64)).collect(),
    }
}

/// Next id to assign in `table`.
fn next_id(table: &LedgerTable) -> i64 {
    if table.is_empty() {
        return 0;
    }
    let max = table
        .column_index("id")
        .and_then(|col| table.rows.iter().filter_map(|r| parse_id(&r[col])).max());
    match max {
        Some(max) => max + 1,
        None => {
            let fallback = table.len() as i64;
            warn!(
                rows = table.len(),
                next_id = fallback,
                "Tacit ledger has no numeric ids; numbering from the row count"
            );
            fallback
        }
    }
}

/// Appends a note and returns its id.
#[instrument(skip(note), fields(path = %path.display(), case_id = %note.case_id))]
pub fn append_tacit(path: &Path, note: &NewTacitNote) -> Result<i64> {
    with_ledger_lock(path, || {
        let mut table = match read_ledger(path)? {
            Some(t) if !t.headers.is_empty() => t,
            _ => LedgerTable::with_headers(TACIT_COLUMNS),
        };
        let id = next_id(&table);
        let timestamp = format_timestamp(Local::now().naive_local());
        table.push_record(&note.to_pairs(id, timestamp));
        write_ledger(path, &table)?;
        info!(id, status = %note.status, "Tacit note appended");
        Ok(id)
    })
}

/// Sets the status (and approver, when given) of the note with `id`.
///
/// Returns false and leaves the ledger untouched if the ledger or the id
/// does not exist.
#[instrument(fields(path = %path.display()))]
pub fn update_tacit_status(
    path: &Path,
    id: i64,
    status: &str,
    approver: Option<&str>,
) -> Result<bool> {
    with_ledger_lock(path, || {
        let Some(mut table) = read_ledger(path)? else {
            warn!(id, "Tacit ledger missing; status update skipped");
            return Ok(false);
        };

        let ids = row_ids(&table);
        let matches: Vec<usize> = ids
            .iter()
            .enumerate()
            .filter(|(_, row_id)| **row_id == Some(id))
            .map(|(row, _)| row)
            .collect();
        if matches.is_empty() {
            warn!(id, rows = table.len(), "Tacit id not found; status update skipped");
            return Ok(false);
        }

        if table.column_index("id").is_none() {
            // Persist the positional ids so later lookups stay stable
            table.headers.insert(0, "id".to_string());
            for (row, cells) in table.rows.iter_mut().enumerate() {
                cells.insert(0, row.to_string());
            }
        }
        table.ensure_column("status");
        if approver.is_some() {
            table.ensure_column("approver");
        }
        for &row in &matches {
            table.set(row, "status", status);
            if let Some(approver) = approver {
                table.set(row, "approver", approver);
            }
        }

        write_ledger(path, &table)?;
        info!(id, status, rows = matches.len(), "Tacit status updated");
        Ok(true)
    })
}

/// Approves the note with `id`.
pub fn approve_tacit(path: &Path, id: i64, approver: Option<&str>) -> Result<bool> {
    update_tacit_status(path, id, APPROVED_STATUS, approver)
}

/// Lists notes in ledger order, optionally only those with `status`.
///
/// A missing ledger lists nothing.
pub fn list_tacit_knowledge(path: &Path, status: Option<&str>) -> Result<Vec<TacitRecord>> {
    let Some(table) = read_ledger(path)? else {
        return Ok(Vec::new());
    };
    let ids = row_ids(&table);
    Ok(ids
        .into_iter()
        .enumerate()
        .map(|(row, id)| TacitRecord::from_row(&table, row, id))
        .filter(|r| status.map_or(true, |s| r.has_status(s)))
        .collect())
}

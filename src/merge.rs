//! Merging approved tacit notes into an index's metadata.
//!
//! Approved notes are grouped per case id in ledger order and appended to
//! the notes column of every metadata row with that id. Existing notes
//! are kept; new text goes after a [`NOTE_SEPARATOR`].
//!
//! The merge is not idempotent: running it twice over the same approved
//! rows appends the notes twice. Callers that need exactly-once should
//! move merged rows to another status afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument};

use crate::bundle::read_index_config;
use crate::config::DEFAULT_NOTES_COLUMN;
use crate::error::{NotFoundError, Result};
use crate::ledger::{list_tacit_knowledge, APPROVED_STATUS};
use crate::storage::{MetadataStore, RedbStorage, METADATA_FILE_NAME};
use crate::types::{normalize_case_key, Cell};

/// Separator placed between notes, both within a case and after existing notes.
pub const NOTE_SEPARATOR: &str = "\n\n---\n\n";

/// Merge parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOptions {
    /// Metadata column receiving the notes.
    pub target_col: String,
    /// Ledger status selecting the notes to merge.
    pub approved_status: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            target_col: DEFAULT_NOTES_COLUMN.to_string(),
            approved_status: APPROVED_STATUS.to_string(),
        }
    }
}

/// Outcome of a merge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Approved notes read from the ledger (non-empty ones only).
    pub notes_read: usize,
    /// Distinct case ids those notes address.
    pub cases_with_notes: usize,
    /// Metadata rows whose notes column changed.
    pub rows_updated: usize,
    /// Whether the metadata file was rewritten.
    pub written: bool,
}

/// Approved notes grouped by normalised case id, in ledger order.
fn group_notes(tacit_path: &Path, status: &str) -> Result<(usize, HashMap<String, String>)> {
    let mut grouped: HashMap<String, String> = HashMap::new();
    let mut notes_read = 0;
    for record in list_tacit_knowledge(tacit_path, Some(status))? {
        let (Some(case_id), Some(note)) = (record.case_id, record.note) else {
            continue;
        };
        let key = normalize_case_key(&case_id);
        if key.is_empty() || note.trim().is_empty() {
            continue;
        }
        notes_read += 1;
        grouped
            .entry(key)
            .and_modify(|joined| {
                joined.push_str(NOTE_SEPARATOR);
                joined.push_str(&note);
            })
            .or_insert(note);
    }
    Ok((notes_read, grouped))
}

/// Merges approved notes from `tacit_path` into the metadata of the index
/// in `dir`.
///
/// Reads and writes `metadata.redb` directly; it does not load the
/// embedding model. Callers sharing a [`crate::ResourceCache`] must run
/// this under [`crate::ResourceCache::exclusive`].
///
/// # Errors
///
/// - `NotFound::Ledger` if the tacit ledger does not exist
/// - `NotFound` for a missing index config or metadata file
#[instrument(skip(options), fields(dir = %dir.display(), tacit = %tacit_path.display()))]
pub fn merge_into_dir(dir: &Path, tacit_path: &Path, options: &MergeOptions) -> Result<MergeReport> {
    if !tacit_path.is_file() {
        return Err(NotFoundError::Ledger(PathBuf::from(tacit_path)).into());
    }
    let config = read_index_config(dir)?;
    let store = RedbStorage::open(dir.join(METADATA_FILE_NAME))?;

    let (notes_read, grouped) = group_notes(tacit_path, &options.approved_status)?;
    let mut report = MergeReport {
        notes_read,
        cases_with_notes: grouped.len(),
        ..Default::default()
    };
    if grouped.is_empty() {
        info!("No approved notes to merge");
        return Ok(report);
    }

    let mut table = store.read_table()?;
    table.ensure_column(&options.target_col);

    let ids: Vec<Option<String>> = table
        .column(&config.id_col)
        .map(|cells| cells.iter().map(Cell::case_key).collect())
        .unwrap_or_else(|| vec![None; table.len()]);
    let mut notes: Vec<Cell> = table
        .column(&options.target_col)
        .map(<[Cell]>::to_vec)
        .unwrap_or_default();

    for (cell, id) in notes.iter_mut().zip(&ids) {
        let Some(new) = id.as_ref().and_then(|key| grouped.get(key)) else {
            continue;
        };
        *cell = if cell.is_null() {
            Cell::Text(new.clone())
        } else {
            Cell::Text(format!("{}{}{}", cell.to_plain_string(), NOTE_SEPARATOR, new))
        };
        report.rows_updated += 1;
    }

    table.set_column(options.target_col.clone(), notes)?;
    store.write_table(&table)?;
    report.written = true;

    info!(
        notes = report.notes_read,
        cases = report.cases_with_notes,
        rows = report.rows_updated,
        column = %options.target_col,
        "Approved notes merged"
    );
    Ok(report)
}

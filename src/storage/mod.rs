//! Metadata storage: the in-memory case table and its persisted form.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Bundle loader / merge / builder               │
//! │                         │                                    │
//! │                         ▼                                    │
//! │              ┌─────────────────────┐                        │
//! │              │   MetadataStore     │  ← Trait               │
//! │              └─────────────────────┘                        │
//! │                         ▲                                    │
//! │                   ┌─────┴──────┐                             │
//! │                   │RedbStorage │                             │
//! │                   └────────────┘                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The table is read fully into memory and the database handle dropped,
//! so a cached bundle never holds the file open and a merge can rewrite it.

pub mod redb;
pub mod schema;

pub use self::redb::RedbStorage;
pub use schema::{TableHeader, METADATA_FILE_NAME, SCHEMA_VERSION};

use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{Result, StorageError};
use crate::types::Cell;

/// Name of the synthetic field carrying the row position in search results.
pub const INTERNAL_INDEX_FIELD: &str = "internal_index";

/// Storage engine trait for the metadata table.
///
/// Implementations must be `Send + Sync`.
pub trait MetadataStore: Send + Sync {
    /// Reads the whole table.
    fn read_table(&self) -> Result<CaseTable>;

    /// Replaces the whole table in one transaction.
    fn write_table(&self, table: &CaseTable) -> Result<()>;

    /// Path to the backing file, if any.
    fn path(&self) -> Option<&Path>;
}

/// One named column of cells.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// One cell per row.
    pub cells: Vec<Cell>,
}

/// Columnar case table. Row `i` corresponds to vector `i`.
///
/// Column order is preserved (it is the order of the source CSV plus any
/// columns added later).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaseTable {
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
    rows: usize,
}

impl CaseTable {
    /// Creates an empty table with `rows` rows and no columns.
    pub fn with_rows(rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            by_name: HashMap::new(),
            rows,
        }
    }

    /// Builds a table from columns, which must all have the same length.
    pub fn from_columns(columns: Vec<(String, Vec<Cell>)>) -> Result<Self> {
        let rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        let mut table = Self::with_rows(rows);
        for (name, cells) in columns {
            table.set_column(name, cells)?;
        }
        Ok(table)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns true if the column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Cells of a column.
    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.by_name
            .get(name)
            .map(|&i| self.columns[i].cells.as_slice())
    }

    /// A single cell.
    pub fn cell(&self, row: usize, name: &str) -> Option<&Cell> {
        self.column(name).and_then(|cells| cells.get(row))
    }

    /// Iterates columns in table order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Inserts or replaces a column.
    ///
    /// # Errors
    ///
    /// Returns `Storage::Corrupted` if the length differs from the row count.
    pub fn set_column(&mut self, name: impl Into<String>, cells: Vec<Cell>) -> Result<()> {
        let name = name.into();
        if cells.len() != self.rows {
            return Err(StorageError::corrupted(format!(
                "Column '{}' has {} cells, table has {} rows",
                name,
                cells.len(),
                self.rows
            ))
            .into());
        }
        match self.by_name.get(&name) {
            Some(&i) => self.columns[i].cells = cells,
            None => {
                self.by_name.insert(name.clone(), self.columns.len());
                self.columns.push(Column { name, cells });
            }
        }
        Ok(())
    }

    /// Adds an all-null column if it does not exist yet.
    pub fn ensure_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.by_name.insert(name.to_string(), self.columns.len());
            self.columns.push(Column {
                name: name.to_string(),
                cells: vec![Cell::Null; self.rows],
            });
        }
    }

    /// Keeps only the rows for which `keep` is true, preserving order.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        for column in &mut self.columns {
            let mut flags = keep.iter();
            column
                .cells
                .retain(|_| flags.next().copied().unwrap_or(false));
        }
        self.rows = keep.iter().take(self.rows).filter(|k| **k).count();
    }

    /// Materialises one row as a JSON object.
    ///
    /// Every column is present (null cells as `null`), plus
    /// `internal_index` holding the row position.
    pub fn row_json(&self, row: usize) -> Map<String, Value> {
        let mut obj = Map::new();
        for column in &self.columns {
            let value = column
                .cells
                .get(row)
                .map(Cell::to_json)
                .unwrap_or(Value::Null);
            obj.insert(column.name.clone(), value);
        }
        obj.insert(INTERNAL_INDEX_FIELD.to_string(), Value::from(row));
        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn test_from_columns_and_lookup() {
        let table = CaseTable::from_columns(vec![
            ("id".into(), vec![Cell::Int(1), Cell::Int(2)]),
            ("title".into(), vec![text("a"), text("b")]),
        ])
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column_names(), vec!["id", "title"]);
        assert_eq!(table.cell(1, "title"), Some(&text("b")));
        assert_eq!(table.cell(2, "title"), None);
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn test_set_column_rejects_wrong_length() {
        let mut table = CaseTable::with_rows(3);
        let err = table.set_column("x", vec![Cell::Null]).unwrap_err();
        assert!(err.is_storage());
    }

    #[test]
    fn test_set_column_replaces_in_place() {
        let mut table = CaseTable::with_rows(1);
        table.set_column("a", vec![Cell::Int(1)]).unwrap();
        table.set_column("b", vec![Cell::Int(2)]).unwrap();
        table.set_column("a", vec![Cell::Int(9)]).unwrap();
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.cell(0, "a"), Some(&Cell::Int(9)));
    }

    #[test]
    fn test_ensure_column_adds_nulls() {
        let mut table = CaseTable::with_rows(2);
        table.ensure_column("tacit_notes");
        assert_eq!(table.column("tacit_notes").unwrap(), &[Cell::Null, Cell::Null]);
    }

    #[test]
    fn test_retain_rows() {
        let mut table = CaseTable::from_columns(vec![(
            "id".into(),
            vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)],
        )])
        .unwrap();
        table.retain_rows(&[true, false, true]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("id").unwrap(), &[Cell::Int(1), Cell::Int(3)]);
    }

    #[test]
    fn test_row_json() {
        let table = CaseTable::from_columns(vec![
            (
                "date".into(),
                vec![Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())],
            ),
            ("score".into(), vec![Cell::Float(f64::NAN)]),
            ("note".into(), vec![Cell::Null]),
        ])
        .unwrap();
        let obj = table.row_json(0);
        assert_eq!(obj["date"], Value::from("2024-01-05"));
        assert_eq!(obj["score"], Value::Null);
        assert_eq!(obj["note"], Value::Null);
        assert_eq!(obj[INTERNAL_INDEX_FIELD], Value::from(0));
        assert_eq!(obj.len(), 4);
    }
}

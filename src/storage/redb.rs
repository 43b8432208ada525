//! redb storage engine implementation.
//!
//! The metadata table of an index directory lives in `metadata.redb`,
//! written in a single ACID transaction so a reader never observes half
//! of a merge.

use std::path::{Path, PathBuf};

use ::redb::Database;
use tracing::{debug, info, instrument, warn};

use super::schema::{TableHeader, COLUMNS_TABLE, HEADER_KEY, HEADER_TABLE, SCHEMA_VERSION};
use super::{CaseTable, MetadataStore};
use crate::error::{NotFoundError, Result, StorageError, TroubleSearchError};
use crate::types::Cell;

/// redb-backed metadata store.
///
/// Holds only the file path. Each operation opens the database, runs one
/// transaction and closes it again, so the file is never held open
/// between calls.
#[derive(Clone, Debug)]
pub struct RedbStorage {
    path: PathBuf,
}

impl RedbStorage {
    /// Points at an existing metadata file.
    ///
    /// # Errors
    ///
    /// Returns `NotFound::Metadata` if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(NotFoundError::Metadata(path.to_path_buf()).into());
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Points at a metadata file that may not exist yet (for writing).
    pub fn create(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn database(&self, create: bool) -> Result<Database> {
        let db = if create {
            Database::create(&self.path)
        } else {
            Database::open(&self.path)
        }
        .map_err(|e| StorageError::Redb(format!("{}: {}", self.path.display(), e)))?;
        Ok(db)
    }
}

impl MetadataStore for RedbStorage {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn read_table(&self) -> Result<CaseTable> {
        let db = self.database(false)?;
        let read_txn = db.begin_read().map_err(StorageError::from)?;

        let header: TableHeader = {
            let header_table = read_txn.open_table(HEADER_TABLE).map_err(|e| {
                StorageError::corrupted(format!("Cannot open header table: {}", e))
            })?;
            let bytes = header_table
                .get(HEADER_KEY)
                .map_err(StorageError::from)?
                .ok_or_else(|| StorageError::corrupted("Missing table header"))?;
            serde_json::from_slice(bytes.value())
                .map_err(|e| StorageError::corrupted(format!("Invalid table header: {}", e)))?
        };

        if header.schema_version != SCHEMA_VERSION {
            warn!(
                expected = SCHEMA_VERSION,
                found = header.schema_version,
                "Schema version mismatch"
            );
            return Err(TroubleSearchError::Storage(
                StorageError::SchemaVersionMismatch {
                    expected: SCHEMA_VERSION,
                    found: header.schema_version,
                },
            ));
        }

        let columns_table = read_txn.open_table(COLUMNS_TABLE).map_err(|e| {
            StorageError::corrupted(format!("Cannot open columns table: {}", e))
        })?;

        let mut table = CaseTable::with_rows(header.row_count);
        for name in &header.columns {
            let bytes = columns_table
                .get(name.as_str())
                .map_err(StorageError::from)?
                .ok_or_else(|| StorageError::corrupted(format!("Missing column '{}'", name)))?;
            let cells: Vec<Cell> = bincode::deserialize(bytes.value()).map_err(|e| {
                StorageError::corrupted(format!("Invalid column '{}': {}", name, e))
            })?;
            table.set_column(name.clone(), cells)?;
        }

        debug!(
            rows = table.len(),
            columns = header.columns.len(),
            "Metadata table read"
        );
        Ok(table)
    }

    #[instrument(skip(self, table), fields(path = %self.path.display(), rows = table.len()))]
    fn write_table(&self, table: &CaseTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = self.database(true)?;
        let header = TableHeader::new(
            table.column_names().into_iter().map(String::from).collect(),
            table.len(),
        );

        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            // Columns dropped from the table must not linger
            write_txn.delete_table(COLUMNS_TABLE)?;
            let mut columns_table = write_txn.open_table(COLUMNS_TABLE)?;
            for column in table.columns() {
                let bytes = bincode::serialize(&column.cells)
                    .map_err(|e| StorageError::serialization(e.to_string()))?;
                columns_table.insert(column.name.as_str(), bytes.as_slice())?;
            }

            let mut header_table = write_txn.open_table(HEADER_TABLE)?;
            let header_bytes = serde_json::to_vec(&header)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            header_table.insert(HEADER_KEY, header_bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(
            rows = header.row_count,
            columns = header.columns.len(),
            "Metadata table written"
        );
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn sample_table() -> CaseTable {
        CaseTable::from_columns(vec![
            ("id".into(), vec![Cell::Int(1), Cell::Text("A-2".into())]),
            (
                "date".into(),
                vec![
                    Cell::Date(NaiveDate::from_ymd_opt(2023, 4, 1).unwrap()),
                    Cell::Null,
                ],
            ),
            (
                "tags".into(),
                vec![Cell::List(vec!["ink".into()]), Cell::Text("a, b".into())],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.redb");
        let table = sample_table();

        RedbStorage::create(&path).write_table(&table).unwrap();
        let loaded = RedbStorage::open(&path).unwrap().read_table().unwrap();

        assert_eq!(loaded, table);
        assert_eq!(loaded.column_names(), vec!["id", "date", "tags"]);
    }

    #[test]
    fn test_rewrite_drops_removed_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.redb");
        let store = RedbStorage::create(&path);
        store.write_table(&sample_table()).unwrap();

        let smaller =
            CaseTable::from_columns(vec![("id".into(), vec![Cell::Int(7)])]).unwrap();
        store.write_table(&smaller).unwrap();

        let loaded = store.read_table().unwrap();
        assert_eq!(loaded.column_names(), vec!["id"]);
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_open_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = RedbStorage::open(dir.path().join("metadata.redb")).unwrap_err();
        assert!(matches!(
            err,
            TroubleSearchError::NotFound(NotFoundError::Metadata(_))
        ));
    }

    #[test]
    fn test_garbage_file_is_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.redb");
        std::fs::write(&path, b"not a redb file at all").unwrap();
        let err = RedbStorage::open(&path).unwrap().read_table().unwrap_err();
        assert!(err.is_storage());
    }

    #[test]
    fn test_empty_table_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.redb");
        let table = CaseTable::with_rows(0);
        RedbStorage::create(&path).write_table(&table).unwrap();
        let loaded = RedbStorage::open(&path).unwrap().read_table().unwrap();
        assert!(loaded.is_empty());
    }
}

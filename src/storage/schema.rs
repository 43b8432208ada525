//! Metadata table schema definitions and versioning.
//!
//! # Table Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ HEADER_TABLE                                                 │
//! │   Key: &str                                                  │
//! │   Value: &[u8] (JSON, human-readable)                        │
//! │   Entries: "table_header" -> TableHeader                     │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ COLUMNS_TABLE                                                │
//! │   Key: &str (column name)                                    │
//! │   Value: &[u8] (bincode-serialized Vec<Cell>)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

/// Current schema version.
///
/// The table will refuse to load if versions don't match.
pub const SCHEMA_VERSION: u32 = 1;

/// Metadata file name inside an index directory.
pub const METADATA_FILE_NAME: &str = "metadata.redb";

/// Key of the header entry.
pub const HEADER_KEY: &str = "table_header";

/// Table-level header (column order, row count).
pub const HEADER_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("header");

/// One entry per column.
pub const COLUMNS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("columns");

/// Header stored under [`HEADER_KEY`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableHeader {
    /// Schema version for compatibility checking.
    pub schema_version: u32,

    /// Column names in table order.
    pub columns: Vec<String>,

    /// Number of rows every column must have.
    pub row_count: usize,

    /// When the table was last written (RFC 3339).
    pub written_at: String,
}

impl TableHeader {
    /// Creates a header for the current schema version.
    pub fn new(columns: Vec<String>, row_count: usize) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            columns,
            row_count,
            written_at: chrono::Local::now().to_rfc3339(),
        }
    }
}

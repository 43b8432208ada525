//! Error types for trouble-search.
//!
//! trouble-search uses a hierarchical error system:
//! - [`TroubleSearchError`] is the top-level error returned by all public APIs
//! - Specific error types ([`NotFoundError`], [`StorageError`],
//!   [`ValidationError`], [`LedgerError`]) provide detail
//!
//! Two infrastructure failures are kept apart so operators can
//! tell them apart at a glance:
//! - [`TroubleSearchError::NotFound`]: a persisted file is missing ("never indexed")
//! - [`TroubleSearchError::DependencyUnavailable`]: a runtime capability
//!   failed to initialise ("misconfigured environment")
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use trouble_search::{Result, TroubleSearch, Config};
//!
//! fn example() -> Result<()> {
//!     let engine = TroubleSearch::new(Config::default())?;
//!     let hits = engine.search_cases("./data/index", &SearchQuery::new("印刷ムラ"))?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for trouble-search operations.
pub type Result<T> = std::result::Result<T, TroubleSearchError>;

/// Top-level error enum for all trouble-search operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching to handle specific error cases.
#[derive(Debug, Error)]
pub enum TroubleSearchError {
    /// A required persisted resource is missing.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// An optional runtime capability (embedding model, vector index)
    /// could not be initialised.
    #[error("Dependency unavailable: {dependency}: {reason}")]
    DependencyUnavailable {
        /// Name of the capability that failed.
        dependency: String,
        /// Why it is unavailable.
        reason: String,
    },

    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// Metadata store or vector file error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Feedback / tacit knowledge ledger error.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding generation error.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index error.
    #[error("Vector index error: {0}")]
    Vector(String),

    /// A blocking operation exceeded its time budget.
    #[error("Timed out after {after:?} while {operation}")]
    Timeout {
        /// What was running.
        operation: String,
        /// The budget that was exceeded.
        after: Duration,
    },
}

impl TroubleSearchError {
    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates a dependency-unavailable error.
    pub fn dependency(dependency: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DependencyUnavailable {
            dependency: dependency.into(),
            reason: reason.into(),
        }
    }

    /// Creates an embedding error with the given message.
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Creates a vector index error with the given message.
    pub fn vector(msg: impl Into<String>) -> Self {
        Self::Vector(msg.into())
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if a runtime capability is missing.
    pub fn is_dependency_unavailable(&self) -> bool {
        matches!(self, Self::DependencyUnavailable { .. })
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if this is a storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this is a ledger error.
    pub fn is_ledger(&self) -> bool {
        matches!(self, Self::Ledger(_))
    }

    /// Returns true if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Missing persisted resources.
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// Index directory does not exist.
    #[error("Index directory not found: {0}")]
    Directory(PathBuf),

    /// Vector index file is missing.
    #[error("Vector index not found: {0}")]
    Index(PathBuf),

    /// Metadata table file is missing.
    #[error("Metadata not found: {0}")]
    Metadata(PathBuf),

    /// Index config file is missing.
    #[error("Config not found: {0}")]
    Config(PathBuf),

    /// Ledger file is missing where one is required.
    #[error("Ledger not found: {0}")]
    Ledger(PathBuf),

    /// Incident source file is missing.
    #[error("Source data not found: {0}")]
    Source(PathBuf),
}

impl NotFoundError {
    /// Returns the path that was looked up.
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Directory(p)
            | Self::Index(p)
            | Self::Metadata(p)
            | Self::Config(p)
            | Self::Ledger(p)
            | Self::Source(p) => p,
        }
    }
}

/// Storage-related errors.
///
/// These errors indicate problems with the metadata table or vector file.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Persisted data is corrupted or inconsistent.
    #[error("Data corrupted: {0}")]
    Corrupted(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transaction failed (commit, rollback, etc.).
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Error from the redb storage engine.
    #[error("Storage engine error: {0}")]
    Redb(String),

    /// Metadata schema version doesn't match expected version.
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version.
        expected: u32,
        /// Version found on disk.
        found: u32,
    },

    /// Vector index rows and metadata rows are out of step.
    #[error("Row count mismatch: {vectors} vectors vs {rows} metadata rows")]
    RowCountMismatch {
        /// Number of stored vectors.
        vectors: usize,
        /// Number of metadata rows.
        rows: usize,
    },
}

impl StorageError {
    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a transaction error with the given message.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }
}

// redb and bincode errors convert into `StorageError`, and through it
// into `TroubleSearchError`, so `?` works on both levels.
macro_rules! storage_from {
    ($($source:ty => |$err:ident| $body:expr;)+) => {
        $(
            impl From<$source> for StorageError {
                fn from($err: $source) -> Self {
                    $body
                }
            }

            impl From<$source> for TroubleSearchError {
                fn from(err: $source) -> Self {
                    TroubleSearchError::Storage(StorageError::from(err))
                }
            }
        )+
    };
}

storage_from! {
    redb::DatabaseError => |err| StorageError::Redb(err.to_string());
    redb::TransactionError => |err| StorageError::Transaction(err.to_string());
    redb::CommitError => |err| StorageError::Transaction(format!("Commit failed: {err}"));
    redb::TableError => |err| StorageError::Redb(format!("Table error: {err}"));
    redb::StorageError => |err| StorageError::Redb(format!("Storage error: {err}"));
    bincode::Error => |err| StorageError::Serialization(err.to_string());
}

/// Ledger (CSV) errors.
///
/// Unreadable ledgers are surfaced, never treated as empty, so data loss
/// is not masked.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The CSV could not be parsed.
    #[error("Failed to parse {path}: {reason}")]
    Parse {
        /// Ledger file.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// The CSV could not be written.
    #[error("Failed to write {path}: {reason}")]
    Write {
        /// Ledger file.
        path: PathBuf,
        /// Writer message.
        reason: String,
    },

    /// The advisory file lock could not be taken.
    #[error("Failed to lock {path}: {reason}")]
    Lock {
        /// Ledger file.
        path: PathBuf,
        /// Lock failure.
        reason: String,
    },
}

impl LedgerError {
    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a write error.
    pub fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a lock error.
    pub fn lock(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Lock {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Validation errors for input data and configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Embedding dimension doesn't match the index.
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension from the index config.
        expected: usize,
        /// Actual dimension provided.
        got: usize,
    },

    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// A required field is missing or empty.
    #[error("Required field missing: {field}")]
    RequiredField {
        /// Name of the missing field.
        field: String,
    },

    /// A configured column is absent from the metadata table.
    #[error("Column '{column}' (configured as {role}) is missing from the metadata table")]
    MissingColumn {
        /// Configured role (id, date, text, ...).
        role: String,
        /// Column name.
        column: String,
    },
}

impl ValidationError {
    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a required field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }

    /// Creates a missing column error.
    pub fn missing_column(role: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            role: role.into(),
            column: column.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TroubleSearchError::config("alpha out of range");
        assert_eq!(err.to_string(), "Configuration error: alpha out of range");
    }

    #[test]
    fn test_not_found_names_the_file() {
        let err: TroubleSearchError = NotFoundError::Metadata(PathBuf::from("/idx/metadata.redb")).into();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("metadata.redb"));
    }

    #[test]
    fn test_dependency_is_distinct_from_not_found() {
        let err = TroubleSearchError::dependency("embedding model", "feature disabled");
        assert!(err.is_dependency_unavailable());
        assert!(!err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Dependency unavailable: embedding model: feature disabled"
        );
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::RowCountMismatch {
            vectors: 10,
            rows: 9,
        };
        assert_eq!(
            err.to_string(),
            "Row count mismatch: 10 vectors vs 9 metadata rows"
        );
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::missing_column("date", "created_on");
        assert_eq!(
            err.to_string(),
            "Column 'created_on' (configured as date) is missing from the metadata table"
        );
    }

    #[test]
    fn test_is_validation() {
        let err: TroubleSearchError = ValidationError::required_field("query").into();
        assert!(err.is_validation());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_ledger_error_conversion() {
        fn inner() -> Result<()> {
            Err(LedgerError::parse("/tmp/x.csv", "bad quote"))?
        }
        let err = inner().unwrap_err();
        assert!(err.is_ledger());
        assert!(err.to_string().contains("bad quote"));
    }

    #[test]
    fn test_timeout_display() {
        let err = TroubleSearchError::timeout("loading resources", Duration::from_secs(3));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timed out after 3s while loading resources");
    }
}

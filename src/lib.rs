//! # trouble-search
//!
//! Hybrid similarity search over historical trouble cases (incidents),
//! with a feedback ledger and a tacit-knowledge approval workflow that
//! feeds reviewed notes back into the searchable corpus.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trouble_search::prelude::*;
//!
//! let engine = TroubleSearch::new(Config::default())?;
//!
//! // Offline: incident CSV -> index directory
//! engine.build_index(&BuildOptions::new("data/cases.csv", "data/index"))?;
//!
//! // Online: filtered hybrid search
//! let response = engine.search_cases(
//!     "data/index",
//!     &SearchQuery::new("印刷ムラ").years(5).products(["PX-1"]),
//! )?;
//!
//! // Feedback and tacit knowledge
//! engine.record_feedback("data/search_feedback.csv", &FeedbackRecord::new("印刷ムラ", "1042", true))?;
//! let id = engine.append_tacit("data/tacit_knowledge.csv", &NewTacitNote::new("1042", "Check roller B"))?;
//! engine.approve_tacit("data/tacit_knowledge.csv", id, Some("lead"))?;
//! engine.merge_approved_notes("data/index", "data/tacit_knowledge.csv", &MergeOptions::default())?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Index directory
//!
//! One corpus snapshot: `trouble.vectors` (passage embeddings),
//! `metadata.redb` (the case table, row `i` ↔ vector `i`) and
//! `config.json` (model and column roles).
//!
//! ### Search pipeline
//!
//! Metadata filter, then vector search over the whole index for `top_k`,
//! then intersection with the filter survivors, then a TF-IDF re-rank
//! fused with the vector scores.
//!
//! ### Ledgers
//!
//! Feedback and tacit knowledge live in plain CSV files that operators
//! can open in a spreadsheet. Approved tacit notes are merged into an
//! index's metadata, after which searches see them.
//!
//! ## Features
//!
//! - `builtin-embeddings` - ONNX embedding model (multilingual E5)
//! - `cli` - the `trouble-search` command-line tool
//!
//! ## Thread Safety
//!
//! [`TroubleSearch`] is `Send + Sync`. Loaded resources are immutable and
//! shared through `Arc`; ledger writers are serialised per file, also
//! across processes.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod async_api;
mod bundle;
mod cache;
mod config;
mod engine;
mod error;
mod types;

pub mod builder;
pub mod embedding;
pub mod ledger;
pub mod lexical;
pub mod merge;
pub mod search;
pub mod storage;

/// Vector index module: exact and HNSW nearest-neighbour search.
pub mod vector;

// ============================================================================
// Public API re-exports
// ============================================================================

// Engine
pub use async_api::AsyncTroubleSearch;
pub use engine::TroubleSearch;

// Resources
pub use bundle::{read_index_config, write_index_config, ResourceBundle, CONFIG_FILE_NAME};
pub use cache::ResourceCache;

// Configuration
pub use config::{
    Config, EmbeddingProvider, HnswConfig, IndexConfig, VectorIndexKind, DEFAULT_MODEL_NAME,
    DEFAULT_NOTES_COLUMN, DEFAULT_TEXT_COLUMNS,
};

// Error handling
pub use error::{
    LedgerError, NotFoundError, Result, StorageError, TroubleSearchError, ValidationError,
};

// Core types
pub use types::{parse_date, parse_datetime, Cell, Embedding, Severity};

// Search
pub use search::{MetadataFilter, SearchQuery, SearchResponse};

// Ledgers, merge and build
pub use builder::{BuildOptions, BuildReport};
pub use ledger::{FeedbackRecord, FeedbackStats, NewTacitNote, TacitRecord};
pub use merge::{MergeOptions, MergeReport};

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common trouble-search usage.
///
/// ```rust
/// use trouble_search::prelude::*;
/// ```
pub mod prelude {
    pub use crate::async_api::AsyncTroubleSearch;
    pub use crate::builder::BuildOptions;
    pub use crate::config::{Config, EmbeddingProvider, IndexConfig};
    pub use crate::engine::TroubleSearch;
    pub use crate::error::{Result, TroubleSearchError};
    pub use crate::ledger::{FeedbackRecord, NewTacitNote};
    pub use crate::merge::MergeOptions;
    pub use crate::search::{SearchQuery, SearchResponse};
}

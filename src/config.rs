//! Configuration types for trouble-search.
//!
//! Two layers of configuration exist:
//!
//! - [`IndexConfig`] is persisted next to every index snapshot
//!   (`config.json`). It records which embedding model built the vectors
//!   and which metadata columns play which role.
//! - [`Config`] controls the running engine: how embeddings are produced,
//!   which vector index backs search, timeouts and search defaults.
//!
//! # Example
//! ```rust
//! use trouble_search::{Config, VectorIndexKind};
//!
//! // Use defaults (builtin embeddings, exact flat index)
//! let config = Config::default();
//!
//! // Approximate search for large corpora
//! let config = Config {
//!     vector_index: VectorIndexKind::Hnsw(Default::default()),
//!     default_top_k: 50,
//!     ..Default::default()
//! };
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingService;
use crate::error::ValidationError;
use crate::storage::CaseTable;

/// Default embedding model (multilingual E5, asymmetric query/passage framing).
pub const DEFAULT_MODEL_NAME: &str = "intfloat/multilingual-e5-base";

/// Default free-text columns used for embedding and lexical scoring.
pub const DEFAULT_TEXT_COLUMNS: &[&str] = &[
    "title",
    "summary",
    "root_cause",
    "countermeasure",
    "tacit_notes",
    "summary_ja",
];

/// Column that receives merged tacit knowledge notes.
pub const DEFAULT_NOTES_COLUMN: &str = "tacit_notes";

/// Per-snapshot configuration, persisted as `config.json`.
///
/// Every field has a documented default so configs written by older
/// builders (or by hand) still load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Embedding model identifier used to build the vectors.
    pub model_name: String,

    /// Free-text columns concatenated for embeddings and TF-IDF.
    pub text_cols: Vec<String>,

    /// Case identifier column.
    pub id_col: String,

    /// Case date column (recency filter).
    pub date_col: String,

    /// Severity column (numeric or scale label).
    pub severity_col: String,

    /// Product/category column.
    pub product_col: String,

    /// Tags column (comma-separated text or list).
    pub tags_col: String,

    /// Embedding dimension recorded at build time, if known.
    pub dimension: Option<usize>,

    /// Build timestamp (ISO-8601), if recorded.
    pub built_at: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            text_cols: DEFAULT_TEXT_COLUMNS.iter().map(|s| s.to_string()).collect(),
            id_col: "id".to_string(),
            date_col: "date".to_string(),
            severity_col: "severity".to_string(),
            product_col: "product".to_string(),
            tags_col: "tags".to_string(),
            dimension: None,
            built_at: None,
        }
    }
}

impl IndexConfig {
    /// Validates the configuration on its own.
    ///
    /// # Errors
    /// Returns `ValidationError` if the model name or any column name is empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.model_name.trim().is_empty() {
            return Err(ValidationError::required_field("model_name"));
        }
        for (role, col) in self.role_columns() {
            if col.trim().is_empty() {
                return Err(ValidationError::invalid_field(
                    format!("{role}_col"),
                    "column name must not be empty",
                ));
            }
        }
        if let Some(i) = self.text_cols.iter().position(|c| c.trim().is_empty()) {
            return Err(ValidationError::invalid_field(
                "text_cols",
                format!("column name at index {i} is empty"),
            ));
        }
        if self.dimension == Some(0) {
            return Err(ValidationError::invalid_field(
                "dimension",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Checks that every configured column exists in the loaded table.
    ///
    /// # Errors
    /// Returns `ValidationError::MissingColumn` for the first absent column.
    pub fn validate_against(&self, table: &CaseTable) -> Result<(), ValidationError> {
        self.validate()?;
        for (role, col) in self.role_columns() {
            if !table.has_column(col) {
                return Err(ValidationError::missing_column(role, col));
            }
        }
        for col in &self.text_cols {
            if !table.has_column(col) {
                return Err(ValidationError::missing_column("text", col));
            }
        }
        Ok(())
    }

    /// Every role column, paired with its role name.
    pub fn role_columns(&self) -> [(&'static str, &str); 5] {
        [
            ("id", self.id_col.as_str()),
            ("date", self.date_col.as_str()),
            ("severity", self.severity_col.as_str()),
            ("product", self.product_col.as_str()),
            ("tags", self.tags_col.as_str()),
        ]
    }
}

/// Engine configuration.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use trouble_search::Config;
///
/// let config = Config {
///     default_alpha: 0.3,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// How query and passage embeddings are produced.
    pub embedding_provider: EmbeddingProvider,

    /// Which nearest-neighbour structure is built over the stored vectors.
    pub vector_index: VectorIndexKind,

    /// Number of passages embedded per batch at build time.
    pub embed_batch_size: usize,

    /// Default number of vector neighbours requested per search.
    pub default_top_k: usize,

    /// Default lexical weight in score fusion (0 = vector only, 1 = lexical only).
    pub default_alpha: f64,

    /// Budget for loading a resource bundle via the async API.
    pub load_timeout: Duration,

    /// Budget for a single search via the async API.
    pub search_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_provider: EmbeddingProvider::Builtin { model_dir: None },
            // Exact search keeps results identical to a brute-force scan
            vector_index: VectorIndexKind::Flat,
            embed_batch_size: 128,
            default_top_k: 30,
            default_alpha: 0.5,
            load_timeout: Duration::from_secs(300),
            search_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a Config that uses a caller-supplied embedding service.
    ///
    /// # Example
    /// ```rust,ignore
    /// let config = Config::with_embedding_service(Arc::new(MyEmbedder::new()));
    /// ```
    pub fn with_embedding_service(service: Arc<dyn EmbeddingService>) -> Self {
        Self {
            embedding_provider: EmbeddingProvider::Custom(service),
            ..Default::default()
        }
    }

    /// Validates the configuration.
    ///
    /// Called by `TroubleSearch::new()`.
    ///
    /// # Errors
    /// Returns `ValidationError` if:
    /// - `embed_batch_size` or `default_top_k` is 0
    /// - `default_alpha` is outside `[0, 1]`
    /// - a timeout is zero
    /// - HNSW parameters are zero
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.embed_batch_size == 0 {
            return Err(ValidationError::invalid_field(
                "embed_batch_size",
                "must be greater than 0",
            ));
        }
        if self.default_top_k == 0 {
            return Err(ValidationError::invalid_field(
                "default_top_k",
                "must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.default_alpha) {
            return Err(ValidationError::invalid_field(
                "default_alpha",
                format!("must be between 0.0 and 1.0, got {}", self.default_alpha),
            ));
        }
        if self.load_timeout.is_zero() {
            return Err(ValidationError::invalid_field(
                "load_timeout",
                "must be greater than 0",
            ));
        }
        if self.search_timeout.is_zero() {
            return Err(ValidationError::invalid_field(
                "search_timeout",
                "must be greater than 0",
            ));
        }
        if let VectorIndexKind::Hnsw(hnsw) = &self.vector_index {
            hnsw.validate()?;
        }
        Ok(())
    }
}

/// Embedding provider configuration.
#[derive(Clone)]
pub enum EmbeddingProvider {
    /// Local ONNX model named by the index config.
    ///
    /// Requires the `builtin-embeddings` feature; otherwise loading an
    /// index fails with `DependencyUnavailable`.
    Builtin {
        /// Model directory containing `model.onnx` and `tokenizer.json`.
        /// If `None`, the default cache directory for the index's model is used.
        model_dir: Option<PathBuf>,
    },

    /// Caller-provided embedding service (remote API, test double, ...).
    Custom(Arc<dyn EmbeddingService>),
}

impl EmbeddingProvider {
    /// Returns true if this is the builtin provider.
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Builtin { .. })
    }

    /// Returns true if this is a caller-provided service.
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin { model_dir } => f
                .debug_struct("Builtin")
                .field("model_dir", model_dir)
                .finish(),
            Self::Custom(service) => f
                .debug_struct("Custom")
                .field("dimension", &service.dimension())
                .finish_non_exhaustive(),
        }
    }
}

/// Nearest-neighbour structure built over the stored vectors.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum VectorIndexKind {
    /// Exact brute-force L2 search.
    #[default]
    Flat,
    /// Approximate HNSW graph search.
    Hnsw(HnswConfig),
}

/// HNSW tuning parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Maximum connections per node per layer (M).
    pub max_nb_connection: usize,

    /// Candidate list size during construction.
    pub ef_construction: usize,

    /// Candidate list size during search (raised to `k` when smaller).
    pub ef_search: usize,

    /// Maximum number of graph layers.
    pub max_layer: usize,

    /// Capacity hint for the graph.
    pub max_elements: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_nb_connection: 16,
            ef_construction: 200,
            ef_search: 64,
            max_layer: 16,
            max_elements: 100_000,
        }
    }
}

impl HnswConfig {
    /// Validates the HNSW parameters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("max_nb_connection", self.max_nb_connection),
            ("ef_construction", self.ef_construction),
            ("ef_search", self.ef_search),
            ("max_layer", self.max_layer),
            ("max_elements", self.max_elements),
        ] {
            if value == 0 {
                return Err(ValidationError::invalid_field(
                    format!("hnsw.{field}"),
                    "must be greater than 0",
                ));
            }
        }
        Ok(())
    }
}

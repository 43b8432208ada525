//! Resource bundle: everything a search needs for one index directory.
//!
//! A bundle is loaded once per directory, shared through an `Arc` and
//! never mutated. Merging notes produces a new bundle on the next access
//! while in-flight searches finish against the old one.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use tracing::{info, instrument};

use crate::config::{Config, IndexConfig};
use crate::embedding::{create_embedding_service, EncodeIntent, Encoder};
use crate::error::{NotFoundError, Result, StorageError, TroubleSearchError, ValidationError};
use crate::lexical::{corpus_texts, TfidfMatrix, TfidfModel};
use crate::search::{fuse, MetadataFilter};
use crate::storage::{CaseTable, MetadataStore, RedbStorage, METADATA_FILE_NAME};
use crate::vector::{build_index, VectorFile, VectorIndex};

/// Index config file name inside an index directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Reads and validates `config.json` from an index directory.
pub fn read_index_config(dir: &Path) -> Result<IndexConfig> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.is_file() {
        return Err(NotFoundError::Config(path).into());
    }
    let raw = fs::read(&path)?;
    let config: IndexConfig = serde_json::from_slice(&raw).map_err(|e| {
        TroubleSearchError::config(format!("invalid {}: {}", path.display(), e))
    })?;
    config.validate()?;
    Ok(config)
}

/// Writes `config.json` into an index directory.
pub fn write_index_config(dir: &Path, config: &IndexConfig) -> Result<()> {
    fs::create_dir_all(dir)?;
    let json = serde_json::to_vec_pretty(config)
        .map_err(|e| StorageError::serialization(e.to_string()))?;
    fs::write(dir.join(CONFIG_FILE_NAME), json)?;
    Ok(())
}

/// Loaded, immutable search resources for one index directory.
pub struct ResourceBundle {
    dir: PathBuf,
    config: IndexConfig,
    table: CaseTable,
    index: Box<dyn VectorIndex>,
    tfidf: TfidfModel,
    tfidf_matrix: TfidfMatrix,
    encoder: Encoder,
    loaded_at: DateTime<Local>,
}

impl ResourceBundle {
    /// Loads every resource of an index directory.
    ///
    /// Missing files are reported before the embedding model is touched.
    ///
    /// # Errors
    ///
    /// - `NotFound` naming the missing directory, config, metadata or vector file
    /// - `Validation` if a configured column is absent or dimensions disagree
    /// - `Storage` if vector and metadata row counts differ
    /// - `DependencyUnavailable` if the embedding model or vector index
    ///   cannot be initialised
    #[instrument(skip(runtime), fields(dir = %dir.display()))]
    pub fn load(dir: &Path, runtime: &Config) -> Result<Self> {
        if !dir.is_dir() {
            return Err(NotFoundError::Directory(dir.to_path_buf()).into());
        }

        let config = read_index_config(dir)?;
        let table = RedbStorage::open(dir.join(METADATA_FILE_NAME))?.read_table()?;
        let vectors = VectorFile::load(dir)?;

        config.validate_against(&table)?;
        if vectors.len() != table.len() {
            return Err(StorageError::RowCountMismatch {
                vectors: vectors.len(),
                rows: table.len(),
            }
            .into());
        }
        if let Some(expected) = config.dimension {
            if expected != vectors.dimension {
                return Err(ValidationError::dimension_mismatch(expected, vectors.dimension).into());
            }
        }

        let (tfidf, tfidf_matrix) =
            TfidfModel::fit_transform(&corpus_texts(&table, &config.text_cols));
        let index = build_index(&runtime.vector_index, &vectors)?;

        let service = create_embedding_service(runtime, &config.model_name)?;
        if service.dimension() != vectors.dimension {
            return Err(
                ValidationError::dimension_mismatch(vectors.dimension, service.dimension()).into(),
            );
        }
        let encoder = Encoder::new(service, config.model_name.clone());

        info!(
            rows = table.len(),
            dimension = vectors.dimension,
            vocabulary = tfidf.vocabulary_len(),
            model = %config.model_name,
            "Resource bundle loaded"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            table,
            index,
            tfidf,
            tfidf_matrix,
            encoder,
            loaded_at: Local::now(),
        })
    }

    /// Directory this bundle was loaded from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persisted index configuration.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Metadata table.
    pub fn table(&self) -> &CaseTable {
        &self.table
    }

    /// Query/passage encoder.
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// When the bundle was loaded.
    pub fn loaded_at(&self) -> DateTime<Local> {
        self.loaded_at
    }

    /// Ascending row positions passing `filter`.
    pub fn filter_rows(&self, filter: &MetadataFilter, today: NaiveDate) -> Vec<usize> {
        filter.apply(&self.table, &self.config, today)
    }

    /// Embeds `query` with query framing and returns up to `top_k`
    /// `(row, score)` pairs, best first. Scores are negated distances.
    pub fn vector_search(&self, query: &str, top_k: usize) -> Result<Vec<(usize, f64)>> {
        let embedding = self.encoder.encode_one(query, EncodeIntent::Query)?;
        let hits = self.index.search(&embedding, top_k)?;
        Ok(hits
            .into_iter()
            .map(|(row, distance)| (row, -f64::from(distance)))
            .collect())
    }

    /// Re-ranks candidate rows by TF-IDF, fused with `vector_scores` when given.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `vector_scores` and `candidates` differ in
    /// length, or a candidate is not a row of the table.
    pub fn rerank(
        &self,
        query: &str,
        candidates: &[usize],
        vector_scores: Option<&[f64]>,
        alpha: f64,
    ) -> Result<Vec<usize>> {
        if let Some(scores) = vector_scores {
            if scores.len() != candidates.len() {
                return Err(ValidationError::invalid_field(
                    "vector_scores",
                    format!(
                        "{} scores for {} candidates",
                        scores.len(),
                        candidates.len()
                    ),
                )
                .into());
            }
        }
        if let Some(&row) = candidates.iter().find(|&&r| r >= self.table.len()) {
            return Err(ValidationError::invalid_field(
                "candidates",
                format!("row {row} out of range ({} rows)", self.table.len()),
            )
            .into());
        }

        let q = self.tfidf.transform(query);
        let lexical = self.tfidf_matrix.score_rows(&q, candidates);
        Ok(fuse(vector_scores, &lexical, alpha)
            .into_iter()
            .map(|i| candidates[i])
            .collect())
    }
}

impl fmt::Debug for ResourceBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceBundle")
            .field("dir", &self.dir)
            .field("rows", &self.table.len())
            .field("model", &self.config.model_name)
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_index_config_missing() {
        let dir = tempdir().unwrap();
        let err = read_index_config(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            TroubleSearchError::NotFound(NotFoundError::Config(_))
        ));
    }

    #[test]
    fn test_read_index_config_invalid_json() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), b"{not json").unwrap();
        assert!(read_index_config(dir.path()).unwrap_err().is_config());
    }

    #[test]
    fn test_index_config_write_read() {
        let dir = tempdir().unwrap();
        let config = IndexConfig {
            dimension: Some(8),
            ..Default::default()
        };
        write_index_config(dir.path(), &config).unwrap();
        assert_eq!(read_index_config(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_load_missing_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = ResourceBundle::load(&missing, &Config::default()).unwrap_err();
        assert!(matches!(
            err,
            TroubleSearchError::NotFound(NotFoundError::Directory(_))
        ));
    }
}

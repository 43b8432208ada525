//! Offline index builder: incident CSV to a persisted index directory.
//!
//! ```text
//! source CSV ─► typed table ─► recency filter ─► passage embeddings
//!                                                      │
//!          config.json ◄── metadata.redb ◄── trouble.vectors
//! ```
//!
//! Column types are inferred per column (integer, then float, then text);
//! empty cells are null. The date column is parsed to calendar dates and
//! missing `tags`/`product` values become empty text so filters see a
//! string. Configured columns absent from the CSV are added as null
//! columns, so every snapshot passes the load-time column check.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::bundle::write_index_config;
use crate::config::{Config, IndexConfig};
use crate::embedding::{create_embedding_service, EncodeIntent, Encoder};
use crate::error::{NotFoundError, Result, ValidationError};
use crate::search::recency_threshold;
use crate::storage::{CaseTable, MetadataStore, RedbStorage, METADATA_FILE_NAME};
use crate::types::{parse_date, Cell};
use crate::vector::VectorFile;

/// Default recency window of a build, in years.
pub const DEFAULT_BUILD_YEARS: u32 = 10;

/// Separator between text cells in a passage.
const PASSAGE_JOIN: &str = " \n";

/// What to build and where.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildOptions {
    /// Incident CSV with a header row.
    pub source_csv: PathBuf,
    /// Index directory to write (created if needed).
    pub output_dir: PathBuf,
    /// Model and column roles recorded in `config.json`.
    pub index_config: IndexConfig,
    /// Keep cases dated within this many years; 0 keeps every row.
    pub years: u32,
    /// Passages per embedding batch; engine default when `None`.
    pub batch_size: Option<usize>,
}

impl BuildOptions {
    /// Options with the default index config and a 10-year window.
    pub fn new(source_csv: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_csv: source_csv.into(),
            output_dir: output_dir.into(),
            index_config: IndexConfig::default(),
            years: DEFAULT_BUILD_YEARS,
            batch_size: None,
        }
    }

    /// Sets the recency window (0 disables it).
    pub fn years(mut self, years: u32) -> Self {
        self.years = years;
        self
    }

    /// Sets the index config.
    pub fn index_config(mut self, config: IndexConfig) -> Self {
        self.index_config = config;
        self
    }

    /// Sets the embedding batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

/// Outcome of a build.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Rows in the source CSV.
    pub rows_read: usize,
    /// Rows indexed after the recency filter.
    pub rows_kept: usize,
    /// Embedding dimension.
    pub dimension: usize,
    /// Directory written.
    pub output_dir: PathBuf,
    /// Model the vectors were produced with.
    pub model_name: String,
}

/// Infers the type of a column from its raw values.
fn infer_column(raw: Vec<String>) -> Vec<Cell> {
    let present = || raw.iter().map(|s| s.trim()).filter(|s| !s.is_empty());

    if present().all(|s| s.parse::<i64>().is_ok()) {
        return raw
            .iter()
            .map(|s| s.trim().parse::<i64>().map_or(Cell::Null, Cell::Int))
            .collect();
    }
    if present().all(|s| s.parse::<f64>().is_ok()) {
        return raw
            .iter()
            .map(|s| s.trim().parse::<f64>().map_or(Cell::Null, Cell::Float))
            .collect();
    }
    raw.into_iter()
        .map(|s| {
            if s.trim().is_empty() {
                Cell::Null
            } else {
                Cell::Text(s)
            }
        })
        .collect()
}

/// Reads the incident CSV into a typed table, keeping column order.
///
/// # Errors
///
/// - `NotFound::Source` if the file does not exist
/// - `Validation` if the CSV is malformed
pub fn read_source_csv(path: &Path) -> Result<CaseTable> {
    if !path.is_file() {
        return Err(NotFoundError::Source(path.to_path_buf()).into());
    }
    let invalid = |e: csv::Error| ValidationError::invalid_field("source_csv", e.to_string());

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(invalid)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(invalid)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    let mut rows = 0;
    for record in reader.records() {
        let record = record.map_err(invalid)?;
        for (col, values) in raw.iter_mut().enumerate() {
            values.push(record.get(col).unwrap_or_default().to_string());
        }
        rows += 1;
    }

    let mut table = CaseTable::with_rows(rows);
    for (name, values) in headers.into_iter().zip(raw) {
        table.set_column(name, infer_column(values))?;
    }
    Ok(table)
}

/// Applies the column roles of `config` to a freshly read table.
fn normalize_table(table: &mut CaseTable, config: &IndexConfig) -> Result<()> {
    let missing: Vec<&str> = config
        .role_columns()
        .into_iter()
        .map(|(_, col)| col)
        .chain(config.text_cols.iter().map(String::as_str))
        .filter(|col| !table.has_column(col))
        .collect();
    if !missing.is_empty() {
        warn!(columns = ?missing, "Configured columns absent from source; added as null");
    }
    for col in missing {
        table.ensure_column(col);
    }

    if let Some(cells) = table.column(&config.date_col) {
        let dates = cells
            .iter()
            .map(|cell| match cell {
                Cell::Date(_) | Cell::Null => cell.clone(),
                other => parse_date(&other.to_plain_string()).map_or(Cell::Null, Cell::Date),
            })
            .collect();
        table.set_column(config.date_col.clone(), dates)?;
    }

    for col in [&config.tags_col, &config.product_col] {
        if let Some(cells) = table.column(col) {
            let filled = cells
                .iter()
                .map(|cell| {
                    if cell.is_null() {
                        Cell::Text(String::new())
                    } else {
                        cell.clone()
                    }
                })
                .collect();
            table.set_column(col.clone(), filled)?;
        }
    }
    Ok(())
}

/// Drops rows dated before `today - years * 365 days`, and undated rows.
fn apply_recency(table: &mut CaseTable, date_col: &str, years: u32, today: NaiveDate) {
    if years == 0 {
        return;
    }
    let cutoff = recency_threshold(today, years);
    let keep: Vec<bool> = (0..table.len())
        .map(|row| {
            table
                .cell(row, date_col)
                .and_then(Cell::as_date)
                .is_some_and(|d| d >= cutoff)
        })
        .collect();
    table.retain_rows(&keep);
}

/// Passage text of every row: non-empty text cells, trimmed, joined.
fn passages(table: &CaseTable, text_cols: &[String]) -> Vec<String> {
    let columns: Vec<&[Cell]> = text_cols.iter().filter_map(|c| table.column(c)).collect();
    (0..table.len())
        .map(|row| {
            columns
                .iter()
                .filter_map(|cells| cells.get(row))
                .filter(|cell| !cell.is_null())
                .map(Cell::to_plain_string)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(PASSAGE_JOIN)
        })
        .collect()
}

/// Builds an index directory from an incident CSV.
///
/// # Errors
///
/// - `NotFound::Source` if the CSV is missing
/// - `DependencyUnavailable` if the embedding model cannot be loaded
/// - `Validation`/`Storage`/`Io` for bad input or write failures
pub fn build(options: &BuildOptions, runtime: &Config) -> Result<BuildReport> {
    build_at(options, runtime, Local::now().date_naive())
}

#[instrument(skip(options, runtime), fields(source = %options.source_csv.display(), output = %options.output_dir.display()))]
pub(crate) fn build_at(
    options: &BuildOptions,
    runtime: &Config,
    today: NaiveDate,
) -> Result<BuildReport> {
    options.index_config.validate()?;
    let batch_size = options.batch_size.unwrap_or(runtime.embed_batch_size);
    if batch_size == 0 {
        return Err(ValidationError::invalid_field("batch_size", "must be greater than 0").into());
    }

    let mut table = read_source_csv(&options.source_csv)?;
    let rows_read = table.len();
    normalize_table(&mut table, &options.index_config)?;
    apply_recency(&mut table, &options.index_config.date_col, options.years, today);
    let rows_kept = table.len();
    info!(rows_read, rows_kept, years = options.years, "Source table prepared");
    if rows_kept == 0 {
        warn!("No rows left after the recency filter; writing an empty index");
    }

    let model_name = options.index_config.model_name.clone();
    let encoder = Encoder::new(create_embedding_service(runtime, &model_name)?, &model_name);
    let texts = passages(&table, &options.index_config.text_cols);
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let embeddings = encoder.encode(&refs, EncodeIntent::Passage, batch_size)?;
    let dimension = encoder.dimension();

    fs::create_dir_all(&options.output_dir)?;
    VectorFile::new(dimension, embeddings)?.save(&options.output_dir)?;
    RedbStorage::create(options.output_dir.join(METADATA_FILE_NAME)).write_table(&table)?;
    let config = IndexConfig {
        dimension: Some(dimension),
        built_at: Some(Local::now().to_rfc3339()),
        ..options.index_config.clone()
    };
    write_index_config(&options.output_dir, &config)?;

    info!(rows = rows_kept, dimension, model = %model_name, "Index built");
    Ok(BuildReport {
        rows_read,
        rows_kept,
        dimension,
        output_dir: options.output_dir.clone(),
        model_name,
    })
}

//! trouble-search CLI: build, search and curate trouble-case indexes.
//!
//! # Usage
//!
//! ```bash
//! # Build an index from an incident CSV (last 10 years)
//! trouble-search build --source data/cases.csv --output data/index
//!
//! # Search it
//! trouble-search search --index data/index "印刷ムラ" --years 5 --product PX-1
//!
//! # Curate tacit knowledge
//! trouble-search tacit-list --ledger data/tacit_knowledge.csv --status pending
//! trouble-search tacit-approve --ledger data/tacit_knowledge.csv 3 --approver lead
//! trouble-search merge-notes --index data/index --ledger data/tacit_knowledge.csv
//!
//! # Feedback summary
//! trouble-search feedback-stats --ledger data/search_feedback.csv
//! ```
//!
//! Output is JSON on stdout; logs go to stderr (`RUST_LOG` overrides the level).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use trouble_search::prelude::*;
use trouble_search::{HnswConfig, VectorIndexKind};

/// Hybrid similarity search over historical trouble cases.
#[derive(Parser)]
#[command(name = "trouble-search", version, about)]
struct Cli {
    /// Directory holding the ONNX embedding model (default: download to the cache)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Use the approximate HNSW index instead of exact search
    #[arg(long, global = true)]
    hnsw: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an index directory from an incident CSV
    Build {
        /// Incident CSV with a header row
        #[arg(long)]
        source: PathBuf,
        /// Index directory to write
        #[arg(long)]
        output: PathBuf,
        /// Keep cases from the last N years (0 keeps everything)
        #[arg(long, default_value_t = trouble_search::builder::DEFAULT_BUILD_YEARS)]
        years: u32,
        /// Embedding model identifier
        #[arg(long, default_value = trouble_search::DEFAULT_MODEL_NAME)]
        model: String,
        /// Passages per embedding batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Search an index
    Search {
        /// Index directory
        #[arg(long)]
        index: PathBuf,
        /// Free-text query
        query: String,
        /// Only cases from the last N years
        #[arg(long)]
        years: Option<u32>,
        /// Minimum severity (inclusive)
        #[arg(long)]
        severity_min: Option<f64>,
        /// Maximum severity (inclusive)
        #[arg(long)]
        severity_max: Option<f64>,
        /// Product to match exactly (repeatable)
        #[arg(long = "product")]
        products: Vec<String>,
        /// Tag to match (repeatable, any matches)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Vector neighbours to consider
        #[arg(long)]
        top_k: Option<usize>,
        /// Lexical weight in [0, 1]
        #[arg(long)]
        alpha: Option<f64>,
    },

    /// Summarise the feedback ledger
    FeedbackStats {
        /// Feedback CSV
        #[arg(long)]
        ledger: PathBuf,
    },

    /// List tacit knowledge notes
    TacitList {
        /// Tacit knowledge CSV
        #[arg(long)]
        ledger: PathBuf,
        /// Only notes with this status
        #[arg(long)]
        status: Option<String>,
    },

    /// Approve a tacit knowledge note
    TacitApprove {
        /// Tacit knowledge CSV
        #[arg(long)]
        ledger: PathBuf,
        /// Note id
        id: i64,
        /// Approver name
        #[arg(long)]
        approver: Option<String>,
    },

    /// Merge approved notes into an index's metadata
    MergeNotes {
        /// Index directory
        #[arg(long)]
        index: PathBuf,
        /// Tacit knowledge CSV
        #[arg(long)]
        ledger: PathBuf,
        /// Metadata column receiving the notes
        #[arg(long, default_value = trouble_search::DEFAULT_NOTES_COLUMN)]
        target_col: String,
        /// Status selecting the notes to merge
        #[arg(long, default_value = "approved")]
        approved_status: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| TroubleSearchError::config(format!("cannot render output: {e}")))?;
    println!("{json}");
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config {
        embedding_provider: EmbeddingProvider::Builtin {
            model_dir: cli.model_dir,
        },
        vector_index: if cli.hnsw {
            VectorIndexKind::Hnsw(HnswConfig::default())
        } else {
            VectorIndexKind::Flat
        },
        ..Default::default()
    };
    let engine = AsyncTroubleSearch::new(config)?;

    match cli.command {
        Command::Build {
            source,
            output,
            years,
            model,
            batch_size,
        } => {
            let mut options = BuildOptions::new(source, output)
                .years(years)
                .index_config(IndexConfig {
                    model_name: model,
                    ..Default::default()
                });
            options.batch_size = batch_size;
            print_json(&engine.build_index(options).await?)
        }

        Command::Search {
            index,
            query,
            years,
            severity_min,
            severity_max,
            products,
            tags,
            top_k,
            alpha,
        } => {
            let mut query = SearchQuery::new(query)
                .severity_range(severity_min, severity_max)
                .products(products)
                .tags(tags);
            query.filter.years = years;
            query.top_k = top_k;
            query.alpha = alpha;
            print_json(&engine.search_cases(index, query).await?)
        }

        Command::FeedbackStats { ledger } => {
            print_json(&engine.load_feedback_stats(ledger).await?)
        }

        Command::TacitList { ledger, status } => {
            let records = engine.list_tacit_knowledge(ledger, status).await?;
            print_json(&serde_json::json!({ "count": records.len(), "results": records }))
        }

        Command::TacitApprove {
            ledger,
            id,
            approver,
        } => {
            let updated = engine.approve_tacit(ledger, id, approver).await?;
            print_json(&serde_json::json!({ "id": id, "updated": updated }))
        }

        Command::MergeNotes {
            index,
            ledger,
            target_col,
            approved_status,
        } => {
            let options = MergeOptions {
                target_col,
                approved_status,
            };
            print_json(&engine.merge_approved_notes(index, ledger, options).await?)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

//! `TroubleSearch` engine: the main entry point.
//!
//! The [`TroubleSearch`] struct ties the pieces together:
//!
//! - Cached, lazily loaded resources per index directory
//! - Hybrid case search
//! - Feedback and tacit knowledge ledgers
//! - Merging approved notes back into an index
//! - Building an index from an incident CSV
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use trouble_search::{Config, SearchQuery, TroubleSearch};
//!
//! let engine = TroubleSearch::new(Config::default())?;
//! let response = engine.search_cases("data/index", &SearchQuery::new("印刷ムラ").years(5))?;
//! for case in &response.results {
//!     println!("{}", case["title"]);
//! }
//! ```
//!
//! # Thread Safety
//!
//! `TroubleSearch` is `Send + Sync`; share it with `Arc`. Searches against
//! the same directory share one immutable bundle, and a merge into that
//! directory never blocks searches already running.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{debug, info, instrument};

use crate::builder::{self, BuildOptions, BuildReport};
use crate::bundle::ResourceBundle;
use crate::cache::ResourceCache;
use crate::config::Config;
use crate::error::{Result, TroubleSearchError};
use crate::ledger::{self, FeedbackRecord, FeedbackStats, NewTacitNote, TacitRecord};
use crate::merge::{merge_into_dir, MergeOptions, MergeReport};
use crate::search::{self, SearchQuery, SearchResponse};

/// The trouble-case search engine.
///
/// Holds the runtime configuration and the resource cache. Ledger
/// operations take the ledger path explicitly, so one engine can serve
/// several ledgers.
pub struct TroubleSearch {
    config: Config,
    cache: ResourceCache,
}

impl std::fmt::Debug for TroubleSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TroubleSearch")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}

impl TroubleSearch {
    /// Creates an engine.
    ///
    /// Nothing is loaded yet: index directories are loaded on first use.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the configuration is invalid (see
    /// [`Config::validate`]).
    pub fn new(config: Config) -> Result<Self> {
        config.validate().map_err(TroubleSearchError::from)?;
        info!(
            vector_index = ?config.vector_index,
            top_k = config.default_top_k,
            alpha = config.default_alpha,
            "TroubleSearch engine created"
        );
        Ok(Self {
            config,
            cache: ResourceCache::new(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The resource cache.
    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    /// Returns the loaded resources of an index directory, loading them on
    /// first access. Repeated calls return the same `Arc` until the entry
    /// is invalidated.
    pub fn resources(&self, dir: impl AsRef<Path>) -> Result<Arc<ResourceBundle>> {
        self.cache
            .get_or_load(dir.as_ref(), |canonical| {
                ResourceBundle::load(canonical, &self.config)
            })
    }

    /// Drops the cached resources of `dir`. Returns true if any were cached.
    pub fn invalidate(&self, dir: impl AsRef<Path>) -> Result<bool> {
        self.cache.invalidate(dir.as_ref())
    }

    /// Drops every cached bundle.
    pub fn clear(&self) -> Result<()> {
        self.cache.clear()
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Searches the cases of an index directory.
    ///
    /// `top_k` and `alpha` fall back to the engine defaults. An empty
    /// filter result or an empty intersection with the vector hits is an
    /// empty response, not an error. So is `top_k == 0`; an `alpha`
    /// outside `[0, 1]` is clamped.
    ///
    /// # Errors
    ///
    /// - `NotFound` / `DependencyUnavailable` if the directory cannot be loaded
    /// - `Embedding` if the query cannot be embedded
    #[instrument(skip(self, dir, query), fields(dir = %dir.as_ref().display(), query = %query.text))]
    pub fn search_cases(
        &self,
        dir: impl AsRef<Path>,
        query: &SearchQuery,
    ) -> Result<SearchResponse> {
        self.search_cases_on(dir, query, Local::now().date_naive())
    }

    /// Like [`search_cases`](Self::search_cases), with the recency window
    /// anchored at `today`.
    pub fn search_cases_on(
        &self,
        dir: impl AsRef<Path>,
        query: &SearchQuery,
        today: NaiveDate,
    ) -> Result<SearchResponse> {
        let top_k = query.top_k.unwrap_or(self.config.default_top_k);
        let alpha = query.alpha.unwrap_or(self.config.default_alpha);

        let bundle = self.resources(dir)?;
        let response = search::execute(&bundle, query, top_k, alpha, today)?;
        debug!(count = response.count, top_k, alpha, "Search complete");
        Ok(response)
    }

    // ------------------------------------------------------------------
    // Ledgers
    // ------------------------------------------------------------------

    /// Appends a feedback record to the ledger at `path`.
    pub fn record_feedback(&self, path: impl AsRef<Path>, record: &FeedbackRecord) -> Result<()> {
        ledger::record_feedback(path.as_ref(), record)
    }

    /// Summarises the feedback ledger at `path`.
    pub fn load_feedback_stats(&self, path: impl AsRef<Path>) -> Result<FeedbackStats> {
        ledger::load_feedback_stats(path.as_ref())
    }

    /// Appends a tacit note and returns its id.
    pub fn append_tacit(&self, path: impl AsRef<Path>, note: &NewTacitNote) -> Result<i64> {
        ledger::append_tacit(path.as_ref(), note)
    }

    /// Updates the status of a tacit note. Returns false if the id is unknown.
    pub fn update_tacit_status(
        &self,
        path: impl AsRef<Path>,
        id: i64,
        status: &str,
        approver: Option<&str>,
    ) -> Result<bool> {
        ledger::update_tacit_status(path.as_ref(), id, status, approver)
    }

    /// Approves a tacit note. Returns false if the id is unknown.
    pub fn approve_tacit(
        &self,
        path: impl AsRef<Path>,
        id: i64,
        approver: Option<&str>,
    ) -> Result<bool> {
        ledger::approve_tacit(path.as_ref(), id, approver)
    }

    /// Lists tacit notes, optionally only those with `status`.
    pub fn list_tacit_knowledge(
        &self,
        path: impl AsRef<Path>,
        status: Option<&str>,
    ) -> Result<Vec<TacitRecord>> {
        ledger::list_tacit_knowledge(path.as_ref(), status)
    }

    // ------------------------------------------------------------------
    // Index maintenance
    // ------------------------------------------------------------------

    /// Merges approved notes into the metadata of `dir` and invalidates
    /// its cache entry.
    ///
    /// Searches already holding the old bundle finish against it; the next
    /// access loads the merged metadata.
    pub fn merge_approved_notes(
        &self,
        dir: impl AsRef<Path>,
        tacit_path: impl AsRef<Path>,
        options: &MergeOptions,
    ) -> Result<MergeReport> {
        let tacit_path = tacit_path.as_ref();
        self.cache
            .exclusive(dir.as_ref(), |canonical| {
                merge_into_dir(canonical, tacit_path, options)
            })
    }

    /// Builds an index directory and invalidates any cached bundle for it.
    pub fn build_index(&self, options: &BuildOptions) -> Result<BuildReport> {
        fs::create_dir_all(&options.output_dir)?;
        self.cache
            .exclusive(&options.output_dir, |_| builder::build(options, &self.config))
    }
}

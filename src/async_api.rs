//! Async facade over [`TroubleSearch`].
//!
//! Every operation of the engine blocks (model inference, redb, CSV I/O),
//! so each call here runs on `tokio::task::spawn_blocking`. Loads and
//! searches are bounded by [`Config::load_timeout`] and
//! [`Config::search_timeout`].
//!
//! A timed-out call returns `Timeout` right away, but the blocking work
//! itself cannot be cancelled and runs to completion in the background.
//! A load that finishes late still populates the cache.
//!
//! ```rust,ignore
//! let engine = AsyncTroubleSearch::new(Config::default())?;
//! let response = engine.search_cases("data/index", SearchQuery::new("印刷ムラ")).await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{self, JoinError};
use tracing::warn;

use crate::builder::{BuildOptions, BuildReport};
use crate::bundle::ResourceBundle;
use crate::config::Config;
use crate::engine::TroubleSearch;
use crate::error::{Result, TroubleSearchError};
use crate::ledger::{FeedbackRecord, FeedbackStats, NewTacitNote, TacitRecord};
use crate::merge::{MergeOptions, MergeReport};
use crate::search::{SearchQuery, SearchResponse};

/// Cloneable async handle to a shared [`TroubleSearch`].
#[derive(Clone, Debug)]
pub struct AsyncTroubleSearch {
    inner: Arc<TroubleSearch>,
}

impl From<TroubleSearch> for AsyncTroubleSearch {
    fn from(engine: TroubleSearch) -> Self {
        Self {
            inner: Arc::new(engine),
        }
    }
}

impl From<Arc<TroubleSearch>> for AsyncTroubleSearch {
    fn from(inner: Arc<TroubleSearch>) -> Self {
        Self { inner }
    }
}

fn join_failed(operation: &str, err: JoinError) -> TroubleSearchError {
    if err.is_panic() {
        std::panic::resume_unwind(err.into_panic());
    }
    TroubleSearchError::Io(std::io::Error::other(format!(
        "{operation} task cancelled: {err}"
    )))
}

impl AsyncTroubleSearch {
    /// Creates an engine with `config`.
    pub fn new(config: Config) -> Result<Self> {
        Ok(TroubleSearch::new(config)?.into())
    }

    /// The shared synchronous engine.
    pub fn engine(&self) -> &Arc<TroubleSearch> {
        &self.inner
    }

    /// Runs `f` on the blocking pool, bounded by `budget` when given.
    async fn run<T, F>(&self, operation: &'static str, budget: Option<Duration>, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&TroubleSearch) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let handle = task::spawn_blocking(move || f(&inner));
        let joined = match budget {
            Some(after) => match tokio::time::timeout(after, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(operation, ?after, "Blocking operation timed out");
                    return Err(TroubleSearchError::timeout(operation, after));
                }
            },
            None => handle.await,
        };
        joined.map_err(|e| join_failed(operation, e))?
    }

    /// Loads (or fetches from cache) the resources of `dir`.
    pub async fn resources(&self, dir: impl Into<PathBuf>) -> Result<Arc<ResourceBundle>> {
        let dir = dir.into();
        let budget = self.inner.config().load_timeout;
        self.run("loading resources", Some(budget), move |engine| {
            engine.resources(&dir)
        })
        .await
    }

    /// Searches the cases of `dir`.
    ///
    /// Loading counts against the load budget, the search itself against
    /// the search budget.
    pub async fn search_cases(
        &self,
        dir: impl Into<PathBuf>,
        query: SearchQuery,
    ) -> Result<SearchResponse> {
        let dir = dir.into();
        self.resources(dir.clone()).await?;
        let budget = self.inner.config().search_timeout;
        self.run("searching", Some(budget), move |engine| {
            engine.search_cases(&dir, &query)
        })
        .await
    }

    /// Appends a feedback record.
    pub async fn record_feedback(
        &self,
        path: impl Into<PathBuf>,
        record: FeedbackRecord,
    ) -> Result<()> {
        let path = path.into();
        let budget = self.inner.config().search_timeout;
        self.run("recording feedback", Some(budget), move |engine| {
            engine.record_feedback(&path, &record)
        })
        .await
    }

    /// Summarises a feedback ledger.
    pub async fn load_feedback_stats(&self, path: impl Into<PathBuf>) -> Result<FeedbackStats> {
        let path = path.into();
        let budget = self.inner.config().search_timeout;
        self.run("computing feedback stats", Some(budget), move |engine| {
            engine.load_feedback_stats(&path)
        })
        .await
    }

    /// Appends a tacit note and returns its id.
    pub async fn append_tacit(&self, path: impl Into<PathBuf>, note: NewTacitNote) -> Result<i64> {
        let path = path.into();
        let budget = self.inner.config().search_timeout;
        self.run("appending tacit note", Some(budget), move |engine| {
            engine.append_tacit(&path, &note)
        })
        .await
    }

    /// Updates the status of a tacit note.
    pub async fn update_tacit_status(
        &self,
        path: impl Into<PathBuf>,
        id: i64,
        status: impl Into<String>,
        approver: Option<String>,
    ) -> Result<bool> {
        let path = path.into();
        let status = status.into();
        let budget = self.inner.config().search_timeout;
        self.run("updating tacit status", Some(budget), move |engine| {
            engine.update_tacit_status(&path, id, &status, approver.as_deref())
        })
        .await
    }

    /// Approves a tacit note.
    pub async fn approve_tacit(
        &self,
        path: impl Into<PathBuf>,
        id: i64,
        approver: Option<String>,
    ) -> Result<bool> {
        let path = path.into();
        let budget = self.inner.config().search_timeout;
        self.run("approving tacit note", Some(budget), move |engine| {
            engine.approve_tacit(&path, id, approver.as_deref())
        })
        .await
    }

    /// Lists tacit notes.
    pub async fn list_tacit_knowledge(
        &self,
        path: impl Into<PathBuf>,
        status: Option<String>,
    ) -> Result<Vec<TacitRecord>> {
        let path = path.into();
        let budget = self.inner.config().search_timeout;
        self.run("listing tacit notes", Some(budget), move |engine| {
            engine.list_tacit_knowledge(&path, status.as_deref())
        })
        .await
    }

    /// Merges approved notes into `dir`.
    pub async fn merge_approved_notes(
        &self,
        dir: impl Into<PathBuf>,
        tacit_path: impl Into<PathBuf>,
        options: MergeOptions,
    ) -> Result<MergeReport> {
        let dir = dir.into();
        let tacit_path = tacit_path.into();
        let budget = self.inner.config().load_timeout;
        self.run("merging notes", Some(budget), move |engine| {
            engine.merge_approved_notes(&dir, &tacit_path, &options)
        })
        .await
    }

    /// Builds an index. Not time-bounded: embedding a large corpus can
    /// take far longer than any request budget.
    pub async fn build_index(&self, options: BuildOptions) -> Result<BuildReport> {
        self.run("building index", None, move |engine| engine.build_index(&options))
            .await
    }
}

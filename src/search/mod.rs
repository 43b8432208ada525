//! Hybrid case search.
//!
//! A search runs in fixed order:
//!
//! 1. metadata filter (no survivors ⇒ empty result, no model call)
//! 2. query embedding + vector search over the full index for `top_k`
//! 3. intersection with the filter survivors, keeping vector order
//! 4. TF-IDF re-rank fused with the vector scores
//! 5. materialisation of each row as a JSON object
//!
//! Filtering after a global top-k means a selective filter can leave few
//! or no hits even when matching cases exist further down the vector
//! ranking. There is no lexical-only fallback.

mod filter;
mod fusion;

pub use filter::MetadataFilter;
pub(crate) use filter::recency_threshold;
pub use fusion::{fuse, min_max_normalize};

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::bundle::ResourceBundle;
use crate::error::Result;

/// A case search request.
///
/// # Example
///
/// ```rust
/// use trouble_search::SearchQuery;
///
/// let query = SearchQuery::new("印刷ムラ")
///     .years(5)
///     .severity_range(Some(3.0), None)
///     .products(["PX-1"])
///     .top_k(50)
///     .alpha(0.3);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchQuery {
    /// Free-text query.
    pub text: String,

    /// Metadata filter applied before vector search.
    pub filter: MetadataFilter,

    /// Vector neighbours to request; engine default (30) when `None`.
    pub top_k: Option<usize>,

    /// Lexical weight in `[0, 1]` (clamped); engine default (0.5) when `None`.
    pub alpha: Option<f64>,
}

impl SearchQuery {
    /// Creates a query with no filters and default tuning.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Restricts to cases dated within the last `years` years (0 = off).
    pub fn years(mut self, years: u32) -> Self {
        self.filter.years = Some(years);
        self
    }

    /// Sets inclusive severity bounds.
    pub fn severity_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.filter.severity_min = min;
        self.filter.severity_max = max;
        self
    }

    /// Restricts to exact product names.
    pub fn products<I, S>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.products = products.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts to cases carrying any of these tags.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the vector neighbour count.
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Sets the lexical weight.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }
}

/// Search result envelope.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    /// Number of results.
    pub count: usize,
    /// Case records, most relevant first.
    pub results: Vec<Map<String, Value>>,
}

impl SearchResponse {
    fn from_results(results: Vec<Map<String, Value>>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

/// Resolves the tuning actually used by a search.
///
/// Malformed tuning never fails a search: `top_k == 0` or a NaN `alpha`
/// yields `None` (an empty result), and an `alpha` outside `[0, 1]` is
/// clamped. Each case is logged at WARN.
pub(crate) fn effective_tuning(top_k: usize, alpha: f64) -> Option<(usize, f64)> {
    if top_k == 0 {
        warn!("top_k is 0; returning no results");
        return None;
    }
    if alpha.is_nan() {
        warn!("alpha is NaN; returning no results");
        return None;
    }
    let clamped = alpha.clamp(0.0, 1.0);
    if clamped != alpha {
        warn!(alpha, clamped, "alpha outside [0, 1]; clamped");
    }
    Some((top_k, clamped))
}

/// Runs a full search against a loaded bundle.
pub(crate) fn execute(
    bundle: &ResourceBundle,
    query: &SearchQuery,
    top_k: usize,
    alpha: f64,
    today: NaiveDate,
) -> Result<SearchResponse> {
    let Some((top_k, alpha)) = effective_tuning(top_k, alpha) else {
        return Ok(SearchResponse::default());
    };

    let survivors = bundle.filter_rows(&query.filter, today);
    debug!(
        survivors = survivors.len(),
        rows = bundle.table().len(),
        "Metadata filter applied"
    );
    if survivors.is_empty() {
        return Ok(SearchResponse::default());
    }

    let hits = bundle.vector_search(&query.text, top_k)?;
    let allowed: HashSet<usize> = survivors.into_iter().collect();
    let (rows, vector_scores): (Vec<usize>, Vec<f64>) = hits
        .into_iter()
        .filter(|(row, _)| allowed.contains(row))
        .unzip();
    debug!(hits = rows.len(), top_k, "Vector hits after filter");
    if rows.is_empty() {
        return Ok(SearchResponse::default());
    }

    let ranked = bundle.rerank(&query.text, &rows, Some(vector_scores.as_slice()), alpha)?;
    let results = ranked
        .into_iter()
        .map(|row| bundle.table().row_json(row))
        .collect();
    Ok(SearchResponse::from_results(results))
}

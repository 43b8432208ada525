//! Metadata filtering for case search.
//!
//! [`MetadataFilter`] selects the rows that may appear in a search
//! result. It runs before any embedding work, so a filter that matches
//! nothing costs no model call.

use std::collections::HashSet;

use chrono::{Days, NaiveDate};

use crate::config::IndexConfig;
use crate::storage::CaseTable;
use crate::types::{Cell, Severity};

/// Filter criteria for case search.
///
/// All criteria are conjunctive. Unset criteria do not filter.
///
/// # Example
///
/// ```rust
/// use trouble_search::MetadataFilter;
///
/// // Cases from the last 3 years with severity 3 or above
/// let filter = MetadataFilter {
///     years: Some(3),
///     severity_min: Some(3.0),
///     ..MetadataFilter::default()
/// };
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataFilter {
    /// Keep cases dated within the last `years * 365` days.
    ///
    /// `None` or `Some(0)` disables the filter. When active, cases with a
    /// missing or unparsable date are excluded.
    pub years: Option<u32>,

    /// Lower severity bound (inclusive). Unknown severity always passes.
    pub severity_min: Option<f64>,

    /// Upper severity bound (inclusive). Unknown severity always passes.
    pub severity_max: Option<f64>,

    /// Exact product names. Empty means no product filtering.
    pub products: Vec<String>,

    /// Tags, any of which must be present. Empty means no tag filtering.
    pub tags: Vec<String>,
}

impl MetadataFilter {
    /// Returns true if no criterion is set.
    pub fn is_empty(&self) -> bool {
        self.years.unwrap_or(0) == 0
            && self.severity_min.is_none()
            && self.severity_max.is_none()
            && self.products.is_empty()
            && self.tags.is_empty()
    }

    /// Returns the ascending row positions that pass every criterion.
    ///
    /// `today` anchors the recency window.
    pub fn apply(&self, table: &CaseTable, config: &IndexConfig, today: NaiveDate) -> Vec<usize> {
        let threshold = self
            .years
            .filter(|&y| y > 0)
            .map(|y| recency_threshold(today, y));
        let products: HashSet<&str> = self.products.iter().map(String::as_str).collect();
        let tags: HashSet<&str> = self.tags.iter().map(String::as_str).collect();

        let dates = table.column(&config.date_col);
        let severities = table.column(&config.severity_col);
        let product_cells = table.column(&config.product_col);
        let tag_cells = table.column(&config.tags_col);

        (0..table.len())
            .filter(|&row| {
                if let Some(threshold) = threshold {
                    let date = dates.and_then(|c| c.get(row)).and_then(Cell::as_date);
                    if !date.is_some_and(|d| d >= threshold) {
                        return false;
                    }
                }

                if self.severity_min.is_some() || self.severity_max.is_some() {
                    let severity = severities
                        .and_then(|c| c.get(row))
                        .map_or(Severity::Unknown, Severity::from_cell);
                    if !self.severity_in_range(severity) {
                        return false;
                    }
                }

                if !products.is_empty() {
                    let cell = product_cells.and_then(|c| c.get(row));
                    if !cell.is_some_and(|c| matches_product(c, &products)) {
                        return false;
                    }
                }

                if !tags.is_empty() {
                    let cell = tag_cells.and_then(|c| c.get(row));
                    if !cell.is_some_and(|c| matches_tags(c, &tags)) {
                        return false;
                    }
                }

                true
            })
            .collect()
    }

    fn severity_in_range(&self, severity: Severity) -> bool {
        let Some(value) = severity.value() else {
            return true;
        };
        self.severity_min.is_none_or(|min| value >= min)
            && self.severity_max.is_none_or(|max| value <= max)
    }
}

/// `today - years * 365 days`, saturating at the earliest date.
pub(crate) fn recency_threshold(today: NaiveDate, years: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(365 * u64::from(years)))
        .unwrap_or(NaiveDate::MIN)
}

fn matches_product(cell: &Cell, products: &HashSet<&str>) -> bool {
    cell.as_text().is_some_and(|p| products.contains(p))
}

/// Text tags are comma-separated; list tags are matched element-wise.
fn matches_tags(cell: &Cell, tags: &HashSet<&str>) -> bool {
    match cell {
        Cell::Text(s) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .any(|t| tags.contains(t)),
        Cell::List(items) => items.iter().any(|t| tags.contains(t.trim())),
        _ => false,
    }
}

//! Search feedback ledger.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, instrument};

use super::{format_bool, format_timestamp, read_ledger, with_ledger_lock, write_ledger, LedgerTable};
use crate::error::Result;

/// Base header of the feedback ledger, in order.
pub const FEEDBACK_COLUMNS: [&str; 5] = ["timestamp", "query", "case_id", "helpful", "solve_hours"];

/// One judgment of a search result.
///
/// # Example
///
/// ```rust
/// use trouble_search::ledger::FeedbackRecord;
///
/// let record = FeedbackRecord::new("印刷ムラ", "1042", true)
///     .solve_hours(1.5)
///     .extra("user", "tanaka");
/// assert_eq!(record.case_id, "1042");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackRecord {
    /// When the judgment was made; `None` means "now" at write time.
    pub timestamp: Option<NaiveDateTime>,
    /// The query that produced the result.
    pub query: String,
    /// Case id the judgment is about. Not checked against any index.
    pub case_id: String,
    /// Whether the case helped.
    pub helpful: bool,
    /// Hours it took to solve, if reported.
    pub solve_hours: Option<f64>,
    /// Extra columns. A key equal to a base column overrides it.
    pub extra: BTreeMap<String, String>,
}

impl FeedbackRecord {
    /// Creates a record stamped at write time.
    pub fn new(query: impl Into<String>, case_id: impl Into<String>, helpful: bool) -> Self {
        Self {
            timestamp: None,
            query: query.into(),
            case_id: case_id.into(),
            helpful,
            solve_hours: None,
            extra: BTreeMap::new(),
        }
    }

    /// Sets the solve time.
    pub fn solve_hours(mut self, hours: f64) -> Self {
        self.solve_hours = Some(hours);
        self
    }

    /// Sets an explicit timestamp.
    pub fn timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Adds an extra column.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    fn to_pairs(&self) -> Vec<(String, String)> {
        let timestamp = self.timestamp.unwrap_or_else(|| Local::now().naive_local());
        let mut pairs = vec![
            ("timestamp".to_string(), format_timestamp(timestamp)),
            ("query".to_string(), self.query.clone()),
            ("case_id".to_string(), self.case_id.clone()),
            ("helpful".to_string(), format_bool(self.helpful).to_string()),
            (
                "solve_hours".to_string(),
                self.solve_hours.map(|h| h.to_string()).unwrap_or_default(),
            ),
        ];
        pairs.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }
}

/// Appends one feedback record, creating the ledger with its header if
/// needed. No dedup.
#[instrument(skip(record), fields(path = %path.display(), case_id = %record.case_id))]
pub fn record_feedback(path: &Path, record: &FeedbackRecord) -> Result<()> {
    with_ledger_lock(path, || {
        let mut table = match read_ledger(path)? {
            Some(t) if !t.headers.is_empty() => t,
            _ => LedgerTable::with_headers(FEEDBACK_COLUMNS),
        };
        table.push_record(&record.to_pairs());
        write_ledger(path, &table)?;
        debug!(rows = table.len(), helpful = record.helpful, "Feedback recorded");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_micro_opt(9, 30, 0, 123_456)
            .unwrap()
    }

    #[test]
    fn test_creates_ledger_with_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fb").join("feedback.csv");
        record_feedback(&path, &FeedbackRecord::new("q", "7", true).timestamp(ts())).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let mut lines = raw.lines();
        assert_eq!(lines.next(), Some("timestamp,query,case_id,helpful,solve_hours"));
        assert_eq!(lines.next(), Some("2024-05-01T09:30:00.123456,q,7,True,"));
    }

    #[test]
    fn test_appends_without_dedup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feedback.csv");
        let record = FeedbackRecord::new("q", "7", false).solve_hours(2.5);
        record_feedback(&path, &record).unwrap();
        record_feedback(&path, &record).unwrap();

        let table = read_ledger(&path).unwrap().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(1, "helpful"), Some("False"));
        assert_eq!(table.value(1, "solve_hours"), Some("2.5"));
    }

    #[test]
    fn test_extra_extends_header_and_overrides_base() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feedback.csv");
        record_feedback(&path, &FeedbackRecord::new("q", "1", true)).unwrap();
        record_feedback(
            &path,
            &FeedbackRecord::new("q", "2", true)
                .extra("user", "sato")
                .extra("query", "overridden"),
        )
        .unwrap();

        let table = read_ledger(&path).unwrap().unwrap();
        assert_eq!(table.headers.last().map(String::as_str), Some("user"));
        assert_eq!(table.value(0, "user"), Some(""));
        assert_eq!(table.value(1, "user"), Some("sato"));
        assert_eq!(table.value(1, "query"), Some("overridden"));
    }
}

//! Feedback statistics for the analysis view.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use super::{parse_bool, parse_number, read_ledger};
use crate::error::Result;
use crate::types::parse_datetime;

/// Helpful rate of one calendar day.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyHelpfulRate {
    /// Day (serialised as `YYYY-MM-DD`).
    pub date: NaiveDate,
    /// Mean of `helpful` over that day's records.
    pub helpful_rate: f64,
}

/// Summary of the feedback ledger.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FeedbackStats {
    /// Number of records.
    pub count: usize,
    /// Overall mean of `helpful`.
    pub helpful_rate: Option<f64>,
    /// Mean of the numeric `solve_hours` values.
    pub avg_solve_hours: Option<f64>,
    /// Per-day helpful rate, ascending by date.
    pub daily_helpful_rate: Vec<DailyHelpfulRate>,
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Summarises the feedback ledger at `path`.
///
/// A missing or empty ledger yields the zero summary. Rows whose
/// `helpful` or `timestamp` does not parse are left out of the
/// corresponding means.
pub fn load_feedback_stats(path: &Path) -> Result<FeedbackStats> {
    let table = match read_ledger(path)? {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(FeedbackStats::default()),
    };

    let helpful: Vec<Option<bool>> = (0..table.len())
        .map(|row| table.value(row, "helpful").and_then(parse_bool))
        .collect();

    let helpful_rate = mean(
        helpful
            .iter()
            .flatten()
            .map(|&h| if h { 1.0 } else { 0.0 }),
    );

    let avg_solve_hours = mean(
        (0..table.len()).filter_map(|row| table.value(row, "solve_hours").and_then(parse_number)),
    );

    let mut per_day: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for (row, flag) in helpful.iter().enumerate() {
        let Some(flag) = flag else { continue };
        let Some(ts) = table.value(row, "timestamp").and_then(parse_datetime) else {
            continue;
        };
        let entry = per_day.entry(ts.date()).or_default();
        entry.0 += if *flag { 1.0 } else { 0.0 };
        entry.1 += 1;
    }
    let daily_helpful_rate = per_day
        .into_iter()
        .map(|(date, (sum, n))| DailyHelpfulRate {
            date,
            helpful_rate: sum / n as f64,
        })
        .collect();

    debug!(path = %path.display(), count = table.len(), "Feedback stats computed");
    Ok(FeedbackStats {
        count: table.len(),
        helpful_rate,
        avg_solve_hours,
        daily_helpful_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_missing_and_empty_give_zero_summary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feedback.csv");
        let zero = load_feedback_stats(&path).unwrap();
        assert_eq!(zero, FeedbackStats::default());

        fs::write(&path, "timestamp,query,case_id,helpful,solve_hours\n").unwrap();
        assert_eq!(load_feedback_stats(&path).unwrap(), zero);

        let json = serde_json::to_value(&zero).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "count": 0,
                "helpful_rate": null,
                "avg_solve_hours": null,
                "daily_helpful_rate": []
            })
        );
    }

    #[test]
    fn test_rates_and_daily_rollup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feedback.csv");
        fs::write(
            &path,
            "timestamp,query,case_id,helpful,solve_hours\n\
             2024-05-02T10:00:00.000000,q,1,True,2\n\
             2024-05-01T09:00:00.000000,q,2,False,\n\
             2024-05-01T11:00:00.000000,q,3,True,abc\n\
             garbage,q,4,True,4\n",
        )
        .unwrap();

        let stats = load_feedback_stats(&path).unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.helpful_rate, Some(0.75));
        assert_eq!(stats.avg_solve_hours, Some(3.0));
        assert_eq!(stats.daily_helpful_rate.len(), 2);
        assert_eq!(
            stats.daily_helpful_rate[0].date,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
        assert_eq!(stats.daily_helpful_rate[0].helpful_rate, 0.5);
        assert_eq!(stats.daily_helpful_rate[1].helpful_rate, 1.0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["daily_helpful_rate"][0]["date"], "2024-05-01");
    }
}

//! Feedback and tacit knowledge ledgers through the engine, including
//! concurrent writers.

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::tempdir;
use trouble_search::ledger::{read_ledger, APPROVED_STATUS, PENDING_STATUS};
use trouble_search::{Config, FeedbackRecord, FeedbackStats, NewTacitNote, TroubleSearch};

fn engine() -> TroubleSearch {
    TroubleSearch::new(Config::default()).unwrap()
}

#[test]
fn test_feedback_roundtrip_into_stats() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data").join("search_feedback.csv");
    let engine = engine();

    assert_eq!(
        engine.load_feedback_stats(&path).unwrap(),
        FeedbackStats::default()
    );

    let day = |d: u32, h: u32| {
        NaiveDate::from_ymd_opt(2024, 7, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    };
    for (ts, helpful, hours) in [
        (day(2, 9), true, Some(1.0)),
        (day(1, 9), true, None),
        (day(1, 15), false, Some(3.0)),
    ] {
        let mut record = FeedbackRecord::new("jam", "2", helpful).timestamp(ts);
        record.solve_hours = hours;
        engine.record_feedback(&path, &record).unwrap();
    }

    let stats = engine.load_feedback_stats(&path).unwrap();
    assert_eq!(stats.count, 3);
    assert!((stats.helpful_rate.unwrap() - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(stats.avg_solve_hours, Some(2.0));
    let daily: Vec<(String, f64)> = stats
        .daily_helpful_rate
        .iter()
        .map(|d| (d.date.to_string(), d.helpful_rate))
        .collect();
    assert_eq!(
        daily,
        vec![("2024-07-01".to_string(), 0.5), ("2024-07-02".to_string(), 1.0)]
    );
}

#[test]
fn test_unreadable_feedback_ledger_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("feedback.csv");
    fs::write(&path, "timestamp,query,case_id,helpful,solve_hours\na,b\n").unwrap();

    let engine = engine();
    assert!(engine.load_feedback_stats(&path).unwrap_err().is_ledger());
    assert!(engine
        .record_feedback(&path, &FeedbackRecord::new("q", "1", true))
        .unwrap_err()
        .is_ledger());
}

#[test]
fn test_tacit_workflow() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tacit_knowledge.csv");
    let engine = engine();

    let ids: Vec<i64> = ["a", "b", "c"]
        .iter()
        .map(|n| {
            engine
                .append_tacit(&path, &NewTacitNote::new("7", *n).category("tip"))
                .unwrap()
        })
        .collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    assert!(engine.approve_tacit(&path, ids[1], Some("chief")).unwrap());
    assert!(engine
        .update_tacit_status(&path, ids[2], "rejected", None)
        .unwrap());

    let pending = engine
        .list_tacit_knowledge(&path, Some(PENDING_STATUS))
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].note.as_deref(), Some("a"));

    let approved = engine
        .list_tacit_knowledge(&path, Some(APPROVED_STATUS))
        .unwrap();
    assert_eq!(approved[0].id, Some(ids[1]));
    assert_eq!(approved[0].approver.as_deref(), Some("chief"));
    assert_eq!(approved[0].category.as_deref(), Some("tip"));

    let json = serde_json::to_value(&approved[0]).unwrap();
    assert_eq!(json["status"], "approved");
}

#[test]
fn test_update_unknown_id_changes_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tacit.csv");
    let engine = engine();
    engine
        .append_tacit(&path, &NewTacitNote::new("1", "note"))
        .unwrap();
    let before = fs::read(&path).unwrap();

    assert!(!engine
        .update_tacit_status(&path, 99, APPROVED_STATUS, Some("x"))
        .unwrap());
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_concurrent_tacit_appends_get_unique_ids() {
    let dir = tempdir().unwrap();
    let path = Arc::new(dir.path().join("tacit.csv"));
    let engine = Arc::new(engine());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let path = Arc::clone(&path);
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                (0..10)
                    .map(|i| {
                        engine
                            .append_tacit(
                                path.as_path(),
                                &NewTacitNote::new(t.to_string(), format!("note {t}-{i}")),
                            )
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let ids: BTreeSet<i64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(ids, (0..80).collect::<BTreeSet<i64>>());
    assert_eq!(read_ledger(&path).unwrap().unwrap().len(), 80);
}

#[test]
fn test_concurrent_feedback_appends_lose_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("feedback.csv");
    let engine = engine();

    std::thread::scope(|s| {
        for t in 0..4 {
            let (engine, path) = (&engine, &path);
            s.spawn(move || {
                for i in 0..15 {
                    let record = FeedbackRecord::new(format!("q{t}"), i.to_string(), i % 2 == 0);
                    engine.record_feedback(path, &record).unwrap();
                }
            });
        }
    });

    assert_eq!(engine.load_feedback_stats(&path).unwrap().count, 60);
}

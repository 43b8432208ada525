//! Async facade: results match the sync engine, budgets are enforced.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fixture, fixture_with, ids, HashEmbedder};
use trouble_search::{
    AsyncTroubleSearch, Config, MergeOptions, NewTacitNote, SearchQuery, TroubleSearch,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_search_matches_sync() {
    let f = fixture();
    let sync = f
        .engine
        .search_cases(&f.index, &SearchQuery::new("paper jam"))
        .unwrap();

    let engine = AsyncTroubleSearch::from(f.engine);
    let response = engine
        .search_cases(f.index.clone(), SearchQuery::new("paper jam"))
        .await
        .unwrap();
    assert_eq!(response, sync);
    assert_eq!(ids(&response)[0], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_bundle_is_shared_with_engine() {
    let f = fixture();
    let index = f.index.clone();
    let engine = AsyncTroubleSearch::from(Arc::new(f.engine));

    let a = engine.resources(index.clone()).await.unwrap();
    let b = engine.engine().resources(&index).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_search_times_out() {
    let f = fixture_with(
        Arc::new(HashEmbedder::slow(Duration::from_millis(500))),
        Config {
            search_timeout: Duration::from_millis(50),
            ..Default::default()
        },
    );
    let engine = AsyncTroubleSearch::from(f.engine);

    let err = engine
        .search_cases(f.index.clone(), SearchQuery::new("ink"))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_tacit_and_merge() {
    let f = fixture();
    let ledger = f.ledger("tacit.csv");
    let index = f.index.clone();
    let engine = AsyncTroubleSearch::from(f.engine);

    let id = engine
        .append_tacit(ledger.clone(), NewTacitNote::new("3", "check fan"))
        .await
        .unwrap();
    assert!(engine
        .approve_tacit(ledger.clone(), id, Some("lead".into()))
        .await
        .unwrap());
    let listed = engine
        .list_tacit_knowledge(ledger.clone(), Some("approved".into()))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let report = engine
        .merge_approved_notes(index.clone(), ledger, MergeOptions::default())
        .await
        .unwrap();
    assert_eq!(report.rows_updated, 1);

    let response = engine
        .search_cases(index, SearchQuery::new("check fan").alpha(1.0))
        .await
        .unwrap();
    assert_eq!(ids(&response)[0], 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let engine = AsyncTroubleSearch::from(
        TroubleSearch::new(Config::with_embedding_service(Arc::new(HashEmbedder::new())))
            .unwrap(),
    );
    let err = engine
        .search_cases(dir.path().join("nope"), SearchQuery::new("x"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

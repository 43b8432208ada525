//! Resource cache identity, invalidation and the approved-notes merge.

mod common;

use std::fs;
use std::sync::Arc;

use common::{fixture, ids};
use serde_json::Value;
use trouble_search::storage::{MetadataStore, RedbStorage, METADATA_FILE_NAME};
use trouble_search::vector::{VectorFile, VECTOR_FILE_NAME};
use trouble_search::{
    MergeOptions, NewTacitNote, NotFoundError, SearchQuery, StorageError, TroubleSearchError,
    CONFIG_FILE_NAME,
};

#[test]
fn test_repeated_loads_share_one_bundle() {
    let f = fixture();
    let a = f.engine.resources(&f.index).unwrap();
    let b = f.engine.resources(&f.index).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    // Same directory through a different spelling
    let dotted = f.index.join("..").join("index");
    let c = f.engine.resources(&dotted).unwrap();
    assert!(Arc::ptr_eq(&a, &c));
}

#[test]
fn test_invalidate_forces_reload() {
    let f = fixture();
    let a = f.engine.resources(&f.index).unwrap();
    assert!(f.engine.invalidate(&f.index).unwrap());
    assert!(!f.engine.cache().is_cached(&f.index));

    let b = f.engine.resources(&f.index).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(f.engine.cache().generation(&f.index).unwrap(), 2);

    f.engine.clear().unwrap();
    assert!(!f.engine.cache().is_cached(&f.index));
}

#[test]
fn test_concurrent_first_access_loads_once() {
    let f = fixture();
    let bundles: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| f.engine.resources(&f.index).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(bundles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[test]
fn test_missing_files_are_named() {
    let f = fixture();

    fs::rename(f.index.join(VECTOR_FILE_NAME), f.index.join("moved")).unwrap();
    let err = f.engine.resources(&f.index).unwrap_err();
    assert!(matches!(
        err,
        TroubleSearchError::NotFound(NotFoundError::Index(_))
    ));
    fs::rename(f.index.join("moved"), f.index.join(VECTOR_FILE_NAME)).unwrap();

    fs::rename(f.index.join(METADATA_FILE_NAME), f.index.join("moved")).unwrap();
    let err = f.engine.resources(&f.index).unwrap_err();
    assert!(matches!(
        err,
        TroubleSearchError::NotFound(NotFoundError::Metadata(_))
    ));
    fs::rename(f.index.join("moved"), f.index.join(METADATA_FILE_NAME)).unwrap();

    fs::remove_file(f.index.join(CONFIG_FILE_NAME)).unwrap();
    let err = f.engine.resources(&f.index).unwrap_err();
    assert!(matches!(
        err,
        TroubleSearchError::NotFound(NotFoundError::Config(_))
    ));
    assert!(!f.engine.cache().is_cached(&f.index));
}

#[test]
fn test_row_count_mismatch_is_storage_error() {
    let f = fixture();
    let mut vectors = VectorFile::load(&f.index).unwrap();
    vectors.vectors.pop();
    vectors.save(&f.index).unwrap();

    let err = f.engine.resources(&f.index).unwrap_err();
    assert!(matches!(
        err,
        TroubleSearchError::Storage(StorageError::RowCountMismatch { vectors: 3, rows: 4 })
    ));
}

#[test]
fn test_merge_updates_search_results_and_invalidates() {
    let f = fixture();
    let ledger = f.ledger("tacit_knowledge.csv");
    let before = f.engine.resources(&f.index).unwrap();

    let first = f
        .engine
        .append_tacit(&ledger, &NewTacitNote::new("2", "A").author("ops"))
        .unwrap();
    let second = f
        .engine
        .append_tacit(&ledger, &NewTacitNote::new("2", "B"))
        .unwrap();
    f.engine
        .append_tacit(&ledger, &NewTacitNote::new("1", "still pending"))
        .unwrap();
    assert!(f.engine.approve_tacit(&ledger, first, Some("lead")).unwrap());
    assert!(f.engine.approve_tacit(&ledger, second, None).unwrap());

    let report = f
        .engine
        .merge_approved_notes(&f.index, &ledger, &MergeOptions::default())
        .unwrap();
    assert_eq!(report.notes_read, 2);
    assert_eq!(report.rows_updated, 1);
    assert!(!f.engine.cache().is_cached(&f.index));

    // The old snapshot is untouched
    assert_eq!(
        before
            .table()
            .cell(1, "tacit_notes")
            .map(|c| c.is_null()),
        Some(true)
    );

    let response = f
        .engine
        .search_cases(&f.index, &SearchQuery::new("paper jam").tags(["jam"]))
        .unwrap();
    assert_eq!(ids(&response), vec![2]);
    assert_eq!(
        response.results[0]["tacit_notes"],
        Value::from("A\n\n---\n\nB")
    );

    let after = f.engine.resources(&f.index).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
}

#[test]
fn test_merge_twice_appends_twice() {
    let f = fixture();
    let ledger = f.ledger("tacit.csv");
    let id = f
        .engine
        .append_tacit(&ledger, &NewTacitNote::new("4", "wipe glass daily"))
        .unwrap();
    f.engine.approve_tacit(&ledger, id, None).unwrap();

    f.engine
        .merge_approved_notes(&f.index, &ledger, &MergeOptions::default())
        .unwrap();
    f.engine
        .merge_approved_notes(&f.index, &ledger, &MergeOptions::default())
        .unwrap();

    let table = RedbStorage::open(f.index.join(METADATA_FILE_NAME))
        .unwrap()
        .read_table()
        .unwrap();
    assert_eq!(
        table.cell(3, "tacit_notes").map(|c| c.to_plain_string()),
        Some("wipe glass daily\n\n---\n\nwipe glass daily".to_string())
    );
}

#[test]
fn test_merged_notes_feed_lexical_ranking() {
    let f = fixture();
    let ledger = f.ledger("tacit.csv");
    let id = f
        .engine
        .append_tacit(&ledger, &NewTacitNote::new("4", "calibrate densitometer"))
        .unwrap();
    f.engine.approve_tacit(&ledger, id, None).unwrap();
    f.engine
        .merge_approved_notes(&f.index, &ledger, &MergeOptions::default())
        .unwrap();

    let response = f
        .engine
        .search_cases(&f.index, &SearchQuery::new("densitometer").alpha(1.0))
        .unwrap();
    assert_eq!(ids(&response)[0], 4);
}

#[test]
fn test_merge_missing_ledger_is_not_found() {
    let f = fixture();
    let err = f
        .engine
        .merge_approved_notes(&f.index, f.ledger("absent.csv"), &MergeOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        TroubleSearchError::NotFound(NotFoundError::Ledger(_))
    ));
}

#![no_main]

use libfuzzer_sys::fuzz_target;
use trouble_search::ledger::{list_tacit_knowledge, load_feedback_stats};

fuzz_target!(|data: &[u8]| {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.csv");
    std::fs::write(&path, data).unwrap();

    // Malformed input is an error, never a panic
    if let Ok(stats) = load_feedback_stats(&path) {
        if let Some(rate) = stats.helpful_rate {
            assert!((0.0..=1.0).contains(&rate));
        }
    }
    let _ = list_tacit_knowledge(&path, None);
});

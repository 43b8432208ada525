#![no_main]

use libfuzzer_sys::fuzz_target;
use trouble_search::{parse_date, parse_datetime, Cell, Severity};

fuzz_target!(|data: &str| {
    let _ = parse_date(data);
    let _ = parse_datetime(data);

    // Parsed severities are finite or explicitly unknown
    if let Severity::Known(v) = Severity::from_label(data) {
        assert!(v.is_finite());
    }

    let cell = Cell::Text(data.to_string());
    if let Some(key) = cell.case_key() {
        assert!(!key.is_empty());
    }
    let _ = cell.to_json();
});

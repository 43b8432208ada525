#![no_main]

use libfuzzer_sys::fuzz_target;
use trouble_search::lexical::TfidfModel;
use trouble_search::search::{fuse, min_max_normalize};

fuzz_target!(|docs: Vec<String>| {
    if docs.is_empty() {
        return;
    }
    let (model, matrix) = TfidfModel::fit_transform(&docs);
    let rows: Vec<usize> = (0..matrix.len()).collect();
    let q = model.transform(&docs[0]);
    let scores = matrix.score_rows(&q, &rows);

    for s in &scores {
        assert!(s.is_finite());
    }
    for v in min_max_normalize(&scores) {
        assert!((0.0..=1.0).contains(&v));
    }

    let mut order = fuse(None, &scores, 0.5);
    order.sort_unstable();
    assert_eq!(order, rows);
});

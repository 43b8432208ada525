//! TF-IDF lexical scorer.
//!
//! The model is fitted once per bundle over the concatenated free-text
//! columns of every row. Weighting follows the common defaults:
//!
//! - tokens are runs of two or more word characters (Unicode letters,
//!   digits, `_`), lowercased
//! - smoothed idf: `ln((1 + n) / (1 + df)) + 1`
//! - raw term counts times idf, each row L2-normalised
//!
//! A query is scored against a row by the dot product of their vectors,
//! which is the cosine similarity since both are unit length.

use std::collections::HashMap;

use crate::storage::CaseTable;
use crate::types::Cell;

/// Sparse vector: `(term index, weight)` sorted by term index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(usize, f64)>,
}

impl SparseVector {
    /// Builds from unsorted entries.
    fn from_unsorted(mut entries: Vec<(usize, f64)>) -> Self {
        entries.sort_by_key(|(i, _)| *i);
        Self { entries }
    }

    /// Non-zero entries.
    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    /// Returns true if every weight is zero.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dot product (merge over sorted indices).
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (a, wa) = self.entries[i];
            let (b, wb) = other.entries[j];
            match a.cmp(&b) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += wa * wb;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Splits text into lowercase tokens of at least two word characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().nth(1).is_some())
        .map(str::to_lowercase)
        .collect()
}

/// Fitted vocabulary and idf weights.
#[derive(Clone, Debug, Default)]
pub struct TfidfModel {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfModel {
    /// Fits the model and transforms the corpus in one pass.
    pub fn fit_transform<S: AsRef<str>>(docs: &[S]) -> (Self, TfidfMatrix) {
        let tokenized: Vec<Vec<String>> = docs.iter().map(|d| tokenize(d.as_ref())).collect();

        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut df: Vec<usize> = Vec::new();
        for tokens in &tokenized {
            let mut seen: Vec<usize> = Vec::new();
            for token in tokens {
                let next = vocabulary.len();
                let idx = *vocabulary.entry(token.clone()).or_insert(next);
                if idx == df.len() {
                    df.push(0);
                }
                seen.push(idx);
            }
            seen.sort_unstable();
            seen.dedup();
            for idx in seen {
                df[idx] += 1;
            }
        }

        let n = docs.len() as f64;
        let idf = df
            .iter()
            .map(|&d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
            .collect();

        let model = Self { vocabulary, idf };
        let rows = tokenized.iter().map(|t| model.weigh(t)).collect();
        (model, TfidfMatrix { rows })
    }

    /// Number of distinct terms.
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Vectorises a text; out-of-vocabulary tokens are ignored.
    pub fn transform(&self, text: &str) -> SparseVector {
        self.weigh(&tokenize(text))
    }

    fn weigh(&self, tokens: &[String]) -> SparseVector {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for token in tokens {
            if let Some(&idx) = self.vocabulary.get(token) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let mut entries: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx]))
            .collect();
        let norm = entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, w) in &mut entries {
                *w /= norm;
            }
        }
        SparseVector::from_unsorted(entries)
    }
}

/// One sparse TF-IDF row per corpus document.
#[derive(Clone, Debug, Default)]
pub struct TfidfMatrix {
    rows: Vec<SparseVector>,
}

impl TfidfMatrix {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row vector.
    pub fn row(&self, i: usize) -> Option<&SparseVector> {
        self.rows.get(i)
    }

    /// Scores `query` against the given rows, in the given order.
    /// Rows out of range score 0.
    pub fn score_rows(&self, query: &SparseVector, rows: &[usize]) -> Vec<f64> {
        rows.iter()
            .map(|&r| self.rows.get(r).map_or(0.0, |row| row.dot(query)))
            .collect()
    }
}

/// Lexical document text per row: the text cells of `text_cols`, in column
/// order, joined with a single space. Non-text and missing cells are skipped.
pub fn corpus_texts(table: &CaseTable, text_cols: &[String]) -> Vec<String> {
    let columns: Vec<&[Cell]> = text_cols
        .iter()
        .filter_map(|c| table.column(c))
        .collect();

    (0..table.len())
        .map(|row| {
            columns
                .iter()
                .filter_map(|cells| cells.get(row).and_then(Cell::as_text))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_rules() {
        assert_eq!(
            tokenize("Paper JAM, jam! a x_1 3.14"),
            vec!["paper", "jam", "jam", "x_1", "14"]
        );
        assert_eq!(tokenize("印刷ムラ 発生"), vec!["印刷ムラ", "発生"]);
        assert!(tokenize("a b c").is_empty());
    }

    #[test]
    fn test_idf_smoothing() {
        let (model, _) = TfidfModel::fit_transform(&["ink blot", "ink smear", "paper"]);
        assert_eq!(model.vocabulary_len(), 4);
        let ink = model.vocabulary["ink"];
        let paper = model.vocabulary["paper"];
        assert!((model.idf[ink] - ((4.0f64 / 3.0).ln() + 1.0)).abs() < 1e-12);
        assert!((model.idf[paper] - (2.0f64.ln() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_rows_are_unit_length() {
        let (_, matrix) = TfidfModel::fit_transform(&["ink ink blot", "paper jam jam jam"]);
        for i in 0..matrix.len() {
            let row = matrix.row(i).unwrap();
            let norm: f64 = row.entries().iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_scores_prefer_matching_rows() {
        let docs = ["toner leak on drum", "paper jam in tray", "drum noise"];
        let (model, matrix) = TfidfModel::fit_transform(&docs);
        let q = model.transform("drum toner");
        let scores = matrix.score_rows(&q, &[0, 1, 2]);
        assert!(scores[0] > scores[2]);
        assert!(scores[2] > scores[1]);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn test_oov_query_is_empty() {
        let (model, matrix) = TfidfModel::fit_transform(&["alpha beta"]);
        let q = model.transform("gamma");
        assert!(q.is_empty());
        assert_eq!(matrix.score_rows(&q, &[0]), vec![0.0]);
    }

    #[test]
    fn test_empty_corpus() {
        let docs: [&str; 0] = [];
        let (model, matrix) = TfidfModel::fit_transform(&docs);
        assert_eq!(model.vocabulary_len(), 0);
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_corpus_texts_skips_non_text() {
        let table = CaseTable::from_columns(vec![
            (
                "title".into(),
                vec![Cell::Text("jam".into()), Cell::Null],
            ),
            (
                "summary".into(),
                vec![Cell::Int(5), Cell::Text("leak".into())],
            ),
            (
                "tacit_notes".into(),
                vec![Cell::Text("check roller".into()), Cell::Null],
            ),
        ])
        .unwrap();
        let texts = corpus_texts(
            &table,
            &["title".into(), "summary".into(), "tacit_notes".into()],
        );
        assert_eq!(texts, vec!["jam check roller", "leak"]);
    }
}

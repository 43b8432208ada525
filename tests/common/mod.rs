//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Days, Local, NaiveDate};
use tempfile::TempDir;

use trouble_search::embedding::EmbeddingService;
use trouble_search::lexical::tokenize;
use trouble_search::{BuildOptions, Config, Embedding, Result, TroubleSearch};

/// Dimension of the test embedder.
pub const DIM: usize = 32;

/// Bag-of-hashed-tokens embedder: deterministic, no model files, and texts
/// sharing words land close together.
///
/// Counts calls and records every framed text it receives.
pub struct HashEmbedder {
    dim: usize,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::with_dimension(DIM)
    }

    pub fn with_dimension(dim: usize) -> Self {
        Self {
            dim,
            delay: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Sleeps before every single-text (query) embedding.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    /// Number of `embed`/`embed_batch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every text received so far, in order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    fn vector(&self, text: &str) -> Embedding {
        let body = text
            .strip_prefix("query: ")
            .or_else(|| text.strip_prefix("passage: "))
            .unwrap_or(text);
        let mut v = vec![0.0f32; self.dim];
        for token in tokenize(body) {
            let mut h: u64 = 0xcbf2_9ce4_8422_2325;
            for b in token.bytes() {
                h ^= u64::from(b);
                h = h.wrapping_mul(0x0100_0000_01b3);
            }
            v[(h % self.dim as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            v[0] = 1.0;
        } else {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl EmbeddingService for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(text.to_string());
        Ok(self.vector(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .extend(texts.iter().map(|t| t.to_string()));
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

pub fn days_ago(days: u64) -> NaiveDate {
    Local::now().date_naive() - Days::new(days)
}

/// Five cases; case 5 is twenty years old and falls outside the default
/// build window.
pub fn cases_csv() -> String {
    format!(
        "id,date,title,summary,root_cause,countermeasure,severity,product,tags\n\
         1,{d1},Ink smear on drum,Toner smear appears on printed sheets,Worn drum blade,Replace drum blade,high,PX-1,\"ink,drum\"\n\
         2,{d2},Paper jam in tray two,Sheets jam when feeding from tray two,Feed roller wear,Replace feed roller,medium,PX-2,\"jam,roller\"\n\
         3,{d3},Fuser overheating error,Fuser temperature exceeds limit,Thermistor failure,Replace thermistor,critical,PX-1,fuser\n\
         4,{d4},Streaks on scanned images,Vertical streaks in scans,Dirty scanner glass,Clean scanner glass,unrated,PX-3,scanner\n\
         5,{d5},Ink smear legacy case,Old smear report,Old blade,Old fix,low,PX-1,ink\n",
        d1 = days_ago(30),
        d2 = days_ago(60),
        d3 = days_ago(400),
        d4 = days_ago(10),
        d5 = days_ago(365 * 20),
    )
}

/// A built index directory plus the engine and embedder that built it.
pub struct Fixture {
    pub tmp: TempDir,
    pub index: PathBuf,
    pub embedder: Arc<HashEmbedder>,
    pub engine: TroubleSearch,
}

impl Fixture {
    pub fn ledger(&self, name: &str) -> PathBuf {
        self.tmp.path().join("ledgers").join(name)
    }
}

pub fn config_with(embedder: Arc<HashEmbedder>) -> Config {
    Config::with_embedding_service(embedder)
}

pub fn write_source(dir: &Path) -> PathBuf {
    let source = dir.join("cases.csv");
    fs::write(&source, cases_csv()).unwrap();
    source
}

/// Builds the five-case index with a fresh [`HashEmbedder`].
pub fn fixture() -> Fixture {
    fixture_with(Arc::new(HashEmbedder::new()), Config::default())
}

/// Builds the five-case index; `base` supplies everything but the embedder.
pub fn fixture_with(embedder: Arc<HashEmbedder>, base: Config) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let source = write_source(tmp.path());
    let index = tmp.path().join("index");

    let config = Config {
        embedding_provider: trouble_search::EmbeddingProvider::Custom(embedder.clone()),
        ..base
    };
    let engine = TroubleSearch::new(config).unwrap();
    engine
        .build_index(&BuildOptions::new(&source, &index))
        .unwrap();

    Fixture {
        tmp,
        index,
        embedder,
        engine,
    }
}

/// The `id` of every result, in order.
pub fn ids(response: &trouble_search::SearchResponse) -> Vec<i64> {
    response
        .results
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect()
}

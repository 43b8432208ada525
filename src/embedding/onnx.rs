//! ONNX-based embedding generation.
//!
//! Requires the `builtin-embeddings` feature.
//!
//! # Supported Models
//!
//! - **intfloat/multilingual-e5-base** (768 dimensions) - Default
//! - **intfloat/multilingual-e5-small** (384 dimensions) - Faster
//! - **intfloat/multilingual-e5-large** (1024 dimensions) - Highest quality
//!
//! Any other sentence-embedding model exported to ONNX works when its
//! directory is given explicitly; the dimension is probed at load time.
//!
//! # Architecture
//!
//! ```text
//! Text → Tokenize → ONNX Inference → Mean Pool → L2 Normalize → Embedding
//! ```
//!
//! XLM-R based models take no `token_type_ids` input; BERT based ones do.
//! The session's declared inputs decide which tensors are fed.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::embedding::EmbeddingService;
use crate::error::{Result, TroubleSearchError};
use crate::types::Embedding;

// ---------------------------------------------------------------------------
// Model configuration constants
// ---------------------------------------------------------------------------

/// Known models: (identifier, max tokens, download repository).
const KNOWN_MODELS: &[(&str, usize, &str)] = &[
    ("intfloat/multilingual-e5-base", 512, "Xenova/multilingual-e5-base"),
    ("intfloat/multilingual-e5-small", 512, "Xenova/multilingual-e5-small"),
    ("intfloat/multilingual-e5-large", 512, "Xenova/multilingual-e5-large"),
];

const FALLBACK_MAX_LENGTH: usize = 512;

/// File names expected in each model directory
const MODEL_FILENAME: &str = "model.onnx";
const TOKENIZER_FILENAME: &str = "tokenizer.json";

// ---------------------------------------------------------------------------
// OnnxEmbedding struct
// ---------------------------------------------------------------------------

/// ONNX-based embedding service.
///
/// The model and tokenizer are loaded eagerly, so a missing model fails
/// the index load rather than the first search.
pub struct OnnxEmbedding {
    /// `Session::run()` requires `&mut self`.
    session: Mutex<Session>,

    tokenizer: Tokenizer,

    /// Probed from the model output at load time.
    dimension: usize,

    max_length: usize,

    /// Whether the graph declares a `token_type_ids` input.
    uses_token_types: bool,
}

impl OnnxEmbedding {
    /// Loads the embedding model for a model identifier.
    ///
    /// # Arguments
    ///
    /// * `model_name` - Identifier recorded in the index config
    /// * `model_dir` - Optional directory containing `model.onnx` and
    ///   `tokenizer.json`. If `None`, the default cache directory for
    ///   `model_name` is used.
    ///
    /// # Errors
    ///
    /// Returns an error if model files are not found or cannot be loaded.
    pub fn for_model(model_name: &str, model_dir: Option<PathBuf>) -> Result<Self> {
        let max_length = known_model(model_name)
            .map(|(_, max, _)| max)
            .unwrap_or(FALLBACK_MAX_LENGTH);
        let dir = resolve_model_dir(model_dir.as_deref(), model_name)?;

        info!(
            model = model_name,
            model_dir = %dir.display(),
            max_length,
            "Loading ONNX embedding model"
        );

        Self::load_from_dir(&dir, max_length)
    }

    /// Downloads a known model's files to the cache directory.
    ///
    /// # Returns
    ///
    /// The path to the model directory.
    pub fn download_model(model_name: &str) -> Result<PathBuf> {
        let (_, _, repo) = known_model(model_name).ok_or_else(|| {
            TroubleSearchError::embedding(format!(
                "No download source for model '{model_name}'. Supported: {}",
                KNOWN_MODELS
                    .iter()
                    .map(|(name, _, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        let cache_dir = default_cache_dir(model_name);
        std::fs::create_dir_all(&cache_dir).map_err(|e| {
            TroubleSearchError::embedding(format!(
                "Failed to create model cache directory {}: {e}",
                cache_dir.display()
            ))
        })?;

        let model_path = cache_dir.join(MODEL_FILENAME);
        let tokenizer_path = cache_dir.join(TOKENIZER_FILENAME);

        if !model_path.exists() {
            let url = format!("https://huggingface.co/{repo}/resolve/main/onnx/{MODEL_FILENAME}");
            info!(url = %url, dest = %model_path.display(), "Downloading ONNX model");
            download_file(&url, &model_path)?;
        }
        if !tokenizer_path.exists() {
            let url = format!("https://huggingface.co/{repo}/resolve/main/{TOKENIZER_FILENAME}");
            info!(url = %url, dest = %tokenizer_path.display(), "Downloading tokenizer");
            download_file(&url, &tokenizer_path)?;
        }

        info!(dir = %cache_dir.display(), "Model files ready");
        Ok(cache_dir)
    }

    fn load_from_dir(model_dir: &Path, max_length: usize) -> Result<Self> {
        let model_path = model_dir.join(MODEL_FILENAME);
        let tokenizer_path = model_dir.join(TOKENIZER_FILENAME);

        if !model_path.exists() {
            return Err(TroubleSearchError::embedding(format!(
                "Model file not found: {}. Download with OnnxEmbedding::download_model \
                 or provide a directory containing '{MODEL_FILENAME}'",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(TroubleSearchError::embedding(format!(
                "Tokenizer file not found: {}. \
                 The model directory must contain '{TOKENIZER_FILENAME}'",
                tokenizer_path.display()
            )));
        }

        let session = create_session(&model_path)?;
        let uses_token_types = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");
        let tokenizer = load_tokenizer(&tokenizer_path, max_length)?;

        let mut service = Self {
            session: Mutex::new(session),
            tokenizer,
            dimension: 0,
            max_length,
            uses_token_types,
        };

        let probe = service.run(&["query: probe"])?;
        service.dimension = probe.first().map(Vec::len).unwrap_or(0);
        if service.dimension == 0 {
            return Err(TroubleSearchError::embedding(
                "Model produced an empty embedding",
            ));
        }

        debug!(
            dimension = service.dimension,
            max_length, uses_token_types, "ONNX embedding model loaded"
        );
        Ok(service)
    }

    /// Tokenizes, pads to the longest text, runs inference, pools.
    fn run(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let encodings: Vec<_> = texts
            .iter()
            .map(|t| self.tokenizer.encode(*t, true))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TroubleSearchError::embedding(format!("Tokenization failed: {e}")))?;

        let max_len = encodings
            .iter()
            .map(|enc| enc.get_ids().len().min(self.max_length))
            .max()
            .unwrap_or(0)
            .max(1);
        let batch_size = texts.len();

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        for (i, enc) in encodings.iter().enumerate() {
            let ids = enc.get_ids();
            let mask = enc.get_attention_mask();
            let len = ids.len().min(self.max_length);
            for j in 0..len {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
            }
        }

        let shape = (batch_size, max_len);
        let ids_tensor = to_tensor(shape, input_ids)?;
        let mask_tensor = to_tensor(shape, attention_mask.clone())?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| TroubleSearchError::embedding(format!("Session lock poisoned: {e}")))?;
        let outputs = if self.uses_token_types {
            let type_tensor = to_tensor(shape, vec![0i64; batch_size * max_len])?;
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
            ])
        }
        .map_err(|e| TroubleSearchError::embedding(format!("ONNX inference failed: {e}")))?;

        // [batch_size, max_len, dim]
        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| TroubleSearchError::embedding(format!("Output extraction failed: {e}")))?;
        let dim = data.len() / (batch_size * max_len);

        let mut results = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let text_mask: Vec<u32> = (0..max_len)
                .map(|j| attention_mask[i * max_len + j] as u32)
                .collect();
            let offset = i * max_len * dim;
            let text_data = &data[offset..offset + max_len * dim];
            let pooled = mean_pool_raw(text_data, &text_mask, dim, max_len);
            results.push(l2_normalize(&pooled));
        }
        Ok(results)
    }
}

impl EmbeddingService for OnnxEmbedding {
    fn embed(&self, text: &str) -> Result<Embedding> {
        if text.is_empty() {
            return Err(TroubleSearchError::embedding("Cannot embed empty text"));
        }
        self.run(&[text])?
            .pop()
            .ok_or_else(|| TroubleSearchError::embedding("Model returned no embedding"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.run(texts)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn known_model(model_name: &str) -> Option<(&'static str, usize, &'static str)> {
    KNOWN_MODELS
        .iter()
        .copied()
        .find(|(name, _, _)| *name == model_name)
}

fn to_tensor(shape: (usize, usize), data: Vec<i64>) -> Result<ort::value::Tensor<i64>> {
    let array = Array2::from_shape_vec(shape, data)
        .map_err(|e| TroubleSearchError::embedding(format!("Tensor shape error: {e}")))?;
    ort::value::Tensor::from_array(array)
        .map_err(|e| TroubleSearchError::embedding(format!("Tensor creation failed: {e}")))
}

fn create_session(model_path: &Path) -> Result<Session> {
    Session::builder()
        .map_err(|e| {
            TroubleSearchError::embedding(format!("Failed to create session builder: {e}"))
        })?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| {
            TroubleSearchError::embedding(format!("Failed to set optimization level: {e}"))
        })?
        .commit_from_file(model_path)
        .map_err(|e| {
            TroubleSearchError::embedding(format!(
                "Failed to load ONNX model from {}: {e}",
                model_path.display()
            ))
        })
}

fn load_tokenizer(tokenizer_path: &Path, max_length: usize) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
        TroubleSearchError::embedding(format!(
            "Failed to load tokenizer from {}: {e}",
            tokenizer_path.display()
        ))
    })?;

    tokenizer
        .with_truncation(Some(tokenizers::TruncationParams {
            max_length,
            strategy: tokenizers::TruncationStrategy::LongestFirst,
            ..Default::default()
        }))
        .map_err(|e| TroubleSearchError::embedding(format!("Failed to set truncation: {e}")))?;

    // Padding is done by hand, to the longest text in the batch
    tokenizer.with_padding(None);

    Ok(tokenizer)
}

/// Resolves the model directory from an explicit path or the default cache.
fn resolve_model_dir(model_dir: Option<&Path>, model_name: &str) -> Result<PathBuf> {
    match model_dir {
        Some(path) => {
            if !path.exists() {
                return Err(TroubleSearchError::embedding(format!(
                    "Model directory not found: {}",
                    path.display()
                )));
            }
            Ok(path.to_path_buf())
        }
        None => {
            let cache_dir = default_cache_dir(model_name);
            if !cache_dir.join(MODEL_FILENAME).exists() {
                return Err(TroubleSearchError::embedding(format!(
                    "Model '{model_name}' not found at {}. \
                     Download with: OnnxEmbedding::download_model(\"{model_name}\")",
                    cache_dir.display()
                )));
            }
            Ok(cache_dir)
        }
    }
}

/// Default cache directory for a model.
///
/// - Linux: `~/.cache/trouble-search/models/{org}--{name}/`
/// - macOS: `~/Library/Caches/trouble-search/models/{org}--{name}/`
/// - Windows: `{LOCALAPPDATA}/trouble-search/models/{org}--{name}/`
fn default_cache_dir(model_name: &str) -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("trouble-search")
        .join("models")
        .join(model_name.replace('/', "--"))
}

/// Attention-weighted mean over `[seq_len, dim]` row-major token embeddings.
fn mean_pool_raw(data: &[f32], attention_mask: &[u32], dim: usize, seq_len: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut mask_sum = 0.0f32;

    for (t, &mask_val) in attention_mask.iter().enumerate().take(seq_len) {
        let weight = mask_val as f32;
        mask_sum += weight;
        let offset = t * dim;
        for d in 0..dim {
            pooled[d] += data[offset + d] * weight;
        }
    }

    if mask_sum > 0.0 {
        for val in &mut pooled {
            *val /= mask_sum;
        }
    }

    pooled
}

/// L2 normalizes a vector to unit length (zero vectors stay zero).
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

fn download_file(url: &str, dest: &Path) -> Result<()> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| TroubleSearchError::embedding(format!("Download failed for {url}: {e}")))?;

    let mut reader = response.into_body().into_reader();
    let mut file = std::fs::File::create(dest).map_err(|e| {
        TroubleSearchError::embedding(format!("Failed to create file {}: {e}", dest.display()))
    })?;

    std::io::copy(&mut reader, &mut file).map_err(|e| {
        TroubleSearchError::embedding(format!("Failed to write to {}: {e}", dest.display()))
    })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Embedding service abstractions.
//!
//! Embeddings are dense unit vectors of text used for the vector half of
//! hybrid search. The same model encodes corpus passages at build time and
//! queries at search time, but with different framing: the multilingual E5
//! family is asymmetric, and using the wrong prefix silently degrades
//! relevance without any error.
//!
//! # Providers
//!
//! - `OnnxEmbedding` - Built-in ONNX model (requires `builtin-embeddings` feature)
//! - Any caller-supplied [`EmbeddingService`] via `EmbeddingProvider::Custom`
//!
//! # Example
//!
//! ```rust,ignore
//! use trouble_search::embedding::{Encoder, EncodeIntent};
//!
//! let encoder = Encoder::new(service, "intfloat/multilingual-e5-base");
//! let query = encoder.encode_one("印刷ムラ", EncodeIntent::Query)?;
//! ```

#[cfg(feature = "builtin-embeddings")]
pub mod onnx;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, EmbeddingProvider};
use crate::error::{Result, TroubleSearchError, ValidationError};
use crate::types::Embedding;

/// Embedding service trait for generating vector representations of text.
///
/// Implementations must be thread-safe (`Send + Sync`): one service is
/// shared by every search against a cached index.
///
/// Services receive text that is already framed (see [`EncodeIntent`]).
///
/// # Implementing a Custom Provider
///
/// ```rust,ignore
/// use trouble_search::embedding::EmbeddingService;
/// use trouble_search::{Embedding, Result};
///
/// struct RemoteEmbedder {
///     client: MyApiClient,
/// }
///
/// impl EmbeddingService for RemoteEmbedder {
///     fn embed(&self, text: &str) -> Result<Embedding> {
///         Ok(self.client.get_embedding(text)?)
///     }
///
///     fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
///         Ok(self.client.get_embeddings(texts)?)
///     }
///
///     fn dimension(&self) -> usize {
///         768
///     }
/// }
/// ```
pub trait EmbeddingService: Send + Sync {
    /// Generates an embedding for a single text.
    ///
    /// # Errors
    ///
    /// Returns `TroubleSearchError::Embedding` if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generates embeddings for multiple texts, in input order.
    ///
    /// # Errors
    ///
    /// Returns `TroubleSearchError::Embedding` if any embedding generation fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Returns the dimension of embeddings produced by this service.
    fn dimension(&self) -> usize;

    /// Validates that an embedding has the correct dimension.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DimensionMismatch` if dimensions don't match.
    fn validate_embedding(&self, embedding: &Embedding) -> Result<()> {
        let expected = self.dimension();
        let actual = embedding.len();

        if actual != expected {
            return Err(TroubleSearchError::Validation(
                ValidationError::dimension_mismatch(expected, actual),
            ));
        }

        Ok(())
    }
}

/// Encoding intent: how a text is framed before embedding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodeIntent {
    /// A search query (`"query: "` prefix).
    Query,
    /// A corpus document (`"passage: "` prefix).
    Passage,
}

impl EncodeIntent {
    /// Prefix prepended to the text.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Query => "query: ",
            Self::Passage => "passage: ",
        }
    }

    /// Frames a text for this intent.
    pub fn frame(self, text: &str) -> String {
        format!("{}{}", self.prefix(), text)
    }
}

/// Embedding front-end shared by the builder and the search path.
///
/// Wraps an [`EmbeddingService`] with intent framing, batching and
/// dimension checks.
#[derive(Clone)]
pub struct Encoder {
    service: Arc<dyn EmbeddingService>,
    model_name: String,
}

impl Encoder {
    /// Creates an encoder over a service.
    pub fn new(service: Arc<dyn EmbeddingService>, model_name: impl Into<String>) -> Self {
        Self {
            service,
            model_name: model_name.into(),
        }
    }

    /// Model identifier this encoder was created for.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Embedding dimension.
    pub fn dimension(&self) -> usize {
        self.service.dimension()
    }

    /// Embeds one text with the given framing.
    pub fn encode_one(&self, text: &str, intent: EncodeIntent) -> Result<Embedding> {
        let framed = intent.frame(text);
        let embedding = self.service.embed(&framed)?;
        self.service.validate_embedding(&embedding)?;
        Ok(embedding)
    }

    /// Embeds texts with the given framing, `batch_size` at a time.
    ///
    /// # Errors
    ///
    /// Fails if the service errors, returns the wrong number of vectors,
    /// or returns a vector of the wrong dimension.
    pub fn encode(
        &self,
        texts: &[&str],
        intent: EncodeIntent,
        batch_size: usize,
    ) -> Result<Vec<Embedding>> {
        let batch_size = batch_size.max(1);
        let mut out = Vec::with_capacity(texts.len());

        for (n, chunk) in texts.chunks(batch_size).enumerate() {
            let framed: Vec<String> = chunk.iter().map(|t| intent.frame(t)).collect();
            let refs: Vec<&str> = framed.iter().map(String::as_str).collect();
            let embeddings = self.service.embed_batch(&refs)?;

            if embeddings.len() != chunk.len() {
                return Err(TroubleSearchError::embedding(format!(
                    "Embedding service returned {} vectors for {} texts",
                    embeddings.len(),
                    chunk.len()
                )));
            }
            for embedding in &embeddings {
                self.service.validate_embedding(embedding)?;
            }

            debug!(batch = n, size = chunk.len(), ?intent, "Embedded batch");
            out.extend(embeddings);
        }

        Ok(out)
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder")
            .field("model_name", &self.model_name)
            .field("dimension", &self.service.dimension())
            .finish()
    }
}

/// Creates an embedding service for the given model.
///
/// # Errors
///
/// Returns `DependencyUnavailable` if:
/// - Builtin embeddings requested but the feature is not enabled
/// - The ONNX model cannot be found or loaded
pub fn create_embedding_service(
    config: &Config,
    model_name: &str,
) -> Result<Arc<dyn EmbeddingService>> {
    match &config.embedding_provider {
        EmbeddingProvider::Custom(service) => Ok(Arc::clone(service)),

        #[cfg(feature = "builtin-embeddings")]
        EmbeddingProvider::Builtin { model_dir } => {
            let service = onnx::OnnxEmbedding::for_model(model_name, model_dir.clone())
                .map_err(|e| {
                    TroubleSearchError::dependency(
                        format!("embedding model '{model_name}'"),
                        e.to_string(),
                    )
                })?;
            Ok(Arc::new(service))
        }

        #[cfg(not(feature = "builtin-embeddings"))]
        EmbeddingProvider::Builtin { .. } => Err(TroubleSearchError::dependency(
            format!("embedding model '{model_name}'"),
            "builtin embeddings require the 'builtin-embeddings' feature",
        )),
    }
}

//! Integration tests for the ONNX embedding service.
//!
//! Most of these need:
//! 1. The `builtin-embeddings` feature enabled
//! 2. The model files downloaded to the default cache location
//!
//! # Setup
//!
//! ```bash
//! # Download the model (one-time):
//! cargo test --features builtin-embeddings -- --ignored test_download_default_model
//!
//! # Run all integration tests:
//! cargo test --features builtin-embeddings -- --ignored
//! ```

#[cfg(feature = "builtin-embeddings")]
mod onnx_tests {
    use std::sync::Arc;

    use tempfile::tempdir;
    use trouble_search::embedding::onnx::OnnxEmbedding;
    use trouble_search::embedding::{EmbeddingService, EncodeIntent, Encoder};
    use trouble_search::DEFAULT_MODEL_NAME;

    fn load() -> OnnxEmbedding {
        OnnxEmbedding::for_model(DEFAULT_MODEL_NAME, None).unwrap()
    }

    /// Embeddings are L2-normalised, so cosine similarity is the dot product.
    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_missing_model_dir_is_an_error() {
        let dir = tempdir().unwrap();
        let result = OnnxEmbedding::for_model(DEFAULT_MODEL_NAME, Some(dir.path().join("nope")));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_model_has_no_download_source() {
        let err = OnnxEmbedding::download_model("acme/not-a-model").unwrap_err();
        assert!(err.to_string().contains("No download source"));
    }

    #[test]
    #[ignore]
    fn test_download_default_model() {
        match OnnxEmbedding::download_model(DEFAULT_MODEL_NAME) {
            Ok(path) => {
                assert!(path.join("model.onnx").exists());
                assert!(path.join("tokenizer.json").exists());
            }
            // Download might fail due to network
            Err(e) => eprintln!("Model download failed: {e}"),
        }
    }

    #[test]
    #[ignore]
    fn test_dimension_and_normalisation() {
        let model = load();
        assert_eq!(model.dimension(), 768);

        let embedding = model.embed("passage: 印刷ムラが発生する").unwrap();
        assert_eq!(embedding.len(), 768);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3, "norm was {norm}");
    }

    #[test]
    #[ignore]
    fn test_empty_text_is_rejected() {
        assert!(load().embed("").is_err());
    }

    #[test]
    #[ignore]
    fn test_batch_matches_single() {
        let model = load();
        let texts = ["passage: 紙詰まり", "passage: paper jam in tray 2"];
        let batch = model.embed_batch(&texts).unwrap();
        assert_eq!(batch.len(), 2);

        for (text, batched) in texts.iter().zip(&batch) {
            let single = model.embed(text).unwrap();
            assert!(cosine(&single, batched) > 0.999);
        }
    }

    #[test]
    #[ignore]
    fn test_related_cases_are_closer() {
        let encoder = Encoder::new(Arc::new(load()), DEFAULT_MODEL_NAME);
        let query = encoder.encode_one("印刷ムラ", EncodeIntent::Query).unwrap();
        let related = encoder
            .encode_one("印刷面に濃淡のムラが出る", EncodeIntent::Passage)
            .unwrap();
        let unrelated = encoder
            .encode_one("電源が入らない", EncodeIntent::Passage)
            .unwrap();
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }
}

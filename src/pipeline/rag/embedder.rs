use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::EmbeddingModel;
use super::RagError;

/// Dimension of the bundled MiniLM model and the mock default.
pub const EMBEDDING_DIM: usize = 384;

// ═══════════════════════════════════════════════════════════
// Ollama embedder (`/api/embed`)
// ═══════════════════════════════════════════════════════════

/// Query embedder backed by a local Ollama embedding model.
///
/// The corpus must have been embedded with the same model; the dimension is
/// learned from the first response and checked against the partition at
/// search time.
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    dimension: std::sync::OnceLock<usize>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, RagError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::EmbeddingFailed(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            dimension: std::sync::OnceLock::new(),
        })
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    RagError::OllamaConnection(self.base_url.clone())
                } else {
                    RagError::EmbeddingFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RagError::EmbeddingFailed(format!("HTTP {status}: {body}")));
        }

        let parsed: EmbedResponse = response
            .json()
            .map_err(|e| RagError::EmbeddingFailed(format!("Response parsing: {e}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(RagError::EmbeddingFailed(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        if let Some(first) = parsed.embeddings.first() {
            let _ = self.dimension.set(first.len());
        }
        Ok(parsed.embeddings)
    }
}

impl EmbeddingModel for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.request(&[text])?
            .pop()
            .ok_or_else(|| RagError::EmbeddingFailed("Empty embedding response".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts)
    }

    /// 0 until the first successful call.
    fn dimension(&self) -> usize {
        self.dimension.get().copied().unwrap_or(0)
    }
}

// ═══════════════════════════════════════════════════════════
// Mock
// ═══════════════════════════════════════════════════════════

/// Mock embedding model for testing, produces deterministic vectors.
pub struct MockEmbedder {
    dimension: usize,
    fail: bool,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::with_dimension(EMBEDDING_DIM)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
        }
    }

    /// Every call fails with `EmbeddingFailed`.
    pub fn failing() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
            fail: true,
        }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        if self.fail {
            return Err(RagError::EmbeddingFailed("mock embedder failure".into()));
        }
        Ok(deterministic_vector(text, self.dimension))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic unit vector derived from the bytes of `text`.
pub fn deterministic_vector(text: &str, dim: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dim];
    let bytes = text.as_bytes();

    for (i, slot) in vec.iter_mut().enumerate() {
        let byte_idx = i % bytes.len().max(1);
        *slot = (bytes.get(byte_idx).copied().unwrap_or(0) as f32 + i as f32) / 255.0;
    }

    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in &mut vec {
            *val /= norm;
        }
    }

    vec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_embed_is_deterministic_and_normalized() {
        let embedder = MockEmbedder::new();
        let v1 = embedder.embed("dolore toracico").unwrap();
        let v2 = embedder.embed("dolore toracico").unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1.len(), EMBEDDING_DIM);
        let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01, "got norm = {norm}");
    }

    #[test]
    fn mock_embed_different_texts_differ() {
        let embedder = MockEmbedder::with_dimension(16);
        let v1 = embedder.embed("rash").unwrap();
        let v2 = embedder.embed("cough").unwrap();
        assert_ne!(v1, v2);
        assert_eq!(embedder.dimension(), 16);
    }

    #[test]
    fn mock_batch_preserves_order() {
        let embedder = MockEmbedder::with_dimension(8);
        let batch = embedder.embed_batch(&["a", "b"]).unwrap();
        assert_eq!(batch[0], embedder.embed("a").unwrap());
        assert_eq!(batch[1], embedder.embed("b").unwrap());
    }

    #[test]
    fn failing_mock_reports_embedding_error() {
        let err = MockEmbedder::failing().embed("x").unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailed(_)));
    }

    #[test]
    fn ollama_embedder_unreachable_is_connection_error() {
        let embedder =
            OllamaEmbedder::new("http://127.0.0.1:9", "nomic-embed-text", Duration::from_secs(2))
                .unwrap();
        assert_eq!(embedder.dimension(), 0);
        assert!(embedder.embed("fever").is_err());
        assert!(embedder.embed_batch(&[]).unwrap().is_empty());
    }
}

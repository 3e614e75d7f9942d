//! ONNX Runtime models, behind the `onnx-embeddings` feature.
//!
//! Both models expect a directory with `model.onnx` and `tokenizer.json`.
//! `ort::Session::run` needs `&mut self`, so each session sits behind a
//! `Mutex` to keep the `&self` trait methods.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::TensorRef;

use super::embedder::EMBEDDING_DIM;
use super::types::{CrossEncoder, EmbeddingModel};
use super::RagError;

fn load_session(model_dir: &Path) -> Result<(Session, tokenizers::Tokenizer), RagError> {
    let model_path = model_dir.join("model.onnx");
    let tokenizer_path = model_dir.join("tokenizer.json");

    if !model_path.exists() {
        return Err(RagError::ModelNotFound(model_path));
    }
    if !tokenizer_path.exists() {
        return Err(RagError::ModelNotFound(tokenizer_path));
    }

    let session = Session::builder()
        .map_err(|e: ort::Error| RagError::ModelInit(e.to_string()))?
        .with_intra_threads(2)
        .map_err(|e: ort::Error| RagError::ModelInit(e.to_string()))?
        .commit_from_file(&model_path)
        .map_err(|e: ort::Error| RagError::ModelInit(format!("ONNX load failed: {e}")))?;

    let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| RagError::ModelInit(format!("Tokenizer load failed: {e}")))?;

    Ok((session, tokenizer))
}

/// Token ids, attention mask and type ids as `[1, seq_len]` arrays.
type EncodedInputs = (
    ndarray::Array2<i64>,
    ndarray::Array2<i64>,
    ndarray::Array2<i64>,
);

fn to_arrays(encoding: &tokenizers::Encoding, fail: fn(String) -> RagError) -> Result<EncodedInputs, RagError> {
    let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
    let mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&m| m as i64).collect();
    let types: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();
    let seq_len = ids.len();

    let ids = ndarray::Array2::from_shape_vec((1, seq_len), ids).map_err(|e| fail(e.to_string()))?;
    let mask = ndarray::Array2::from_shape_vec((1, seq_len), mask).map_err(|e| fail(e.to_string()))?;
    let types = ndarray::Array2::from_shape_vec((1, seq_len), types).map_err(|e| fail(e.to_string()))?;
    Ok((ids, mask, types))
}

// ═══════════════════════════════════════════════════════════
// Bi-encoder (stage 1 query embedding)
// ═══════════════════════════════════════════════════════════

/// all-MiniLM-L6-v2 query embedder: mean pooling + L2 normalization.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

impl OnnxEmbedder {
    pub fn load(model_dir: &Path) -> Result<Self, RagError> {
        let (session, tokenizer) = load_session(model_dir)?;
        tracing::info!(dir = %model_dir.display(), "ONNX embedder loaded");
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn infer(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| RagError::EmbeddingFailed(format!("Tokenization: {e}")))?;
        let (ids, mask, types) = to_arrays(&encoding, RagError::EmbeddingFailed)?;
        let seq_len = ids.ncols();

        let ids_tensor = TensorRef::from_array_view(&ids)
            .map_err(|e| RagError::EmbeddingFailed(e.to_string()))?;
        let mask_tensor = TensorRef::from_array_view(&mask)
            .map_err(|e| RagError::EmbeddingFailed(e.to_string()))?;
        let type_tensor = TensorRef::from_array_view(&types)
            .map_err(|e| RagError::EmbeddingFailed(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| RagError::EmbeddingFailed("Session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![ids_tensor, mask_tensor, type_tensor])
            .map_err(|e| RagError::EmbeddingFailed(format!("ONNX inference failed: {e}")))?;

        // [1, seq_len, EMBEDDING_DIM]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RagError::EmbeddingFailed(format!("Output extraction: {e}")))?;
        if shape.len() != 3 || shape[2] as usize != EMBEDDING_DIM {
            return Err(RagError::EmbeddingFailed(format!(
                "Unexpected output shape: {shape:?}, expected [1, {seq_len}, {EMBEDDING_DIM}]"
            )));
        }

        let mut pooled = vec![0.0f32; EMBEDDING_DIM];
        let mut mask_sum = 0.0f32;
        for (token_idx, &m) in mask.iter().enumerate().take(seq_len) {
            let m = m as f32;
            mask_sum += m;
            let offset = token_idx * EMBEDDING_DIM;
            for (dim_idx, p) in pooled.iter_mut().enumerate() {
                *p += data[offset + dim_idx] * m;
            }
        }
        if mask_sum > 0.0 {
            pooled.iter_mut().for_each(|v| *v /= mask_sum);
        }

        let norm: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            pooled.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(pooled)
    }
}

impl EmbeddingModel for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.infer(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        texts.iter().map(|t| self.infer(t)).collect()
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

// ═══════════════════════════════════════════════════════════
// Cross-encoder (stage 2 rerank)
// ═══════════════════════════════════════════════════════════

/// ms-marco MiniLM cross-encoder: one relevance logit per (query, passage).
pub struct OnnxCrossEncoder {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

impl OnnxCrossEncoder {
    pub fn load(model_dir: &Path) -> Result<Self, RagError> {
        let (session, tokenizer) = load_session(model_dir)?;
        tracing::info!(dir = %model_dir.display(), "ONNX cross-encoder loaded");
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn score_pair(&self, session: &mut Session, query: &str, passage: &str) -> Result<f32, RagError> {
        let encoding = self
            .tokenizer
            .encode((query, passage), true)
            .map_err(|e| RagError::Rerank(format!("Tokenization: {e}")))?;
        let (ids, mask, types) = to_arrays(&encoding, RagError::Rerank)?;

        let ids_tensor = TensorRef::from_array_view(&ids).map_err(|e| RagError::Rerank(e.to_string()))?;
        let mask_tensor = TensorRef::from_array_view(&mask).map_err(|e| RagError::Rerank(e.to_string()))?;
        let type_tensor = TensorRef::from_array_view(&types).map_err(|e| RagError::Rerank(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![ids_tensor, mask_tensor, type_tensor])
            .map_err(|e| RagError::Rerank(format!("ONNX inference failed: {e}")))?;

        // [1, 1] logits
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RagError::Rerank(format!("Output extraction: {e}")))?;
        data.first()
            .copied()
            .ok_or_else(|| RagError::Rerank("Empty logits".into()))
    }
}

impl CrossEncoder for OnnxCrossEncoder {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RagError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| RagError::Rerank("Session lock poisoned".to_string()))?;
        passages
            .iter()
            .map(|p| self.score_pair(&mut session, query, p))
            .collect()
    }
}

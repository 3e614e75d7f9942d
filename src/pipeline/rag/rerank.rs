//! Stage-2 rerankers.
//!
//! The production reranker is the ONNX cross-encoder (`onnx` module). When no
//! model is installed the lexical reranker scores (query, passage) pairs with
//! BM25 over the candidate set, which keeps the two-stage contract intact.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use super::types::CrossEncoder;
use super::RagError;

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

/// Tokens shorter than this carry no signal (articles, prepositions).
const MIN_TOKEN_CHARS: usize = 3;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

/// Lower-cased word tokens, short tokens removed.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .collect()
}

/// BM25 reranker; document statistics come from the candidate set itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalReranker;

impl LexicalReranker {
    pub fn new() -> Self {
        Self
    }
}

impl CrossEncoder for LexicalReranker {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RagError> {
        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let docs: Vec<Vec<String>> = passages.iter().map(|p| tokenize(p)).collect();
        let n = docs.len() as f32;
        let avg_len = (docs.iter().map(Vec::len).sum::<usize>() as f32 / n).max(1.0);

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for doc in &docs {
            let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
            for term in unique {
                if query_terms.contains(term) {
                    *doc_freq.entry(term).or_default() += 1;
                }
            }
        }

        let scores: Vec<f32> = docs
            .iter()
            .map(|doc| {
                let mut tf: HashMap<&str, usize> = HashMap::new();
                for term in doc {
                    *tf.entry(term.as_str()).or_default() += 1;
                }
                let len_norm = 1.0 - BM25_B + BM25_B * doc.len() as f32 / avg_len;
                query_terms
                    .iter()
                    .filter_map(|term| {
                        let f = *tf.get(term.as_str())? as f32;
                        let df = *doc_freq.get(term.as_str()).unwrap_or(&0) as f32;
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        Some(idf * f * (BM25_K1 + 1.0) / (f + BM25_K1 * len_norm))
                    })
                    .sum::<f32>()
            })
            .collect();

        Ok(scores)
    }
}

/// Mock cross-encoder for testing.
pub struct MockCrossEncoder {
    scores: Option<Vec<f32>>,
}

impl MockCrossEncoder {
    /// Returns `scores` truncated or padded with 0.0 to the candidate count.
    pub fn with_scores(scores: Vec<f32>) -> Self {
        Self {
            scores: Some(scores),
        }
    }

    /// Every call fails with `Rerank`.
    pub fn failing() -> Self {
        Self { scores: None }
    }
}

impl CrossEncoder for MockCrossEncoder {
    fn score(&self, _query: &str, passages: &[&str]) -> Result<Vec<f32>, RagError> {
        let scores = self
            .scores
            .as_ref()
            .ok_or_else(|| RagError::Rerank("mock cross-encoder failure".into()))?;
        Ok((0..passages.len())
            .map(|i| scores.get(i).copied().unwrap_or(0.0))
            .collect())
    }
}

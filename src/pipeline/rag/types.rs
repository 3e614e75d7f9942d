use serde::{Deserialize, Serialize};

use super::RagError;

/// A corpus passage as stored in a specialty partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    /// Identifier of the source document the passage was cut from.
    pub source: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A passage with its relevance score (vector similarity or rerank score).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub passage_id: String,
    pub source: String,
    pub text: String,
    pub score: f32,
}

/// Output of two-stage retrieval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalOutcome {
    /// Reranked passages, best first, at most K2.
    pub passages: Vec<ScoredPassage>,
    /// Passage texts joined with a `---` separator.
    pub context: String,
    /// Deduplicated source ids of `passages`, first-occurrence order.
    pub sources: Vec<String>,
}

impl RetrievalOutcome {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Embedding model abstraction
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError>;
    fn dimension(&self) -> usize;
}

/// Nearest-neighbour search over one partition.
pub trait VectorSearch: Send + Sync {
    fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>, RagError>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scores (query, passage) pairs jointly. One score per passage, higher is
/// more relevant.
pub trait CrossEncoder: Send + Sync {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RagError>;
}

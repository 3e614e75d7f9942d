pub mod types;
pub mod corpus;
pub mod embedder;
pub mod rerank;
pub mod query;
pub mod retrieval;
#[cfg(feature = "onnx-embeddings")]
pub mod onnx;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("No corpus partition for specialty '{0}'")]
    PartitionMissing(String),

    #[error("Corpus partition '{specialty}' could not be loaded: {reason}")]
    PartitionLoad { specialty: String, reason: String },

    #[error("Ollama connection failed: {0}")]
    OllamaConnection(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedding dimension mismatch: query {query}, corpus {corpus}")]
    DimensionMismatch { query: usize, corpus: usize },

    #[error("Vector search failed: {0}")]
    VectorSearch(String),

    #[error("Rerank failed: {0}")]
    Rerank(String),

    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Model initialization failed: {0}")]
    ModelInit(String),
}

pub use corpus::{FileCorpus, InMemoryCorpus, InMemoryVectorSearch, PartitionSource};
pub use embedder::{MockEmbedder, OllamaEmbedder};
pub use rerank::{LexicalReranker, MockCrossEncoder};
pub use retrieval::RetrievalPipeline;
pub use types::*;

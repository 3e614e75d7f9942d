use std::sync::Arc;

use super::corpus::PartitionSource;
use super::types::{CrossEncoder, EmbeddingModel, RetrievalOutcome, ScoredPassage};
use super::RagError;

/// Separator between passages in the generation context.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Two-stage retrieval: broad vector search, then pairwise rerank.
pub struct RetrievalPipeline {
    corpus: Arc<dyn PartitionSource>,
    embedder: Arc<dyn EmbeddingModel>,
    reranker: Arc<dyn CrossEncoder>,
    stage1_top_k: usize,
    stage2_top_k: usize,
}

impl RetrievalPipeline {
    pub fn new(
        corpus: Arc<dyn PartitionSource>,
        embedder: Arc<dyn EmbeddingModel>,
        reranker: Arc<dyn CrossEncoder>,
        stage1_top_k: usize,
        stage2_top_k: usize,
    ) -> Self {
        Self {
            corpus,
            embedder,
            reranker,
            stage1_top_k,
            stage2_top_k,
        }
    }

    /// Specialties that have a corpus partition.
    pub fn specialties(&self) -> Vec<String> {
        self.corpus.specialties()
    }

    /// Stage 1: vector similarity over the specialty partition.
    pub fn candidates(&self, specialty: &str, query: &str) -> Result<Vec<ScoredPassage>, RagError> {
        let partition = self.corpus.partition(specialty)?;
        let query_embedding = self.embedder.embed(query)?;
        partition.search(&query_embedding, self.stage1_top_k)
    }

    /// Stage 2: rerank candidates, best first, at most K2.
    pub fn rerank(
        &self,
        query: &str,
        candidates: Vec<ScoredPassage>,
    ) -> Result<Vec<ScoredPassage>, RagError> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let scores = self.reranker.score(query, &texts)?;
        if scores.len() != candidates.len() {
            return Err(RagError::Rerank(format!(
                "Expected {} scores, got {}",
                candidates.len(),
                scores.len()
            )));
        }

        let mut reranked: Vec<ScoredPassage> = candidates
            .into_iter()
            .zip(scores)
            .map(|(passage, score)| ScoredPassage {
                score: if score.is_nan() { f32::NEG_INFINITY } else { score },
                ..passage
            })
            .collect();

        // Stable: equal scores keep their stage-1 order. NaN scores sink.
        reranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        reranked.truncate(self.stage2_top_k);
        Ok(reranked)
    }

    /// Run both stages and assemble the generation context.
    ///
    /// An empty stage 1 is an empty outcome, not an error.
    pub fn retrieve(&self, specialty: &str, query: &str) -> Result<RetrievalOutcome, RagError> {
        let candidates = self.candidates(specialty, query)?;
        let stage1 = candidates.len();
        if candidates.is_empty() {
            tracing::info!(specialty, "No candidates in partition");
            return Ok(RetrievalOutcome::default());
        }

        let passages = self.rerank(query, candidates)?;
        let outcome = assemble(passages);

        tracing::info!(
            specialty,
            stage1,
            stage2 = outcome.passages.len(),
            sources = outcome.sources.len(),
            "Retrieval completed"
        );
        Ok(outcome)
    }
}

/// Join passage texts and collect first-occurrence-ordered sources.
pub fn assemble(passages: Vec<ScoredPassage>) -> RetrievalOutcome {
    let context = passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    let mut sources: Vec<String> = Vec::new();
    for p in &passages {
        if !sources.contains(&p.source) {
            sources.push(p.source.clone());
        }
    }

    RetrievalOutcome {
        passages,
        context,
        sources,
    }
}

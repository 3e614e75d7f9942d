pub mod agents;
pub mod api;
pub mod config;
pub mod engine;
pub mod messages;
pub mod models;
pub mod pipeline;
pub mod session;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::api::{ApiContext, ServerError};
use crate::config::TriageConfig;
use crate::engine::TurnEngine;
use crate::pipeline::llm::{LlmClient, LlmError, OllamaClient};
use crate::pipeline::rag::{
    CrossEncoder, EmbeddingModel, FileCorpus, LexicalReranker, OllamaEmbedder, RagError, RetrievalPipeline,
};
use crate::session::{SessionError, SessionRepository, SessionStore, SqliteRepository};

/// Errors that stop the service before or while serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("LLM client: {0}")]
    Llm(#[from] LlmError),
    #[error("Retrieval: {0}")]
    Rag(#[from] RagError),
    #[error("Session store: {0}")]
    Session(#[from] SessionError),
    #[error("Runtime: {0}")]
    Runtime(std::io::Error),
    #[error(transparent)]
    Server(#[from] ServerError),
}

pub fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("Triage starting v{}", config::APP_VERSION);

    if let Err(e) = start() {
        tracing::error!("Triage stopped: {e}");
        std::process::exit(1);
    }
}

fn start() -> Result<(), StartupError> {
    let config = TriageConfig::from_env()?;
    tracing::info!(
        ollama = %config.ollama_url,
        model = %config.llm_model,
        corpus = %config.corpus_dir.display(),
        sessions = %config.session_db.display(),
        "Configuration resolved"
    );

    // Blocking HTTP clients must be built outside the async runtime.
    let ctx = build_context(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(StartupError::Runtime)?;

    runtime.block_on(async {
        let eviction = ctx.sessions.clone().spawn_eviction(config.eviction_interval);
        let served = api::serve(ctx, &config.bind_addr).await;
        eviction.abort();
        served
    })?;
    Ok(())
}

/// Wire engine and session store from configuration.
pub fn build_context(config: &TriageConfig) -> Result<ApiContext, StartupError> {
    let llm: Arc<dyn LlmClient> = Arc::new(OllamaClient::new(
        &config.ollama_url,
        &config.llm_model,
        config.llm_timeout,
    )?);
    let retrieval = build_retrieval(config)?;
    let engine = Arc::new(TurnEngine::new(llm, retrieval, config));

    let repository: Arc<dyn SessionRepository> = Arc::new(SqliteRepository::open(&config.session_db)?);
    let sessions = Arc::new(SessionStore::new(
        repository,
        config.lock_timeout,
        config.idle_timeout,
    ));

    Ok(ApiContext::new(engine, sessions))
}

fn build_retrieval(config: &TriageConfig) -> Result<RetrievalPipeline, StartupError> {
    let corpus = Arc::new(FileCorpus::open(&config.corpus_dir));
    let (embedder, reranker) = retrieval_models(config)?;
    Ok(RetrievalPipeline::new(
        corpus,
        embedder,
        reranker,
        config.stage1_top_k,
        config.stage2_top_k,
    ))
}

#[cfg(feature = "onnx-embeddings")]
fn retrieval_models(config: &TriageConfig) -> Result<(Arc<dyn EmbeddingModel>, Arc<dyn CrossEncoder>), StartupError> {
    use crate::pipeline::rag::onnx::{OnnxCrossEncoder, OnnxEmbedder};

    let embedder: Arc<dyn EmbeddingModel> = match OnnxEmbedder::load(&config.models_dir.join("embedder")) {
        Ok(model) => Arc::new(model),
        Err(e) => {
            tracing::warn!(error = %e, "ONNX embedder unavailable, using Ollama embeddings");
            Arc::new(OllamaEmbedder::new(&config.ollama_url, &config.embed_model, config.llm_timeout)?)
        }
    };
    let reranker: Arc<dyn CrossEncoder> = match OnnxCrossEncoder::load(&config.models_dir.join("reranker")) {
        Ok(model) => Arc::new(model),
        Err(e) => {
            tracing::warn!(error = %e, "ONNX cross-encoder unavailable, using lexical reranking");
            Arc::new(LexicalReranker::new())
        }
    };
    Ok((embedder, reranker))
}

#[cfg(not(feature = "onnx-embeddings"))]
fn retrieval_models(config: &TriageConfig) -> Result<(Arc<dyn EmbeddingModel>, Arc<dyn CrossEncoder>), StartupError> {
    let embedder = OllamaEmbedder::new(&config.ollama_url, &config.embed_model, config.llm_timeout)?;
    Ok((Arc::new(embedder), Arc::new(LexicalReranker::new())))
}

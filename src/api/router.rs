//! Triage API router.
//!
//! Routes: `POST /chat`, `POST /reset`, `GET /health`. Permissive CORS so a
//! browser client on another origin can call it.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;

/// Build the triage API router.
pub fn triage_router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/chat", post(endpoints::chat::send))
        .route("/reset", post(endpoints::chat::reset))
        .route("/health", get(endpoints::health::check))
        .with_state(ctx)
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::config::TriageConfig;
    use crate::engine::TurnEngine;
    use crate::pipeline::llm::MockLlmClient;
    use crate::pipeline::rag::{
        EmbeddingModel, InMemoryCorpus, InMemoryVectorSearch, LexicalReranker, MockEmbedder, Passage,
        RetrievalPipeline,
    };
    use crate::session::{InMemoryRepository, SessionRepository, SessionStore};

    fn test_context(mock: MockLlmClient, lock_timeout: Duration) -> (ApiContext, Arc<InMemoryRepository>) {
        let embedder = MockEmbedder::with_dimension(8);
        let text = "Contact dermatitis: itchy red rash after exposure";
        let store = InMemoryVectorSearch::from_passages(vec![Passage {
            id: "p1".into(),
            source: "dermatitis.pdf".into(),
            text: text.into(),
            embedding: embedder.embed(text).unwrap(),
        }])
        .unwrap();
        let retrieval = RetrievalPipeline::new(
            Arc::new(InMemoryCorpus::new().with_partition("dermatologo", store)),
            Arc::new(embedder),
            Arc::new(LexicalReranker::new()),
            30,
            10,
        );
        let engine = TurnEngine::new(Arc::new(mock), retrieval, &TriageConfig::default());
        let repo = Arc::new(InMemoryRepository::new());
        let sessions = SessionStore::new(repo.clone(), lock_timeout, Duration::from_secs(3600));
        (ApiContext::new(Arc::new(engine), Arc::new(sessions)), repo)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_lists_specialties() {
        let (ctx, _) = test_context(MockLlmClient::unreachable(), Duration::from_secs(1));
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = triage_router(ctx).oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["specialties"], serde_json::json!(["dermatologo"]));
    }

    #[tokio::test]
    async fn chat_runs_a_turn_and_persists_it() {
        let mock = MockLlmClient::scripted([
            "{}",
            r#"{"action": "ask_general_followup", "question": "Where is the rash?"}"#,
        ]);
        let (ctx, repo) = test_context(mock, Duration::from_secs(1));
        let req = post_json("/chat", serde_json::json!({"session_id": "s1", "message": "I have a rash"}));
        let response = triage_router(ctx).oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["response_text"], "Where is the rash?");
        assert_eq!(json["active_agent"], "router");
        assert_eq!(json["is_final"], false);
        assert!(json.get("conditions").is_none());
        assert_eq!(repo.load("s1").unwrap().unwrap().state.chat_history.len(), 2);
    }

    #[tokio::test]
    async fn chat_without_session_id_is_rejected() {
        let (ctx, _) = test_context(MockLlmClient::unreachable(), Duration::from_secs(1));
        let req = post_json("/chat", serde_json::json!({"session_id": " ", "message": "hi"}));
        let response = triage_router(ctx).oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn busy_session_returns_409() {
        let (ctx, _) = test_context(MockLlmClient::unreachable(), Duration::from_millis(50));
        let _held = ctx.sessions.acquire("s1").await.unwrap();
        let req = post_json("/chat", serde_json::json!({"session_id": "s1", "message": "hello"}));
        let response = triage_router(ctx.clone()).oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"]["code"], "SESSION_BUSY");
    }

    #[tokio::test]
    async fn reset_clears_stored_session() {
        let mock = MockLlmClient::scripted([
            r#"{"symptoms": ["Itchy rash"]}"#,
            r#"{"action": "ask_general_followup", "question": "Since when?"}"#,
        ]);
        let (ctx, repo) = test_context(mock, Duration::from_secs(1));
        let app = triage_router(ctx);

        let turn = post_json("/chat", serde_json::json!({"session_id": "s1", "message": "itchy rash"}));
        assert_eq!(app.clone().oneshot(turn).await.unwrap().status(), StatusCode::OK);
        assert!(!repo.load("s1").unwrap().unwrap().record.is_empty());

        let reset = post_json("/reset", serde_json::json!({"session_id": "s1", "language": "it"}));
        let response = app.oneshot(reset).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "Conversazione e dati resettati.");

        let saved = repo.load("s1").unwrap().unwrap();
        assert!(saved.record.is_empty());
        assert!(saved.state.chat_history.is_empty());
    }

    #[tokio::test]
    async fn reset_requires_session_id() {
        let (ctx, _) = test_context(MockLlmClient::unreachable(), Duration::from_secs(1));
        let response = triage_router(ctx)
            .oneshot(post_json("/reset", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn not_found_for_unknown_route() {
        let (ctx, _) = test_context(MockLlmClient::unreachable(), Duration::from_secs(1));
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let response = triage_router(ctx).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

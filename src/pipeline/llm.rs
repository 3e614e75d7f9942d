//! Chat-completion client used by every generative component.
//!
//! Components hold an `Arc<dyn LlmClient>` and never see transport details:
//! connection failures, timeouts, and non-2xx responses all arrive as
//! `LlmError` and are mapped to each component's own safe fallback.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::ChatMessage;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Ollama is not reachable at {0}")]
    OllamaConnection(String),

    #[error("Ollama returned HTTP {status}: {body}")]
    OllamaError { status: u16, body: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Could not parse Ollama response: {0}")]
    ResponseParsing(String),
}

/// One chat-completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Ask the backend to constrain output to JSON.
    pub json_mode: bool,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            json_mode: false,
            temperature: None,
        }
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// System prompt only.
    pub fn system(prompt: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::system(prompt)])
    }
}

/// Abstraction over the chat backend.
pub trait LlmClient: Send + Sync {
    /// Run one completion and return the assistant message content.
    fn chat(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

// ═══════════════════════════════════════════════════════════
// Ollama
// ═══════════════════════════════════════════════════════════

/// Ollama HTTP client for local LLM inference (`/api/chat`).
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_connect() {
            LlmError::OllamaConnection(self.base_url.clone())
        } else if e.is_timeout() {
            LlmError::Timeout(self.timeout_secs)
        } else {
            LlmError::HttpClient(e.to_string())
        }
    }
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
}

#[derive(Deserialize)]
struct OllamaChatMessage {
    content: String,
}

impl LlmClient for OllamaClient {
    fn chat(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = OllamaChatRequest {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            format: request.json_mode.then_some("json"),
            options: request.temperature.map(|temperature| OllamaOptions { temperature }),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaChatResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        tracing::debug!(
            model = %self.model,
            chars = parsed.message.content.len(),
            "Ollama chat completed"
        );

        Ok(parsed.message.content)
    }
}

// ═══════════════════════════════════════════════════════════
// Mock
// ═══════════════════════════════════════════════════════════

/// Mock LLM client for testing.
///
/// Replies are served from a script in call order; once the script is
/// exhausted the fallback reply (if any) repeats, otherwise calls fail with
/// a connection error.
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockLlmClient {
    /// Always answers with `response`.
    pub fn new(response: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(response.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers with each response in turn, then fails.
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always fails, as if Ollama were down.
    pub fn unreachable() -> Self {
        Self::scripted(Vec::<String>::new())
    }

    /// Insert a failure at the end of the current script.
    pub fn then_error(self, error: LlmError) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
        self
    }

    /// Append a reply to the script.
    pub fn then_reply(self, response: &str) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(response.to_string()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl LlmClient for MockLlmClient {
    fn chat(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(reply) => reply,
            None => match &self.fallback {
                Some(r) => Ok(r.clone()),
                None => Err(LlmError::OllamaConnection("mock://exhausted".into())),
            },
        }
    }
}

pub mod llm;
pub mod json_recovery;
pub mod vitals;
pub mod extraction;
pub mod rag;
pub mod hypothesis;
pub mod reflection;
pub mod fusion;

pub use extraction::RecordExtractor;
pub use hypothesis::HypothesisGenerator;
pub use llm::{ChatRequest, LlmClient, LlmError, MockLlmClient, OllamaClient};
pub use reflection::ReflectionRefiner;

use serde::{Deserialize, Serialize};

use super::enums::{Language, Role};

/// Agent tag used while no specialist owns the conversation.
pub const ROUTER_AGENT: &str = "router";

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Which decision component handles the next turn.
///
/// Stored as a plain string: `"router"` or the specialty tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActiveAgent {
    Router,
    Specialist(String),
}

impl ActiveAgent {
    pub fn tag(&self) -> &str {
        match self {
            Self::Router => ROUTER_AGENT,
            Self::Specialist(s) => s,
        }
    }

    pub fn specialty(&self) -> Option<&str> {
        match self {
            Self::Router => None,
            Self::Specialist(s) => Some(s),
        }
    }
}

impl From<String> for ActiveAgent {
    fn from(s: String) -> Self {
        let tag = s.trim().to_lowercase();
        if tag.is_empty() || tag == ROUTER_AGENT {
            Self::Router
        } else {
            Self::Specialist(tag)
        }
    }
}

impl From<ActiveAgent> for String {
    fn from(agent: ActiveAgent) -> Self {
        agent.tag().to_string()
    }
}

impl Default for ActiveAgent {
    fn default() -> Self {
        Self::Router
    }
}

/// Conversation state for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub chat_history: Vec<ChatMessage>,
    pub current_agent: ActiveAgent,
    pub asked_questions: Vec<String>,
    pub last_summary: String,
    pub language: Language,
}

impl SessionState {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            ..Self::default()
        }
    }

    /// Trailing `n` messages of the history.
    pub fn window(&self, n: usize) -> &[ChatMessage] {
        let start = self.chat_history.len().saturating_sub(n);
        &self.chat_history[start..]
    }

    /// Content of the most recent assistant message, if any.
    pub fn last_assistant_message(&self) -> Option<&str> {
        self.chat_history
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// All user turns joined with a space.
    pub fn user_transcript(&self) -> String {
        self.chat_history
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Record an asked question. Returns false when it was already asked.
    pub fn remember_question(&mut self, question: &str) -> bool {
        let q = question.trim();
        if q.is_empty() || self.asked_questions.iter().any(|existing| existing == q) {
            return false;
        }
        self.asked_questions.push(q.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_starts_at_router() {
        let state = SessionState::default();
        assert_eq!(state.current_agent, ActiveAgent::Router);
        assert!(state.chat_history.is_empty());
        assert_eq!(state.language, Language::En);
    }

    #[test]
    fn active_agent_serializes_as_tag() {
        let json = serde_json::to_string(&ActiveAgent::Specialist("cardiologo".into())).unwrap();
        assert_eq!(json, "\"cardiologo\"");
        let back: ActiveAgent = serde_json::from_str("\"router\"").unwrap();
        assert_eq!(back, ActiveAgent::Router);
    }

    #[test]
    fn missing_fields_backfill_defaults() {
        let state: SessionState =
            serde_json::from_str(r#"{"chat_history":[{"role":"user","content":"hi"}]}"#).unwrap();
        assert_eq!(state.current_agent, ActiveAgent::Router);
        assert!(state.asked_questions.is_empty());
        assert_eq!(state.chat_history.len(), 1);
    }

    #[test]
    fn window_returns_trailing_messages() {
        let mut state = SessionState::default();
        for i in 0..6 {
            state.chat_history.push(ChatMessage::user(format!("m{i}")));
        }
        let w = state.window(4);
        assert_eq!(w.len(), 4);
        assert_eq!(w[0].content, "m2");
        assert_eq!(state.window(100).len(), 6);
    }

    #[test]
    fn user_transcript_skips_assistant_turns() {
        let mut state = SessionState::default();
        state.chat_history.push(ChatMessage::user("headache"));
        state.chat_history.push(ChatMessage::assistant("since when?"));
        state.chat_history.push(ChatMessage::user("two days"));
        assert_eq!(state.user_transcript(), "headache two days");
        assert_eq!(state.last_assistant_message(), Some("since when?"));
    }

    #[test]
    fn remember_question_rejects_duplicates() {
        let mut state = SessionState::default();
        assert!(state.remember_question("Do you have fever?"));
        assert!(!state.remember_question("Do you have fever?"));
        assert!(!state.remember_question("   "));
        assert_eq!(state.asked_questions.len(), 1);
    }
}

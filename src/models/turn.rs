use serde::{Deserialize, Serialize};

use super::analysis::{Condition, VitalExtract};
use super::patient::PatientRecord;

/// Control command: clear the session.
pub const RESET_COMMAND: &str = "/reset";
/// Control command: skip further questions and run the analysis now.
pub const FORCE_DIAGNOSIS_COMMAND: &str = "/force_diagnosis";

/// One inbound user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    pub session_id: String,
    /// Free-text description of an attached image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl TurnRequest {
    pub fn new(session_id: &str, message: &str) -> Self {
        Self {
            message: message.to_string(),
            session_id: session_id.to_string(),
            image_description: None,
            language: None,
        }
    }
}

/// Outcome of one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub response_text: String,
    pub active_agent: String,
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_vitals: Option<VitalExtract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_record: Option<PatientRecord>,
}

impl TurnResponse {
    pub fn reply(agent: &str, text: impl Into<String>) -> Self {
        Self {
            response_text: text.into(),
            active_agent: agent.to_string(),
            ..Self::default()
        }
    }

    pub fn terminal(agent: &str, text: impl Into<String>) -> Self {
        Self {
            is_final: true,
            ..Self::reply(agent, text)
        }
    }
}

/// Which control command, if any, a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    ForceDiagnosis,
}

impl Command {
    pub fn parse(message: &str) -> Option<Self> {
        match message.trim().to_lowercase().as_str() {
            RESET_COMMAND | "reset" => Some(Self::Reset),
            FORCE_DIAGNOSIS_COMMAND | "/force-diagnosis" | "/diagnose" => {
                Some(Self::ForceDiagnosis)
            }
            _ => None,
        }
    }
}

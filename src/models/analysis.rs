use serde::{Deserialize, Serialize};

use super::enums::{Probability, TriageTier};

/// A candidate condition produced by hypothesis generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub condition: String,
    pub probability: Probability,
    #[serde(default, alias = "rationale")]
    pub reasoning: String,
    #[serde(default)]
    pub treatment: String,
}

impl Condition {
    pub fn new(condition: &str, probability: Probability, reasoning: &str) -> Self {
        Self {
            condition: condition.to_string(),
            probability,
            reasoning: reasoning.to_string(),
            treatment: String::new(),
        }
    }
}

/// Ordered hypotheses plus the corpus documents they were grounded on.
///
/// `error` is set only on the explicit failure path; a result with an error
/// always has an empty condition list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub potential_conditions: Vec<Condition>,
    #[serde(default)]
    pub sources_consulted: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.potential_conditions.is_empty()
    }
}

/// Final bounded output of the fusion engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageRecommendation {
    pub tier: TriageTier,
    pub label: String,
    pub message: String,
}

/// Numeric findings pulled from a specialist's `extracted_data`.
///
/// Lives for a single turn only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalExtract {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pain_score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub systolic: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diastolic: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confusion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respiratory_rate: Option<i64>,
}

impl VitalExtract {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

//! Reflection Refiner and Force-Diagnosis Fallback.
//!
//! Reflection reviews the generated hypotheses against the symptom summary
//! and may correct them, but never loses them: any failure, or an empty
//! answer for a non-empty input, returns the input untouched.

use std::sync::Arc;

use serde_json::json;

use super::json_recovery::parse_conditions;
use super::llm::{ChatRequest, LlmClient};
use crate::models::{AnalysisResult, Language, PatientRecord};

/// Conditions requested from the force-diagnosis fallback.
pub const FALLBACK_CONDITIONS: usize = 3;

const REFLECTION_PROMPT_EN: &str = r#"You are a medical supervisor expert in {specialty}. Review the preliminary JSON analysis ("initial_analysis") based on the summarized symptoms ("symptoms_summary").

Your task is to return a refined JSON. Your rules are:
1. Evaluate the initial analysis: is it correct? Is it relevant to the symptoms? (e.g. "Deformity" for "cough and fever" is WRONG).
2. If the initial analysis is good, return it.
3. If the initial analysis is wrong, irrelevant or incomplete, you MUST correct it or build a new one yourself from the summarized symptoms.
4. If the initial analysis is EMPTY, you MUST propose the most plausible conditions from general medical reasoning on the symptoms.
5. If you create new conditions (e.g. "Acute bronchitis", "Pneumonia"), you MUST format them correctly.

The output MUST be EXCLUSIVELY a JSON object with the key "potential_conditions", a list of objects. Each object MUST have:
- "condition": name of the condition (e.g. "Acute bronchitis").
- "probability": "High", "Medium" or "Low".
- "reasoning": explanation (max 2 sentences) linking the SYMPTOMS to the condition.

Summarized symptoms: {summary}
{record}
Preliminary analysis to review:
```json
{initial}
```
Provide the refined JSON:"#;

const REFLECTION_PROMPT_IT: &str = r#"Sei un supervisore medico esperto in {specialty}. Revisiona l'analisi preliminare JSON ("initial_analysis") basata sui sintomi riassunti ("symptoms_summary").

Il tuo compito è restituire un JSON raffinato. Le tue regole sono:
1. Valuta l'analisi iniziale: è corretta? È pertinente ai sintomi? (es. "Deformità" per "tosse e febbre" è ERRATO).
2. Se l'analisi iniziale è buona, restituiscila.
3. Se l'analisi iniziale è errata, irrilevante o incompleta, DEVI correggerla o crearne una nuova basandoti TU sui sintomi riassunti.
4. Se l'analisi iniziale è VUOTA, DEVI proporre le condizioni più plausibili con un ragionamento medico generale sui sintomi.
5. Se crei nuove condizioni (es. "Bronchite acuta", "Polmonite"), DEVI formattarle correttamente.

Il formato di output DEVE essere ESCLUSIVAMENTE un oggetto JSON con la chiave "potential_conditions", che è una lista di oggetti. Ogni oggetto DEVE avere:
- "condition": nome della condizione (es. "Bronchite acuta").
- "probability": "Alta", "Media" o "Bassa".
- "reasoning": spiegazione (max 2 frasi) che collega i SINTOMI alla condizione.

Sintomi riepilogati: {summary}
{record}
Analisi preliminare da revisionare:
```json
{initial}
```
Fornisci il JSON raffinato:"#;

const FALLBACK_PROMPT_EN: &str = r#"You are a physician specialized in {specialty}. No reference material is available. Based ONLY on the symptoms below, list exactly {count} plausible conditions, most likely first.

Symptoms: {summary}
{record}
Reply ONLY with JSON: {"potential_conditions": [{"condition": "...", "probability": "High|Medium|Low", "reasoning": "max 2 sentences"}]}"#;

const FALLBACK_PROMPT_IT: &str = r#"Sei un medico specializzato in {specialty}. Non è disponibile materiale di riferimento. Basandoti SOLO sui sintomi seguenti, elenca esattamente {count} condizioni plausibili, la più probabile per prima.

Sintomi: {summary}
{record}
Rispondi SOLO con JSON: {"potential_conditions": [{"condition": "...", "probability": "Alta|Media|Bassa", "reasoning": "max 2 frasi"}]}"#;

fn record_block(record: &PatientRecord, lang: Language) -> String {
    if record.is_empty() {
        return String::new();
    }
    let heading = match lang {
        Language::En => "Known patient data:",
        Language::It => "Dati paziente conosciuti:",
    };
    format!("{heading}\n{}\n", record.prompt_context())
}

pub fn reflection_prompt(
    summary: &str,
    initial: &AnalysisResult,
    record: &PatientRecord,
    specialty: &str,
    lang: Language,
) -> String {
    let template = match lang {
        Language::En => REFLECTION_PROMPT_EN,
        Language::It => REFLECTION_PROMPT_IT,
    };
    let initial_json = serde_json::to_string_pretty(&json!({
        "potential_conditions": initial.potential_conditions,
    }))
    .unwrap_or_else(|_| r#"{"potential_conditions": []}"#.to_string());

    template
        .replace("{specialty}", &specialty.to_uppercase())
        .replace("{summary}", summary)
        .replace("{record}", &record_block(record, lang))
        .replace("{initial}", &initial_json)
}

pub struct ReflectionRefiner {
    llm: Arc<dyn LlmClient>,
}

impl ReflectionRefiner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Review `initial` and return the refined result.
    ///
    /// Sources of `initial` are carried over. Returns `initial` unchanged on
    /// any failure, and when the review comes back empty for a non-empty
    /// input.
    pub fn refine(
        &self,
        summary: &str,
        initial: &AnalysisResult,
        record: &PatientRecord,
        specialty: &str,
        lang: Language,
    ) -> AnalysisResult {
        let prompt = reflection_prompt(summary, initial, record, specialty, lang);
        let request = ChatRequest::system(prompt).json().temperature(0.0);

        let raw = match self.llm.chat(&request) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(specialty, error = %e, "Reflection call failed, keeping initial analysis");
                return initial.clone();
            }
        };

        let parsed = match parse_conditions(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(specialty, error = %e, "Reflection output rejected, keeping initial analysis");
                return initial.clone();
            }
        };

        if parsed.conditions.is_empty() && !initial.is_empty() {
            tracing::warn!(
                specialty,
                initial = initial.potential_conditions.len(),
                "Reflection emptied a non-empty analysis, keeping initial analysis"
            );
            return initial.clone();
        }

        tracing::info!(
            specialty,
            before = initial.potential_conditions.len(),
            after = parsed.conditions.len(),
            dropped = parsed.dropped,
            "Analysis refined"
        );
        AnalysisResult {
            potential_conditions: parsed.conditions,
            sources_consulted: initial.sources_consulted.clone(),
            error: None,
        }
    }

    /// Last-resort hypotheses from symptoms alone, without retrieval.
    ///
    /// Best effort: any failure is an empty result.
    pub fn force_hypotheses(
        &self,
        summary: &str,
        record: &PatientRecord,
        specialty: &str,
        lang: Language,
    ) -> AnalysisResult {
        let template = match lang {
            Language::En => FALLBACK_PROMPT_EN,
            Language::It => FALLBACK_PROMPT_IT,
        };
        let prompt = template
            .replace("{specialty}", &specialty.to_uppercase())
            .replace("{count}", &FALLBACK_CONDITIONS.to_string())
            .replace("{summary}", summary)
            .replace("{record}", &record_block(record, lang));
        let request = ChatRequest::system(prompt).json().temperature(0.0);

        let conditions = self
            .llm
            .chat(&request)
            .map_err(|e| e.to_string())
            .and_then(|raw| parse_conditions(&raw).map_err(|e| e.to_string()));

        match conditions {
            Ok(mut parsed) => {
                parsed.conditions.truncate(FALLBACK_CONDITIONS);
                tracing::info!(specialty, conditions = parsed.conditions.len(), "Fallback hypotheses generated");
                AnalysisResult {
                    potential_conditions: parsed.conditions,
                    ..AnalysisResult::default()
                }
            }
            Err(e) => {
                tracing::warn!(specialty, error = %e, "Fallback hypotheses failed");
                AnalysisResult::empty()
            }
        }
    }
}

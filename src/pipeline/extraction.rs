//! Patient record merger.
//!
//! Each user turn goes through a scribe prompt that returns only the facts
//! new in that turn; the delta is then folded into the stored record. A
//! failed extraction leaves the record exactly as it was.

use std::sync::Arc;

use super::json_recovery::{recover_object, JsonRecoveryError};
use super::llm::{ChatRequest, LlmClient, LlmError};
use crate::models::{Language, PatientRecord, PatientRecordDelta};

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Unparseable extraction output: {0}")]
    Parse(#[from] JsonRecoveryError),

    #[error("Extraction output does not match the record schema: {0}")]
    Schema(String),
}

const SCRIBE_PROMPT_EN: &str = r#"You are a medical "Scribe" assistant. Your task is to analyze the last user message and EXTRACT ONLY NEW INFORMATION.

{context}

New user message:
"{user_message}"

Instructions:
1. Identify ONLY NEW or UPDATED information present in this message.
2. DO NOT include old information not mentioned here.
3. If the user answers "Yes", "No" or gives a short answer, USE THE CONTEXT of the previous question.
4. Look specifically for:
   - SYMPTOMS: New symptoms mentioned.
   - DURATION: If specified for the new symptoms.
   - EXCLUSIONS: New negations (e.g., "No fever").
   - MEDICATIONS/ALLERGIES/HISTORY: If mentioned.
   - VITAL SIGNS: Measured values only, under these exact keys: "temperature_celsius" (e.g., 38.5), "pain_score" (0-10), "systolic", "diastolic", "respiratory_rate", "age".

FORMATTING:
- Extract SHORT BUT ARTICULATED PHRASES (max 10-12 words) to preserve context.
- DO NOT fragment information too much.
- CORRECT: ["Severe frontal headache since yesterday", "High fever with chills"]
- WRONG: ["Headache", "Severe", "Yesterday", "Fever", "Chills"]

Respond EXCLUSIVELY with a valid JSON object containing only the found fields (empty lists if nothing found):
{"symptoms": [], "duration": [], "negative_findings": [], "medical_history": [], "medications": [], "allergies": [], "vital_signs": {}, "notes": ""}"#;

const SCRIBE_PROMPT_IT: &str = r#"Sei un assistente medico "Scriba". Il tuo compito è analizzare l'ultimo messaggio dell'utente ed ESTRARRE SOLO NUOVE INFORMAZIONI.

{context}

Nuovo messaggio utente:
"{user_message}"

Istruzioni:
1. Identifica SOLO informazioni NUOVE o AGGIORNATE presenti in questo messaggio.
2. NON includere informazioni vecchie non menzionate qui.
3. Se l'utente risponde "Sì", "No" o dà una risposta breve, USA IL CONTESTO della domanda precedente.
4. Cerca specificamente:
   - SINTOMI: Nuovi sintomi menzionati.
   - DURATA: Se specificata per i nuovi sintomi.
   - ESCLUSIONI: Nuove negazioni (es. "No febbre").
   - FARMACI/ALLERGIE/STORIA: Se menzionati.
   - PARAMETRI VITALI: Solo valori misurati, con queste chiavi esatte: "temperature_celsius" (es. 38.5), "pain_score" (0-10), "systolic", "diastolic", "respiratory_rate", "age".

FORMATTAZIONE:
- Estrai FRASI BREVI MA ARTICOLATE (max 10-12 parole) per preservare il contesto.
- NON frammentare troppo le informazioni.
- CORRETTO: ["Forte mal di testa frontale da ieri", "Febbre alta con brividi"]
- SBAGLIATO: ["Mal di testa", "Forte", "Ieri", "Febbre", "Brividi"]

Rispondi ESCLUSIVAMENTE con un oggetto JSON valido con solo i campi trovati (liste vuote se nulla trovato):
{"symptoms": [], "duration": [], "negative_findings": [], "medical_history": [], "medications": [], "allergies": [], "vital_signs": {}, "notes": ""}"#;

/// Build the scribe prompt for one turn.
pub fn scribe_prompt(user_text: &str, prior_question: Option<&str>, lang: Language) -> String {
    let context = match prior_question.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => format!("Context (Previous Agent Question): \"{q}\""),
        None => String::new(),
    };
    let template = match lang {
        Language::En => SCRIBE_PROMPT_EN,
        Language::It => SCRIBE_PROMPT_IT,
    };
    template
        .replace("{context}", &context)
        .replace("{user_message}", user_text)
}

/// Incremental patient-record extraction.
pub struct RecordExtractor {
    llm: Arc<dyn LlmClient>,
}

impl RecordExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Ask the model for the facts new in this turn.
    pub fn extract_delta(
        &self,
        user_text: &str,
        prior_question: Option<&str>,
        lang: Language,
    ) -> Result<PatientRecordDelta, ExtractionError> {
        let prompt = scribe_prompt(user_text, prior_question, lang);
        let request = ChatRequest::system(prompt).json().temperature(0.0);
        let raw = self.llm.chat(&request)?;

        let (object, path) = recover_object(&raw)?;
        tracing::debug!(?path, "Scribe output recovered");

        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| ExtractionError::Schema(e.to_string()))
    }

    /// Return `record` with this turn's facts merged in.
    ///
    /// Any extraction failure returns the record unchanged.
    pub fn update(
        &self,
        record: &PatientRecord,
        user_text: &str,
        prior_question: Option<&str>,
        lang: Language,
    ) -> PatientRecord {
        match self.extract_delta(user_text, prior_question, lang) {
            Ok(delta) => {
                let mut updated = record.clone();
                updated.merge(&delta);
                tracing::info!(
                    symptoms = updated.symptoms.len(),
                    new_symptoms = updated.symptoms.len() - record.symptoms.len(),
                    "Patient record merged"
                );
                updated
            }
            Err(e) => {
                tracing::warn!(error = %e, "Record extraction failed, keeping previous record");
                record.clone()
            }
        }
    }
}

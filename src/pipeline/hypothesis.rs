//! Hypothesis Generator.
//!
//! Turns retrieved specialty context plus the symptom query into a
//! schema-checked `AnalysisResult`. Malformed output is retried with the
//! parse error fed back to the model; after the last attempt the result is
//! an explicit empty-with-error value. Nothing escapes as an `Err`.

use std::sync::Arc;

use super::json_recovery::parse_conditions;
use super::llm::{ChatRequest, LlmClient};
use super::rag::{RetrievalOutcome, RetrievalPipeline};
use crate::models::{AnalysisResult, ChatMessage, Language};

/// Generation attempts before giving up.
pub const MAX_ATTEMPTS: usize = 2;

const GENERATION_TEMPERATURE: f32 = 0.1;

const HYPOTHESIS_PROMPT_EN: &str = r#"You are an expert medical analyst in {specialty}. Your task is to analyze the USER SYMPTOMS and check whether they match the MEDICAL CONTEXT.

FOLLOW THESE RULES STRICTLY:
1. Read the USER SYMPTOMS first.
2. Read the MEDICAL CONTEXT and look ONLY for conditions that match the user's symptoms (e.g. "productive cough", "fever").
3. If the context talks about different symptoms (e.g. "knee" when the user has "wrist"), you MUST IGNORE those parts of the context.
4. Formulate hypotheses ONLY when you find a direct match between the user's symptoms and the context.

Return your analysis EXCLUSIVELY as JSON with a "potential_conditions" key holding a list of objects. Each object MUST have:
- "condition": name of the condition.
- "probability": "High", "Medium" or "Low".
- "reasoning": explanation (max 2 sentences) grounded in the context, linking the user's symptoms to the condition.

If the context has no condition RELEVANT to the user's specific symptoms, return an empty list: {"potential_conditions": []}.

MEDICAL CONTEXT ({specialty}):
---
{context}
---"#;

const HYPOTHESIS_PROMPT_IT: &str = r#"Sei un esperto analista medico della specializzazione {specialty}. Il tuo compito è analizzare i SINTOMI DELL'UTENTE forniti e vedere se trovano riscontro nel CONTESTO MEDICO.

DEVI SEGUIRE QUESTE REGOLE SCRUPOLOSAMENTE:
1. Leggi prima i SINTOMI DELL'UTENTE.
2. Leggi il CONTESTO MEDICO e cerca SOLO condizioni che corrispondano ai sintomi dell'utente (es. "tosse grassa", "febbre").
3. Se il contesto parla di sintomi diversi (es. "ginocchio" quando l'utente ha "polso"), DEVI IGNORARE quelle parti del contesto.
4. Formula ipotesi SOLO se trovi una corrispondenza diretta tra i sintomi dell'utente e il contesto.

Restituisci la tua analisi ESCLUSIVAMENTE in formato JSON con una chiave "potential_conditions", che è una lista di oggetti. Ogni oggetto DEVE avere:
- "condition": nome della condizione.
- "probability": "Alta", "Media" o "Bassa".
- "reasoning": spiegazione (max 2 frasi) basata sul contesto che spiega come i sintomi dell'utente corrispondono.

Se non trovi condizioni PERTINENTI ai sintomi specifici dell'utente nel contesto, restituisci una lista vuota: {"potential_conditions": []}.

CONTESTO MEDICO FORNITO ({specialty}):
---
{context}
---"#;

fn hypothesis_prompt(context: &str, specialty: &str, lang: Language) -> String {
    let template = match lang {
        Language::En => HYPOTHESIS_PROMPT_EN,
        Language::It => HYPOTHESIS_PROMPT_IT,
    };
    template
        .replace("{specialty}", &specialty.to_uppercase())
        .replace("{context}", context)
}

fn symptoms_message(query: &str, lang: Language) -> String {
    match lang {
        Language::En => format!("USER SYMPTOMS: {query}"),
        Language::It => format!("SINTOMI DELL'UTENTE: {query}"),
    }
}

/// Corrective note appended to the system prompt on a retry.
pub fn corrective_feedback(error: &str, lang: Language) -> String {
    match lang {
        Language::En => format!(
            "\n\nYOUR PREVIOUS ANSWER WAS REJECTED: {error}. Reply with ONLY the JSON object {{\"potential_conditions\": [...]}}, every item an object with \"condition\", \"probability\" and \"reasoning\"."
        ),
        Language::It => format!(
            "\n\nLA TUA RISPOSTA PRECEDENTE È STATA RIFIUTATA: {error}. Rispondi SOLO con l'oggetto JSON {{\"potential_conditions\": [...]}}, ogni elemento un oggetto con \"condition\", \"probability\" e \"reasoning\"."
        ),
    }
}

/// Retry bookkeeping: attempts used and the last rejection reason.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RetryState {
    pub attempt: usize,
    pub last_error: Option<String>,
}

impl RetryState {
    pub fn exhausted(&self) -> bool {
        self.attempt >= MAX_ATTEMPTS
    }

    /// System prompt for the next attempt.
    pub fn prompt(&self, base: &str, lang: Language) -> String {
        match &self.last_error {
            Some(e) => format!("{base}{}", corrective_feedback(e, lang)),
            None => base.to_string(),
        }
    }

    pub fn record_failure(&mut self, error: String) {
        self.attempt += 1;
        self.last_error = Some(error);
    }
}

pub struct HypothesisGenerator {
    llm: Arc<dyn LlmClient>,
}

impl HypothesisGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Generate hypotheses from an already-assembled context.
    pub fn generate(&self, context: &str, query: &str, specialty: &str, lang: Language) -> AnalysisResult {
        let base = hypothesis_prompt(context, specialty, lang);
        let mut state = RetryState::default();

        while !state.exhausted() {
            let request = ChatRequest::new(vec![
                ChatMessage::system(state.prompt(&base, lang)),
                ChatMessage::user(symptoms_message(query, lang)),
            ])
            .json()
            .temperature(GENERATION_TEMPERATURE);

            let raw = match self.llm.chat(&request) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(specialty, attempt = state.attempt + 1, error = %e, "Hypothesis call failed");
                    state.record_failure(e.to_string());
                    continue;
                }
            };

            match parse_conditions(&raw) {
                Ok(parsed) => {
                    tracing::info!(
                        specialty,
                        attempt = state.attempt + 1,
                        conditions = parsed.conditions.len(),
                        dropped = parsed.dropped,
                        path = ?parsed.path,
                        "Hypotheses generated"
                    );
                    return AnalysisResult {
                        potential_conditions: parsed.conditions,
                        ..AnalysisResult::default()
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        specialty,
                        attempt = state.attempt + 1,
                        error = %e,
                        raw = %raw.chars().take(200).collect::<String>(),
                        "Hypothesis output rejected"
                    );
                    state.record_failure(e.to_string());
                }
            }
        }

        let reason = state
            .last_error
            .unwrap_or_else(|| "hypothesis generation failed".to_string());
        tracing::error!(specialty, attempts = state.attempt, error = %reason, "Hypothesis retries exhausted");
        AnalysisResult::failed(reason)
    }

    /// Retrieve specialty context for `query` and generate from it.
    ///
    /// Retrieval failure is an `AnalysisResult` with `error` set; an empty
    /// retrieval is an empty result without a generation call.
    pub fn analyze(
        &self,
        retrieval: &RetrievalPipeline,
        specialty: &str,
        query: &str,
        lang: Language,
    ) -> AnalysisResult {
        let outcome: RetrievalOutcome = match retrieval.retrieve(specialty, query) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(specialty, error = %e, "Retrieval failed");
                return AnalysisResult::failed(e.to_string());
            }
        };

        if outcome.is_empty() {
            return AnalysisResult::empty();
        }

        let mut result = self.generate(&outcome.context, query, specialty, lang);
        if result.error.is_none() {
            result.sources_consulted = outcome.sources;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Probability;
    use crate::pipeline::llm::{LlmError, MockLlmClient};
    use crate::pipeline::rag::{
        InMemoryCorpus, InMemoryVectorSearch, LexicalReranker, MockEmbedder, Passage,
        EmbeddingModel,
    };

    fn generator(mock: MockLlmClient) -> (HypothesisGenerator, Arc<MockLlmClient>) {
        let mock = Arc::new(mock);
        (HypothesisGenerator::new(mock.clone()), mock)
    }

    #[test]
    fn valid_first_answer_needs_one_call() {
        let (g, mock) = generator(MockLlmClient::new(
            r#"{"potential_conditions": [{"condition": "Urticaria", "probability": "Alta", "reasoning": "wheals"}]}"#,
        ));
        let result = g.generate("ctx", "itchy wheals", "allergologo", Language::It);
        assert_eq!(result.potential_conditions.len(), 1);
        assert_eq!(result.potential_conditions[0].probability, Probability::High);
        assert!(result.error.is_none());
        assert_eq!(mock.call_count(), 1);

        let req = &mock.requests()[0];
        assert!(req.json_mode);
        assert_eq!(req.temperature, Some(GENERATION_TEMPERATURE));
        assert!(req.messages[0].content.contains("ALLERGOLOGO"));
        assert_eq!(req.messages[1].content, "SINTOMI DELL'UTENTE: itchy wheals");
    }

    #[test]
    fn retry_appends_previous_error() {
        let (g, mock) = generator(MockLlmClient::scripted([
            "I think it is urticaria.",
            r#"{"analysis": {"potential_conditions": [{"condition": "Urticaria", "probability": "Low"}]}}"#,
        ]));
        let result = g.generate("ctx", "rash", "allergologo", Language::En);
        assert_eq!(result.potential_conditions.len(), 1);
        assert_eq!(mock.call_count(), 2);

        let requests = mock.requests();
        assert!(!requests[0].messages[0].content.contains("REJECTED"));
        assert!(requests[1].messages[0]
            .content
            .contains("YOUR PREVIOUS ANSWER WAS REJECTED: No JSON object found"));
    }

    #[test]
    fn exhausted_retries_return_explicit_error() {
        let (g, mock) = generator(MockLlmClient::new(r#"{"potential_conditions": ["Flu", 3]}"#));
        let result = g.generate("ctx", "fever", "allergologo", Language::En);
        assert!(result.potential_conditions.is_empty());
        assert_eq!(result.error.as_deref(), Some("All 2 condition items failed validation"));
        assert_eq!(mock.call_count(), MAX_ATTEMPTS);
    }

    #[test]
    fn transport_error_counts_as_attempt() {
        let (g, mock) = generator(
            MockLlmClient::new(r#"{"potential_conditions": []}"#)
                .then_error(LlmError::Timeout(120)),
        );
        let result = g.generate("ctx", "fever", "cardiologo", Language::En);
        assert!(result.error.is_none());
        assert!(result.potential_conditions.is_empty());
        assert_eq!(mock.call_count(), 2);
        assert!(mock.requests()[1].messages[0].content.contains("timed out"));
    }

    #[test]
    fn retry_state_machine() {
        let mut state = RetryState::default();
        assert_eq!(state.prompt("base", Language::En), "base");
        state.record_failure("bad".into());
        assert!(!state.exhausted());
        assert!(state.prompt("base", Language::It).starts_with("base\n\nLA TUA RISPOSTA"));
        state.record_failure("worse".into());
        assert!(state.exhausted());
        assert_eq!(state.last_error.as_deref(), Some("worse"));
    }

    fn retrieval(corpus: InMemoryCorpus) -> RetrievalPipeline {
        RetrievalPipeline::new(
            Arc::new(corpus),
            Arc::new(MockEmbedder::with_dimension(8)),
            Arc::new(LexicalReranker::new()),
            30,
            10,
        )
    }

    #[test]
    fn analyze_attaches_sources() {
        let embedder = MockEmbedder::with_dimension(8);
        let text = "Urticaria: itchy wheals";
        let store = InMemoryVectorSearch::from_passages(vec![Passage {
            id: "p1".into(),
            source: "urticaria.pdf".into(),
            text: text.into(),
            embedding: embedder.embed(text).unwrap(),
        }])
        .unwrap();
        let pipeline = retrieval(InMemoryCorpus::new().with_partition("allergologo", store));

        let (g, mock) = generator(MockLlmClient::new(
            r#"{"potential_conditions": [{"condition": "Urticaria", "probability": "Media", "reasoning": "r"}]}"#,
        ));
        let result = g.analyze(&pipeline, "allergologo", "itchy wheals", Language::En);
        assert_eq!(result.sources_consulted, vec!["urticaria.pdf"]);
        assert!(mock.requests()[0].messages[0].content.contains(text));
    }

    #[test]
    fn analyze_missing_partition_is_error_without_generation() {
        let pipeline = retrieval(InMemoryCorpus::new());
        let (g, mock) = generator(MockLlmClient::unreachable());
        let result = g.analyze(&pipeline, "cardiologo", "chest pain", Language::En);
        assert!(result.is_empty());
        assert!(result.error.unwrap().contains("cardiologo"));
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn analyze_empty_partition_skips_generation() {
        let pipeline = retrieval(
            InMemoryCorpus::new().with_partition("cardiologo", InMemoryVectorSearch::new()),
        );
        let (g, mock) = generator(MockLlmClient::unreachable());
        let result = g.analyze(&pipeline, "cardiologo", "chest pain", Language::En);
        assert_eq!(result, AnalysisResult::empty());
        assert_eq!(mock.call_count(), 0);
    }
}

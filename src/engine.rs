//! Turn engine: the per-session state machine.
//!
//! One call to [`TurnEngine::handle`] processes one user turn to completion:
//! control commands, record merging, dispatch to the router or the active
//! specialist, and the triage pipeline (retrieval, generation, reflection,
//! fusion) when a specialist asks for it. Terminal outcomes reset the
//! session.

use std::sync::Arc;

use serde_json::Value;

use crate::agents::router::ROUTER_WINDOW;
use crate::agents::{RouterAgent, RouterDecision, SpecialistAgent, SpecialistDecision, SpecialtyRegistry};
use crate::config::{DurationThresholds, SafetyThresholds, TriageConfig};
use crate::messages::{self, capitalize, report_labels, UiMessage};
use crate::models::{
    ActiveAgent, AnalysisResult, ChatMessage, Command, Condition, Language, TriageRecommendation,
    TurnRequest, TurnResponse, VitalExtract, ROUTER_AGENT,
};
use crate::pipeline::fusion::{fuse, present};
use crate::pipeline::llm::LlmClient;
use crate::pipeline::rag::query::build_query;
use crate::pipeline::rag::RetrievalPipeline;
use crate::pipeline::vitals::{extract_vitals, symbolic_findings};
use crate::pipeline::{HypothesisGenerator, RecordExtractor, ReflectionRefiner};
use crate::session::{SessionDocument, SessionError, SessionHandle};

pub struct TurnEngine {
    extractor: RecordExtractor,
    router: RouterAgent,
    specialist: SpecialistAgent,
    generator: HypothesisGenerator,
    refiner: ReflectionRefiner,
    retrieval: RetrievalPipeline,
    safety: SafetyThresholds,
    durations: DurationThresholds,
    default_language: Language,
}

impl TurnEngine {
    /// Build every component over one LLM client. Available specialties are
    /// the corpus partitions.
    pub fn new(llm: Arc<dyn LlmClient>, retrieval: RetrievalPipeline, config: &TriageConfig) -> Self {
        let registry = SpecialtyRegistry::new(retrieval.specialties());
        if registry.is_empty() {
            tracing::warn!("No corpus partitions found, every routing attempt will fail");
        } else {
            tracing::info!(specialties = ?registry.available(), "Specialties available");
        }

        Self {
            extractor: RecordExtractor::new(llm.clone()),
            router: RouterAgent::new(llm.clone(), registry),
            specialist: SpecialistAgent::new(llm.clone()),
            generator: HypothesisGenerator::new(llm.clone()),
            refiner: ReflectionRefiner::new(llm),
            retrieval,
            safety: config.safety,
            durations: config.duration,
            default_language: Language::resolve(Some(&config.default_language), Language::En),
        }
    }

    pub fn specialties(&self) -> &[String] {
        self.router.registry().available()
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    /// Process one turn on a locked session and persist the result.
    ///
    /// Blocking: runs model calls and repository I/O.
    pub fn handle(&self, session: &mut SessionHandle, request: &TurnRequest) -> Result<TurnResponse, SessionError> {
        let requested = request.language.as_deref();
        let doc = session.document(Language::resolve(requested, self.default_language))?;
        if requested.is_some() {
            doc.state.language = Language::resolve(requested, doc.state.language);
        }

        let response = self.process(doc, request);
        tracing::info!(
            session = %session.session_id(),
            agent = %response.active_agent,
            is_final = response.is_final,
            "Turn processed"
        );
        session.commit()?;
        Ok(response)
    }

    fn process(&self, doc: &mut SessionDocument, request: &TurnRequest) -> TurnResponse {
        let lang = doc.state.language;

        match Command::parse(&request.message) {
            Some(Command::Reset) => {
                doc.reset();
                return TurnResponse::reply(ROUTER_AGENT, messages::ui(lang, UiMessage::SessionReset));
            }
            Some(Command::ForceDiagnosis) => return self.force_diagnosis(doc),
            None => {}
        }

        let Some(user_text) = compose_user_text(&request.message, request.image_description.as_deref()) else {
            return TurnResponse::reply(
                doc.state.current_agent.tag(),
                messages::ui(lang, UiMessage::ClarifySymptoms),
            );
        };

        let prior_question = doc.state.last_assistant_message().map(str::to_string);
        doc.record = self
            .extractor
            .update(&doc.record, &user_text, prior_question.as_deref(), lang);
        doc.state.chat_history.push(ChatMessage::user(user_text));

        let response = match doc.state.current_agent.clone() {
            ActiveAgent::Router => self.route(doc),
            ActiveAgent::Specialist(specialty) => self.consult(doc, &specialty),
        };

        if response.is_final {
            doc.reset();
        } else {
            doc.state
                .chat_history
                .push(ChatMessage::assistant(response.response_text.clone()));
        }
        response
    }

    fn route(&self, doc: &mut SessionDocument) -> TurnResponse {
        let lang = doc.state.language;
        let decision = self
            .router
            .decide(doc.state.window(ROUTER_WINDOW), &doc.record, lang);

        match decision {
            RouterDecision::AskGeneralFollowup { question } => TurnResponse::reply(ROUTER_AGENT, question),
            RouterDecision::RouteToSpecialist { specialist, summary } => {
                tracing::info!(specialist = %specialist, "Handing off to specialist");
                let handoff = messages::connecting_specialist(lang, &specialist);
                doc.state.current_agent = ActiveAgent::Specialist(specialist.clone());
                doc.state.last_summary = summary;
                TurnResponse::reply(&specialist, handoff)
            }
            RouterDecision::CannotRoute { message } => TurnResponse::terminal(ROUTER_AGENT, message),
        }
    }

    fn consult(&self, doc: &mut SessionDocument, specialty: &str) -> TurnResponse {
        match self.specialist.decide(specialty, &doc.state, &doc.record) {
            SpecialistDecision::AskFollowup { question } => {
                doc.state.remember_question(&question);
                TurnResponse::reply(specialty, question)
            }
            SpecialistDecision::PerformTriage { summary, vitals } => {
                doc.state.last_summary = summary.clone();
                self.triage(doc, specialty, &summary, vitals)
            }
        }
    }

    fn force_diagnosis(&self, doc: &mut SessionDocument) -> TurnResponse {
        let lang = doc.state.language;
        let Some(specialty) = doc.state.current_agent.specialty().map(str::to_string) else {
            return TurnResponse::reply(ROUTER_AGENT, messages::ui(lang, UiMessage::ForceDiagnosisUnavailable));
        };

        let mut summary = doc.state.user_transcript();
        if summary.is_empty() {
            summary = doc.state.last_summary.clone();
        }
        // No specialist extraction on this path; recorded vitals stand in.
        let vitals = extract_vitals(&Value::Object(doc.record.vital_signs.clone()));

        tracing::info!(specialty = %specialty, "Forced diagnosis");
        let response = self.triage(doc, &specialty, &summary, vitals);
        doc.reset();
        response
    }

    fn triage(&self, doc: &SessionDocument, specialty: &str, summary: &str, vitals: VitalExtract) -> TurnResponse {
        let lang = doc.state.language;
        let query = build_query(&doc.record, summary);
        tracing::info!(specialty, query = %query, "Running triage");

        let analysis = self.analysis(doc, specialty, summary, &query);
        let recommendation = fuse(&vitals, &analysis, &self.safety, lang);
        let conditions = present(&analysis.potential_conditions);
        let findings = if vitals.is_empty() {
            Vec::new()
        } else {
            symbolic_findings(&vitals, &self.durations, lang)
        };

        let text = render_report(
            &recommendation,
            &findings,
            &conditions,
            &analysis.sources_consulted,
            specialty,
            lang,
        );

        TurnResponse {
            response_text: text,
            active_agent: specialty.to_string(),
            is_final: true,
            conditions: Some(conditions),
            sources: Some(analysis.sources_consulted),
            extracted_vitals: (!vitals.is_empty()).then_some(vitals),
            patient_record: Some(doc.record.clone()),
        }
    }

    /// Retrieval-backed hypotheses, refined; generated from symptoms alone
    /// when retrieval found nothing. An errored analysis is fused as is.
    fn analysis(&self, doc: &SessionDocument, specialty: &str, summary: &str, query: &str) -> AnalysisResult {
        let lang = doc.state.language;
        let initial = self.generator.analyze(&self.retrieval, specialty, query, lang);
        if let Some(error) = &initial.error {
            tracing::warn!(specialty, error = %error, "Analysis failed, fusing without hypotheses");
            return initial;
        }

        let refined = self
            .refiner
            .refine(summary, &initial, &doc.record, specialty, lang);
        if !refined.is_empty() {
            return refined;
        }

        let mut fallback = self.refiner.force_hypotheses(summary, &doc.record, specialty, lang);
        fallback.sources_consulted = refined.sources_consulted;
        fallback
    }
}

/// User message with the image descriptor appended; `None` if both are blank.
fn compose_user_text(message: &str, image_description: Option<&str>) -> Option<String> {
    let message = message.trim();
    let image = image_description.map(str::trim).filter(|d| !d.is_empty());
    match (message.is_empty(), image) {
        (true, None) => None,
        (true, Some(d)) => Some(format!("[Image: {d}]")),
        (false, None) => Some(message.to_string()),
        (false, Some(d)) => Some(format!("{message}\n[Image: {d}]")),
    }
}

/// Markdown body of a final triage answer.
pub fn render_report(
    recommendation: &TriageRecommendation,
    findings: &[String],
    conditions: &[Condition],
    sources: &[String],
    specialty: &str,
    lang: Language,
) -> String {
    let labels = report_labels(lang);
    let mut out = format!("**{}**\n\n{}", recommendation.label, recommendation.message);

    if !findings.is_empty() {
        out.push_str(&format!("\n\n---\n### {}\n", labels.symbolic_heading));
        for line in findings {
            out.push_str(&format!("- {line}\n"));
        }
    }

    if !conditions.is_empty() {
        out.push_str(&format!("\n\n---\n### {}\n", labels.hypotheses_heading));
        out.push_str(&format!(
            "*{}*\n",
            labels.hypotheses_intro.replace("{specialty}", &capitalize(specialty))
        ));
        for c in conditions {
            let reasoning = if c.reasoning.trim().is_empty() { "N/A" } else { c.reasoning.trim() };
            out.push_str(&format!(
                "\n- **{}** ({}: {})\n  - *{}:* {}\n",
                c.condition, labels.probability, c.probability, labels.reasoning, reasoning
            ));
            if !c.treatment.trim().is_empty() {
                out.push_str(&format!("  - *{}:* {}\n", labels.treatment, c.treatment.trim()));
            }
        }
        if !sources.is_empty() {
            out.push_str(&format!("\n*{}: {}*\n", labels.sources, sources.join(", ")));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Probability, TriageTier};
    use crate::pipeline::llm::MockLlmClient;
    use crate::pipeline::rag::{EmbeddingModel, InMemoryCorpus, InMemoryVectorSearch, LexicalReranker, MockEmbedder, Passage};

    const EMPTY_DELTA: &str = "{}";

    fn corpus_with(specialty: &str, source: &str, text: &str) -> InMemoryCorpus {
        let embedder = MockEmbedder::with_dimension(8);
        let store = InMemoryVectorSearch::from_passages(vec![Passage {
            id: "p1".into(),
            source: source.into(),
            text: text.into(),
            embedding: embedder.embed(text).unwrap(),
        }])
        .unwrap();
        InMemoryCorpus::new().with_partition(specialty, store)
    }

    fn engine(mock: MockLlmClient, corpus: InMemoryCorpus) -> (TurnEngine, Arc<MockLlmClient>) {
        let mock = Arc::new(mock);
        let retrieval = RetrievalPipeline::new(
            Arc::new(corpus),
            Arc::new(MockEmbedder::with_dimension(8)),
            Arc::new(LexicalReranker::new()),
            30,
            10,
        );
        let engine = TurnEngine::new(mock.clone(), retrieval, &TriageConfig::default());
        (engine, mock)
    }

    fn on_specialist(specialty: &str) -> SessionDocument {
        let mut doc = SessionDocument::new(Language::En);
        doc.state.current_agent = ActiveAgent::Specialist(specialty.into());
        doc.state.chat_history.push(ChatMessage::user("Chest pain when climbing stairs"));
        doc.state.chat_history.push(ChatMessage::assistant("How long does it last?"));
        doc
    }

    #[test]
    fn router_followup_is_recorded_in_history() {
        let (engine, mock) = engine(
            MockLlmClient::scripted([
                r#"{"symptoms": ["Headache"]}"#,
                r#"{"action": "ask_general_followup", "question": "Since when?"}"#,
            ]),
            corpus_with("neurologo", "headache.pdf", "Tension headache"),
        );
        let mut doc = SessionDocument::new(Language::En);
        let response = engine.process(&mut doc, &TurnRequest::new("s1", "I have a headache"));

        assert_eq!(response.response_text, "Since when?");
        assert_eq!(response.active_agent, ROUTER_AGENT);
        assert!(!response.is_final);
        assert_eq!(doc.record.symptoms, vec!["Headache"]);
        assert_eq!(doc.state.chat_history.len(), 2);
        assert_eq!(mock.call_count(), 2);
    }

    #[test]
    fn routing_hands_off_to_specialist() {
        let (engine, _) = engine(
            MockLlmClient::scripted([
                EMPTY_DELTA,
                r#"{"action": "route_to_specialist", "specialist": "Cardiology", "summary": "exertional chest pain"}"#,
            ]),
            corpus_with("cardiologo", "angina.pdf", "Stable angina"),
        );
        let mut doc = SessionDocument::new(Language::En);
        let response = engine.process(&mut doc, &TurnRequest::new("s1", "chest pain on stairs"));

        assert_eq!(response.active_agent, "cardiologo");
        assert!(response.response_text.contains("**Cardiologo**"));
        assert_eq!(doc.state.current_agent, ActiveAgent::Specialist("cardiologo".into()));
        assert_eq!(doc.state.last_summary, "exertional chest pain");
    }

    #[test]
    fn cannot_route_ends_the_conversation() {
        let (engine, _) = engine(
            MockLlmClient::scripted([EMPTY_DELTA, r#"{"action": "route_to_specialist", "specialist": "oncologo"}"#]),
            corpus_with("cardiologo", "angina.pdf", "Stable angina"),
        );
        let mut doc = SessionDocument::new(Language::En);
        let response = engine.process(&mut doc, &TurnRequest::new("s1", "something odd"));

        assert!(response.is_final);
        assert!(response.response_text.contains("Cardiologo"));
        assert!(doc.state.chat_history.is_empty());
    }

    #[test]
    fn specialist_question_is_remembered() {
        let (engine, _) = engine(
            MockLlmClient::scripted([
                EMPTY_DELTA,
                r#"{"action": "ask_specialist_followup", "reasoning": "r", "question": "Does it radiate to the arm?"}"#,
            ]),
            corpus_with("cardiologo", "angina.pdf", "Stable angina"),
        );
        let mut doc = on_specialist("cardiologo");
        let response = engine.process(&mut doc, &TurnRequest::new("s1", "a few minutes"));

        assert_eq!(response.response_text, "Does it radiate to the arm?");
        assert_eq!(doc.state.asked_questions, vec!["Does it radiate to the arm?"]);
        assert_eq!(doc.state.last_assistant_message(), Some("Does it radiate to the arm?"));
    }

    #[test]
    fn severe_pain_is_urgent_even_without_partition() {
        let (engine, mock) = engine(
            MockLlmClient::scripted([
                EMPTY_DELTA,
                r#"{"action": "perform_triage", "summary": "Crushing chest pain since this morning", "extracted_data": {"pain_score": 9}}"#,
            ]),
            InMemoryCorpus::new(),
        );
        let mut doc = on_specialist("cardiologo");
        let response = engine.process(&mut doc, &TurnRequest::new("s1", "it is unbearable"));

        assert!(response.is_final);
        assert!(response.response_text.starts_with("**Urgent Care (High Risk)**"));
        assert_eq!(response.conditions, Some(vec![]));
        assert_eq!(response.extracted_vitals.as_ref().and_then(|v| v.pain_score), Some(9));
        assert!(response.response_text.contains("Symbolic data analysis"));
        assert_eq!(mock.call_count(), 2);
        assert_eq!(doc.state.current_agent, ActiveAgent::Router);
        assert!(doc.state.chat_history.is_empty());
    }

    #[test]
    fn full_triage_presents_refined_hypotheses_with_sources() {
        let (engine, mock) = engine(
            MockLlmClient::scripted([
                EMPTY_DELTA,
                r#"{"action": "perform_triage", "summary": "Exertional chest pain for two weeks", "extracted_data": {}}"#,
                r#"{"potential_conditions": [{"condition": "Stable angina", "probability": "Medium", "reasoning": "exertional"}]}"#,
                r#"{"potential_conditions": [
                    {"condition": "GERD", "probability": "Low", "reasoning": "possible"},
                    {"condition": "Stable angina", "probability": "High", "reasoning": "exertional, relieved by rest", "treatment": "Cardiology visit"}
                ]}"#,
            ]),
            corpus_with("cardiologo", "angina.pdf", "Stable angina: exertional chest pain"),
        );
        let mut doc = on_specialist("cardiologo");
        let response = engine.process(&mut doc, &TurnRequest::new("s1", "about two weeks"));

        assert_eq!(mock.call_count(), 4);
        assert!(response.is_final);
        let conditions = response.conditions.unwrap();
        assert_eq!(conditions[0].condition, "Stable angina");
        assert_eq!(conditions[0].probability, Probability::High);
        assert_eq!(response.sources, Some(vec!["angina.pdf".to_string()]));
        assert!(response.response_text.starts_with("**Urgent Care (High Risk)**"));
        assert!(response.response_text.contains("Preliminary hypotheses (not a diagnosis)"));
        assert!(response.response_text.contains("*Treatment:* Cardiology visit"));
        assert!(response.response_text.contains("*Sources: angina.pdf*"));
        assert!(response.extracted_vitals.is_none());
    }

    #[test]
    fn empty_analysis_falls_back_to_symptom_only_hypotheses() {
        let (engine, mock) = engine(
            MockLlmClient::scripted([
                EMPTY_DELTA,
                r#"{"action": "perform_triage", "summary": "Exertional chest pain for two weeks"}"#,
                r#"{"potential_conditions": []}"#,
                r#"{"potential_conditions": []}"#,
                r#"{"potential_conditions": [{"condition": "Stable angina", "probability": "Low", "reasoning": "r"}]}"#,
            ]),
            corpus_with("cardiologo", "angina.pdf", "Stable angina"),
        );
        let mut doc = on_specialist("cardiologo");
        let response = engine.process(&mut doc, &TurnRequest::new("s1", "two weeks"));

        assert_eq!(mock.call_count(), 5);
        assert_eq!(response.conditions.unwrap().len(), 1);
        assert!(response.response_text.starts_with("**Self-Care (Low Risk)**"));
    }

    #[test]
    fn force_diagnosis_requires_specialist() {
        let (engine, mock) = engine(MockLlmClient::unreachable(), InMemoryCorpus::new());
        let mut doc = SessionDocument::new(Language::It);
        let response = engine.process(&mut doc, &TurnRequest::new("s1", "/force_diagnosis"));

        assert_eq!(
            response.response_text,
            "Devi essere in contatto con uno specialista per forzare una diagnosi."
        );
        assert!(!response.is_final);
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn force_diagnosis_runs_fusion_and_resets() {
        let (engine, mock) = engine(MockLlmClient::unreachable(), InMemoryCorpus::new());
        let mut doc = on_specialist("cardiologo");
        doc.record
            .vital_signs
            .insert("temperature_celsius".into(), serde_json::json!(40.2));
        let response = engine.process(&mut doc, &TurnRequest::new("s1", "/force_diagnosis"));

        assert!(response.is_final);
        assert_eq!(response.active_agent, "cardiologo");
        assert!(response.response_text.starts_with("**Urgent Care (High Risk)**"));
        assert_eq!(mock.call_count(), 0);
        assert!(doc.record.is_empty());
        assert_eq!(doc.state.current_agent, ActiveAgent::Router);
    }

    #[test]
    fn scribed_vitals_drive_forced_triage() {
        let (engine, mock) = engine(
            MockLlmClient::scripted([
                r#"{"symptoms": ["Throbbing pain in the chest"], "vital_signs": {"pain": 8}}"#,
                r#"{"action": "ask_specialist_followup", "reasoning": "r", "question": "Does it radiate?"}"#,
            ]),
            InMemoryCorpus::new(),
        );
        let mut doc = on_specialist("cardiologo");
        engine.process(&mut doc, &TurnRequest::new("s1", "the pain is 8 out of 10"));
        assert_eq!(doc.record.vital_signs["pain"], serde_json::json!(8));

        let response = engine.process(&mut doc, &TurnRequest::new("s1", "/force_diagnosis"));
        assert!(response.is_final);
        assert!(response.response_text.starts_with("**Contact Doctor (Medium Risk)**"));
        assert_eq!(response.extracted_vitals.unwrap().pain_score, Some(8));
        assert_eq!(mock.call_count(), 2);
    }

    #[test]
    fn scribed_temperature_synonym_forces_urgent_care() {
        let (engine, _) = engine(
            MockLlmClient::scripted([
                r#"{"vital_signs": {"temperature": "40,5"}}"#,
                r#"{"action": "ask_specialist_followup", "reasoning": "r", "question": "Any chills?"}"#,
            ]),
            InMemoryCorpus::new(),
        );
        let mut doc = on_specialist("cardiologo");
        engine.process(&mut doc, &TurnRequest::new("s1", "I measured 40.5"));
        let response = engine.process(&mut doc, &TurnRequest::new("s1", "/force_diagnosis"));

        assert!(response.response_text.starts_with("**Urgent Care (High Risk)**"));
        assert!(doc.record.is_empty());
    }

    #[test]
    fn reset_command_clears_session() {
        let (engine, mock) = engine(MockLlmClient::unreachable(), InMemoryCorpus::new());
        let mut doc = on_specialist("cardiologo");
        doc.record.symptoms.push("Chest pain".into());
        let response = engine.process(&mut doc, &TurnRequest::new("s1", "/reset"));

        assert_eq!(response.response_text, "Conversation and data reset.");
        assert!(doc.record.is_empty());
        assert!(doc.state.chat_history.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn image_description_is_appended_to_user_turn() {
        let (engine, mock) = engine(
            MockLlmClient::scripted([
                EMPTY_DELTA,
                r#"{"action": "ask_general_followup", "question": "Does it itch?"}"#,
            ]),
            InMemoryCorpus::new(),
        );
        let mut doc = SessionDocument::new(Language::En);
        let mut request = TurnRequest::new("s1", "look at this");
        request.image_description = Some("red rash on forearm".into());
        engine.process(&mut doc, &request);

        assert_eq!(doc.state.chat_history[0].content, "look at this\n[Image: red rash on forearm]");
        assert!(mock.requests()[0].messages[0].content.contains("[Image: red rash on forearm]"));
    }

    #[test]
    fn extraction_failure_keeps_record_and_continues() {
        let (engine, _) = engine(
            MockLlmClient::scripted([
                "not json at all",
                r#"{"action": "ask_general_followup", "question": "Where does it hurt?"}"#,
            ]),
            InMemoryCorpus::new(),
        );
        let mut doc = SessionDocument::new(Language::En);
        doc.record.symptoms.push("Fatigue".into());
        let response = engine.process(&mut doc, &TurnRequest::new("s1", "it hurts"));

        assert_eq!(response.response_text, "Where does it hurt?");
        assert_eq!(doc.record.symptoms, vec!["Fatigue"]);
    }

    #[test]
    fn blank_message_asks_again_without_model_calls() {
        let (engine, mock) = engine(MockLlmClient::unreachable(), InMemoryCorpus::new());
        let mut doc = SessionDocument::new(Language::En);
        let response = engine.process(&mut doc, &TurnRequest::new("s1", "   "));
        assert_eq!(response.response_text, "Could you describe your symptoms better?");
        assert!(doc.state.chat_history.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn handle_persists_turn_and_applies_language() {
        use crate::session::{InMemoryRepository, SessionRepository, SessionStore};
        use std::time::Duration;

        let repo = Arc::new(InMemoryRepository::new());
        let store = SessionStore::new(repo.clone(), Duration::from_secs(1), Duration::from_secs(60));
        let (engine, _) = engine(
            MockLlmClient::scripted([
                EMPTY_DELTA,
                r#"{"action": "ask_general_followup", "question": "Da quanto tempo?"}"#,
            ]),
            InMemoryCorpus::new(),
        );

        let mut handle = store.acquire("s1").await.unwrap();
        let mut request = TurnRequest::new("s1", "ho la tosse");
        request.language = Some("it".into());
        let response = engine.handle(&mut handle, &request).unwrap();
        drop(handle);

        assert_eq!(response.response_text, "Da quanto tempo?");
        let saved = repo.load("s1").unwrap().unwrap();
        assert_eq!(saved.state.language, Language::It);
        assert_eq!(saved.state.chat_history.len(), 2);
    }

    #[test]
    fn report_without_hypotheses_is_label_and_message() {
        let rec = TriageRecommendation {
            tier: TriageTier::InsufficientInfo,
            label: "Insufficient Information".into(),
            message: "More detail needed.".into(),
        };
        assert_eq!(
            render_report(&rec, &[], &[], &[], "cardiologo", Language::En),
            "**Insufficient Information**\n\nMore detail needed."
        );
    }

    #[test]
    fn compose_user_text_cases() {
        assert_eq!(compose_user_text("  ", None), None);
        assert_eq!(compose_user_text("", Some(" ")), None);
        assert_eq!(compose_user_text("", Some("mole")), Some("[Image: mole]".into()));
        assert_eq!(compose_user_text(" cough ", None), Some("cough".into()));
    }
}

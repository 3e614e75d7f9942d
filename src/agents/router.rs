use std::sync::Arc;

use serde::Deserialize;

use super::specialties::SpecialtyRegistry;
use crate::messages::{self, UiMessage};
use crate::models::{ChatMessage, Language, PatientRecord};
use crate::pipeline::json_recovery::recover_object;
use crate::pipeline::llm::{ChatRequest, LlmClient};

/// Chat messages the router sees.
pub const ROUTER_WINDOW: usize = 4;

const ROUTER_PROMPT_EN: &str = r#"You are a medical triage assistant.

CRITICAL: ALL your questions and messages MUST be in ENGLISH.

SPECIALISTS AVAILABLE:
{specialist_list}

YOUR TASK:
1. Gather ENOUGH information before routing. You need to know:
   - MAIN SYMPTOM: What is bothering the patient the most?
   - TRIGGER/CAUSE: When did it start? What triggers it? (food, activity, stress?)
   - DURATION: How long has it been going on?
   - ASSOCIATED SYMPTOMS: Any other symptoms?

2. ONLY route when you are CONFIDENT about the right specialist based on the symptoms:
   - Food-related reactions (swelling, itching after eating) → allergologo
   - Chest pain, palpitations, high BP readings → cardiologo
   - Digestive issues (stomach pain, reflux, nausea) → gastroenterologo
   - etc.

3. If the symptoms are AMBIGUOUS, ask ONE more specific question.

DECISION RULES:
- If you have < 2 pieces of key information → ask_general_followup
- If symptoms clearly match ONE specialist → route_to_specialist
- If symptoms could match multiple specialists, ask about the TRIGGER or CAUSE

Respond with JSON only:
- {"action": "ask_general_followup", "question": "Your question in ENGLISH"}
- {"action": "route_to_specialist", "specialist": "name", "summary": "Brief description"}
- {"action": "cannot_route", "message": "Reason in ENGLISH"}"#;

const ROUTER_PROMPT_IT: &str = r#"Sei un assistente di triage medico.

CRITICO: TUTTE le tue domande e messaggi DEVONO essere in ITALIANO.

SPECIALISTI DISPONIBILI:
{specialist_list}

IL TUO COMPITO:
1. Raccogli ABBASTANZA informazioni prima di indirizzare. Devi sapere:
   - SINTOMO PRINCIPALE: Cosa disturba di più il paziente?
   - TRIGGER/CAUSA: Quando è iniziato? Cosa lo scatena? (cibo, attività, stress?)
   - DURATA: Da quanto tempo va avanti?
   - SINTOMI ASSOCIATI: Altri sintomi?

2. Indirizza SOLO quando sei SICURO dello specialista giusto:
   - Reazioni legate al cibo (gonfiore, prurito dopo mangiato) → allergologo
   - Dolore al petto, palpitazioni, pressione alta → cardiologo
   - Problemi digestivi (mal di stomaco, reflusso, nausea) → gastroenterologo
   - ecc.

3. Se i sintomi sono AMBIGUI, fai UNA domanda più specifica.

REGOLE DECISIONALI:
- Se hai < 2 informazioni chiave → ask_general_followup
- Se i sintomi corrispondono chiaramente a UNO specialista → route_to_specialist
- Se i sintomi potrebbero corrispondere a più specialisti, chiedi del TRIGGER o CAUSA

Rispondi SOLO con JSON:
- {"action": "ask_general_followup", "question": "La tua domanda in ITALIANO"}
- {"action": "route_to_specialist", "specialist": "nome", "summary": "Breve descrizione"}
- {"action": "cannot_route", "message": "Motivo in ITALIANO"}"#;

/// Outcome of one routing turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterDecision {
    AskGeneralFollowup { question: String },
    /// `specialist` is always a tag from the registry.
    RouteToSpecialist { specialist: String, summary: String },
    CannotRoute { message: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RawDecision {
    AskGeneralFollowup {
        #[serde(default)]
        question: String,
    },
    RouteToSpecialist {
        #[serde(default)]
        specialist: String,
        #[serde(default)]
        summary: String,
    },
    CannotRoute {
        #[serde(default)]
        message: String,
    },
}

pub fn router_prompt(registry: &SpecialtyRegistry, lang: Language) -> String {
    let template = match lang {
        Language::En => ROUTER_PROMPT_EN,
        Language::It => ROUTER_PROMPT_IT,
    };
    template.replace("{specialist_list}", &registry.prompt_list())
}

pub struct RouterAgent {
    llm: Arc<dyn LlmClient>,
    registry: SpecialtyRegistry,
}

impl RouterAgent {
    pub fn new(llm: Arc<dyn LlmClient>, registry: SpecialtyRegistry) -> Self {
        Self { llm, registry }
    }

    pub fn registry(&self) -> &SpecialtyRegistry {
        &self.registry
    }

    /// Decide the next routing step from the trailing chat window.
    pub fn decide(&self, window: &[ChatMessage], record: &PatientRecord, lang: Language) -> RouterDecision {
        let mut messages = vec![ChatMessage::system(router_prompt(&self.registry, lang))];
        if !record.is_empty() {
            messages.push(ChatMessage::system(format!(
                "KNOWN PATIENT DATA:\n{}",
                record.prompt_context()
            )));
        }
        let start = window.len().saturating_sub(ROUTER_WINDOW);
        messages.extend(window[start..].iter().cloned());

        let request = ChatRequest::new(messages).json();
        let raw = match self.llm.chat(&request) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Router call failed, asking again");
                return self.clarify(lang);
            }
        };

        let decision = recover_object(&raw)
            .map_err(|e| e.to_string())
            .and_then(|(object, _)| {
                serde_json::from_value::<RawDecision>(serde_json::Value::Object(object))
                    .map_err(|e| e.to_string())
            });

        let decision = match decision {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, raw = %raw.chars().take(200).collect::<String>(), "Router output rejected");
                return self.clarify(lang);
            }
        };

        let decision = self.validate(decision, lang);
        tracing::info!(?decision, "Router decision");
        decision
    }

    fn validate(&self, decision: RawDecision, lang: Language) -> RouterDecision {
        match decision {
            RawDecision::AskGeneralFollowup { question } if question.trim().is_empty() => self.clarify(lang),
            RawDecision::AskGeneralFollowup { question } => RouterDecision::AskGeneralFollowup {
                question: question.trim().to_string(),
            },
            RawDecision::RouteToSpecialist { specialist, summary } => match self.registry.resolve(&specialist) {
                Some(tag) => RouterDecision::RouteToSpecialist {
                    specialist: tag,
                    summary: summary.trim().to_string(),
                },
                None => {
                    tracing::warn!(
                        requested = %specialist,
                        available = ?self.registry.available(),
                        "Router chose an unavailable specialist"
                    );
                    RouterDecision::CannotRoute {
                        message: messages::invalid_specialist(lang, specialist.trim(), self.registry.available()),
                    }
                }
            },
            RawDecision::CannotRoute { message } if message.trim().is_empty() => RouterDecision::CannotRoute {
                message: messages::ui(lang, UiMessage::CannotRoute).to_string(),
            },
            RawDecision::CannotRoute { message } => RouterDecision::CannotRoute {
                message: message.trim().to_string(),
            },
        }
    }

    fn clarify(&self, lang: Language) -> RouterDecision {
        RouterDecision::AskGeneralFollowup {
            question: messages::ui(lang, UiMessage::ClarifySymptoms).to_string(),
        }
    }
}

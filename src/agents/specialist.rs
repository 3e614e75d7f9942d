use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::messages::{self, UiMessage};
use crate::models::{ChatMessage, Language, PatientRecord, SessionState, VitalExtract};
use crate::pipeline::json_recovery::recover_object;
use crate::pipeline::llm::{ChatRequest, LlmClient};
use crate::pipeline::vitals::extract_vitals;

/// Chat messages the specialist sees.
pub const SPECIALIST_WINDOW: usize = 6;

/// Summaries shorter than this are replaced by the user transcript.
pub const MIN_SUMMARY_CHARS: usize = 10;

/// Literal summaries copied from the prompt instead of written.
const PLACEHOLDER_SUMMARIES: &[&str] = &[
    "[summarize the symptoms from this conversation]",
    "[riassumi i sintomi da questa conversazione]",
    "summarize the symptoms from this conversation",
    "riassumi i sintomi da questa conversazione",
    "riassunto completo...",
    "complete summary...",
    "brief description",
    "breve descrizione",
    "...",
];

const SPECIALIST_PROMPT_EN: &str = r#"You are a MEDICAL SPECIALIST in {specialty}.
Your goal is to gather the necessary symptoms for a differential diagnosis.

CRITICAL: ALL your questions MUST be in ENGLISH.

BEHAVIOR RULES:
1. NEVER ask the user "what do you think it is" or their opinion on the diagnosis. YOU are the doctor.
2. Ask SPECIFIC and TARGETED questions about symptoms IN ENGLISH (e.g., "How long?", "Is it localized?", "Is there fever?").
3. Maintain a professional, empathetic but authoritative tone.

CRITICAL - AVOID REPETITIONS:
- Before deciding to ask, check "KNOWN PATIENT DATA" and "QUESTIONS ALREADY ASKED" (if present).
- If information is already present (e.g., "Fever: Yes" or "Pain: Abdominal"), DO NOT ASK IT AGAIN.
- Ask only NEW or MISSING details necessary for your specialty.

Analyze the history and patient data, then decide:
1. If SPECIFIC and NEW details are needed, ask ONE targeted question IN ENGLISH.
   JSON: {"action": "ask_specialist_followup", "reasoning": "I am asking X because Y is missing from data...", "question": "Your question in ENGLISH"}
2. If you have enough info for the analysis, start triage.
   JSON: {"action": "perform_triage", "summary": "[SUMMARIZE THE SYMPTOMS FROM THIS CONVERSATION]", "extracted_data": {}}

CRITICAL FOR PERFORM_TRIAGE - SUMMARY RULES:
- ONLY use information that the patient ACTUALLY stated in this conversation.
- DO NOT invent age, gender, or any details not explicitly mentioned.
- Just list the symptoms: "Patient with X, Y, Z symptoms" (no invented demographics).

IMPORTANT:
- The "reasoning" field is MANDATORY for "ask_specialist_followup".
- If the user provides numbers, insert them in "extracted_data" with THESE EXACT KEYS:
  * "temperature_celsius": for fever/temperature values (e.g., 38.5)
  * "pain_score": for pain level 0-10 (e.g., 7)
  * "systolic": for systolic blood pressure (e.g., 140)
  * "diastolic": for diastolic blood pressure (e.g., 90)
  * "duration_value" and "duration_unit": for how long symptoms have lasted (e.g., 3 and "days")
  * "age", "confusion" (true/false), "respiratory_rate": only if the patient stated them
- Respond ONLY with the JSON."#;

const SPECIALIST_PROMPT_IT: &str = r#"Sei uno SPECIALISTA MEDICO in {specialty}.
Il tuo obiettivo è raccogliere i sintomi necessari per una diagnosi differenziale.

CRITICO: TUTTE le tue domande DEVONO essere in ITALIANO.

REGOLE DI COMPORTAMENTO:
1. NON chiedere MAI al paziente "cosa pensi che sia" o la sua opinione sulla diagnosi. TU sei il medico.
2. Fai domande SPECIFICHE e MIRATE sui sintomi IN ITALIANO (es. "Da quanto tempo?", "È localizzato?", "C'è febbre?").
3. Mantieni un tono professionale, empatico ma autorevole.

CRITICO - EVITA RIPETIZIONI:
- Prima di decidere di chiedere, controlla "DATI PAZIENTE CONOSCIUTI" e "DOMANDE GIÀ FATTE" (se presenti).
- Se l'informazione è già presente (es. "Febbre: Sì" o "Dolore: Addominale"), NON CHIEDERLA DI NUOVO.
- Chiedi solo dettagli NUOVI o MANCANTI necessari per la tua specialità.

Analizza la cronologia e i dati del paziente, poi decidi:
1. Se servono dettagli SPECIFICI e NUOVI, fai UNA domanda mirata IN ITALIANO.
   JSON: {"action": "ask_specialist_followup", "reasoning": "Chiedo X perché Y manca dai dati...", "question": "La tua domanda in ITALIANO"}
2. Se hai abbastanza info per l'analisi, avvia il triage.
   JSON: {"action": "perform_triage", "summary": "[RIASSUMI I SINTOMI DA QUESTA CONVERSAZIONE]", "extracted_data": {}}

CRITICO PER PERFORM_TRIAGE - REGOLE SUMMARY:
- USA SOLO informazioni che il paziente ha EFFETTIVAMENTE dichiarato in questa conversazione.
- NON inventare età, sesso o dettagli non esplicitamente menzionati.
- Elenca solo i sintomi: "Paziente con sintomi X, Y, Z" (senza dati demografici inventati).

IMPORTANTE:
- Il campo "reasoning" è OBBLIGATORIO per "ask_specialist_followup".
- Se l'utente fornisce numeri, inseriscili in "extracted_data" con QUESTE CHIAVI ESATTE:
  * "temperature_celsius": per valori di febbre/temperatura (es. 38.5)
  * "pain_score": per livello dolore 0-10 (es. 7)
  * "systolic": per pressione sistolica (es. 140)
  * "diastolic": per pressione diastolica (es. 90)
  * "duration_value" e "duration_unit": per la durata dei sintomi (es. 3 e "giorni")
  * "age", "confusion" (true/false), "respiratory_rate": solo se dichiarati dal paziente
- Rispondi SOLO con il JSON."#;

/// Outcome of one specialist turn.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecialistDecision {
    AskFollowup { question: String },
    PerformTriage { summary: String, vitals: VitalExtract },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RawDecision {
    AskSpecialistFollowup {
        #[serde(default)]
        question: String,
        #[serde(default)]
        reasoning: String,
    },
    PerformTriage {
        #[serde(default)]
        summary: String,
        #[serde(default)]
        extracted_data: Option<Map<String, Value>>,
    },
}

pub fn specialist_prompt(specialty: &str, lang: Language) -> String {
    let template = match lang {
        Language::En => SPECIALIST_PROMPT_EN,
        Language::It => SPECIALIST_PROMPT_IT,
    };
    template.replace("{specialty}", &specialty.to_uppercase())
}

/// What the model must not ask again: recorded facts and prior questions.
pub fn negative_constraints(record: &PatientRecord, asked: &[String], lang: Language) -> Option<String> {
    let (data_heading, asked_heading) = match lang {
        Language::En => (
            "KNOWN PATIENT DATA (do not ask about these again):",
            "QUESTIONS ALREADY ASKED (do not repeat them):",
        ),
        Language::It => (
            "DATI PAZIENTE CONOSCIUTI (non chiedere di nuovo):",
            "DOMANDE GIÀ FATTE (non ripeterle):",
        ),
    };

    let mut sections = Vec::new();
    if !record.is_empty() {
        sections.push(format!("{data_heading}\n{}", record.prompt_context()));
    }
    if !asked.is_empty() {
        let list: Vec<String> = asked.iter().map(|q| format!("- {q}")).collect();
        sections.push(format!("{asked_heading}\n{}", list.join("\n")));
    }
    (!sections.is_empty()).then(|| sections.join("\n\n"))
}

fn is_placeholder(summary: &str) -> bool {
    let s = summary.trim().to_lowercase();
    s.chars().count() < MIN_SUMMARY_CHARS || PLACEHOLDER_SUMMARIES.contains(&s.as_str())
}

pub struct SpecialistAgent {
    llm: Arc<dyn LlmClient>,
}

impl SpecialistAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Decide between one more question and triage.
    ///
    /// Every failure path asks again; triage is only reached on a valid
    /// `perform_triage` answer.
    pub fn decide(
        &self,
        specialty: &str,
        state: &SessionState,
        record: &PatientRecord,
    ) -> SpecialistDecision {
        let lang = state.language;
        let mut messages = vec![ChatMessage::system(specialist_prompt(specialty, lang))];
        if let Some(constraints) = negative_constraints(record, &state.asked_questions, lang) {
            messages.push(ChatMessage::system(constraints));
        }
        messages.extend(state.window(SPECIALIST_WINDOW).iter().cloned());

        let request = ChatRequest::new(messages).json();
        let raw = match self.llm.chat(&request) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(specialty, error = %e, "Specialist call failed, asking again");
                return clarify(lang);
            }
        };

        let parsed = recover_object(&raw)
            .map_err(|e| e.to_string())
            .and_then(|(object, _)| {
                serde_json::from_value::<RawDecision>(Value::Object(object)).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(RawDecision::AskSpecialistFollowup { question, reasoning }) => {
                let question = question.trim();
                if question.is_empty() {
                    tracing::warn!(specialty, "Specialist asked without a question");
                    return clarify(lang);
                }
                if state.asked_questions.iter().any(|q| q == question) {
                    tracing::warn!(specialty, question, "Specialist repeated a question");
                    return SpecialistDecision::AskFollowup {
                        question: messages::ui(lang, UiMessage::NotUnderstood).to_string(),
                    };
                }
                tracing::info!(specialty, reasoning = %reasoning, "Specialist follow-up");
                SpecialistDecision::AskFollowup {
                    question: question.to_string(),
                }
            }
            Ok(RawDecision::PerformTriage { summary, extracted_data }) => {
                let summary = if is_placeholder(&summary) {
                    tracing::warn!(specialty, summary = %summary, "Summary rejected, using user transcript");
                    state.user_transcript()
                } else {
                    summary.trim().to_string()
                };
                let vitals = extract_vitals(&Value::Object(extracted_data.unwrap_or_default()));
                tracing::info!(specialty, vitals = ?vitals, "Specialist requested triage");
                SpecialistDecision::PerformTriage { summary, vitals }
            }
            Err(e) => {
                tracing::warn!(specialty, error = %e, raw = %raw.chars().take(200).collect::<String>(), "Specialist output rejected");
                clarify(lang)
            }
        }
    }
}

fn clarify(lang: Language) -> SpecialistDecision {
    SpecialistDecision::AskFollowup {
        question: messages::ui(lang, UiMessage::ClarifySymptoms).to_string(),
    }
}

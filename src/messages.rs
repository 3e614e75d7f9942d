//! User-facing strings in English and Italian.
//!
//! Prompts live next to the component that sends them; this module only
//! holds text the patient reads.

use crate::models::{Language, TriageTier};

/// Fixed conversational replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiMessage {
    SessionReset,
    ForceDiagnosisUnavailable,
    TechnicalError,
    ClarifySymptoms,
    NotUnderstood,
    RepeatSymptom,
    CannotRoute,
    SessionBusy,
}

pub fn ui(lang: Language, msg: UiMessage) -> &'static str {
    use UiMessage::*;
    match (lang, msg) {
        (Language::En, SessionReset) => "Conversation and data reset.",
        (Language::It, SessionReset) => "Conversazione e dati resettati.",
        (Language::En, ForceDiagnosisUnavailable) => {
            "You must be in contact with a specialist to force a diagnosis."
        }
        (Language::It, ForceDiagnosisUnavailable) => {
            "Devi essere in contatto con uno specialista per forzare una diagnosi."
        }
        (Language::En, TechnicalError) => "A technical error occurred on the server.",
        (Language::It, TechnicalError) => "Si è verificato un errore tecnico sul server.",
        (Language::En, ClarifySymptoms) => "Could you describe your symptoms better?",
        (Language::It, ClarifySymptoms) => "Puoi descrivere meglio i tuoi sintomi?",
        (Language::En, NotUnderstood) => "I'm not sure I understood. Can you give me more details?",
        (Language::It, NotUnderstood) => "Non sono sicuro di aver capito. Puoi darmi più dettagli?",
        (Language::En, RepeatSymptom) => {
            "Excuse me, I got confused for a moment. Can you repeat the last symptom?"
        }
        (Language::It, RepeatSymptom) => {
            "Scusa, mi sono confuso per un momento. Puoi ripetere l'ultimo sintomo?"
        }
        (Language::En, CannotRoute) => {
            "I'm not sure which specialist fits your description best."
        }
        (Language::It, CannotRoute) => {
            "Non sono sicuro di quale specialista sia più adatto in base alla descrizione."
        }
        (Language::En, SessionBusy) => {
            "Your previous message is still being processed. Please try again in a moment."
        }
        (Language::It, SessionBusy) => {
            "Il messaggio precedente è ancora in elaborazione. Riprova tra un momento."
        }
    }
}

/// "Connecting you with the X specialist" handoff line.
pub fn connecting_specialist(lang: Language, specialist: &str) -> String {
    let name = capitalize(specialist);
    match lang {
        Language::En => format!("Connecting you with the **{name}** specialist. One moment..."),
        Language::It => {
            format!("Ti sto mettendo in contatto con lo specialista **{name}**. Un momento...")
        }
    }
}

/// Message for a routing target that is not among the available specialties.
pub fn invalid_specialist(lang: Language, requested: &str, available: &[String]) -> String {
    let options = if available.is_empty() {
        "-".to_string()
    } else {
        available
            .iter()
            .map(|s| capitalize(s))
            .collect::<Vec<_>>()
            .join(", ")
    };
    match lang {
        Language::En => format!(
            "I could not match '{requested}' to an available specialist ({options}). Could you describe the problem differently?"
        ),
        Language::It => format!(
            "Non sono riuscito a identificare uno specialista valido tra quelli disponibili ({options}) per '{requested}'. Potresti descrivere il problema in modo diverso?"
        ),
    }
}

/// Tier label and advice text.
pub fn triage_text(lang: Language, tier: TriageTier) -> (&'static str, &'static str) {
    match (lang, tier) {
        (Language::En, TriageTier::SelfCare) => (
            "Self-Care (Low Risk)",
            "Based on the information provided, the symptoms appear to be mild. Rest, hydration, and monitoring are recommended. If symptoms worsen, contact your doctor.",
        ),
        (Language::En, TriageTier::ContactDoctor) => (
            "Contact Doctor (Medium Risk)",
            "The symptoms described, analyzed in light of our sources, suggest it would be wise to consult your primary care physician for a thorough evaluation.",
        ),
        (Language::En, TriageTier::UrgentCare) => (
            "Urgent Care (High Risk)",
            "The symptom analysis indicates a potential risk that requires prompt medical attention. We recommend contacting emergency services or going to the emergency room.",
        ),
        (Language::En, TriageTier::InsufficientInfo) => (
            "Insufficient Information",
            "I was unable to formulate a clear recommendation based on the data provided. Please describe the symptoms in more detail or contact a doctor directly for any concerns.",
        ),
        (Language::It, TriageTier::SelfCare) => (
            "Cura Personale (Basso Rischio)",
            "Sulla base delle informazioni fornite, i sintomi sembrano essere di lieve entità. Si consiglia riposo, idratazione e monitoraggio. Se i sintomi dovessero peggiorare, contatta il tuo medico.",
        ),
        (Language::It, TriageTier::ContactDoctor) => (
            "Contatta il Medico (Medio Rischio)",
            "I sintomi descritti, analizzati alla luce delle nostre fonti, suggeriscono che sarebbe saggio consultare il tuo medico di base per una valutazione approfondita.",
        ),
        (Language::It, TriageTier::UrgentCare) => (
            "Cura Urgente (Alto Rischio)",
            "L'analisi dei sintomi indica un potenziale rischio che richiede attenzione medica tempestiva. Ti raccomandiamo di contattare la guardia medica o di recarti al pronto soccorso.",
        ),
        (Language::It, TriageTier::InsufficientInfo) => (
            "Informazioni Insufficienti",
            "Non sono riuscito a formulare una raccomandazione chiara sulla base dei dati forniti. Per favore, descrivi i sintomi in modo più dettagliato o contatta direttamente un medico per qualsiasi dubbio.",
        ),
    }
}

// ── Report headings ─────────────────────────────────────────

pub struct ReportLabels {
    pub symbolic_heading: &'static str,
    pub temperature: &'static str,
    pub pain: &'static str,
    pub duration: &'static str,
    pub blood_pressure: &'static str,
    pub curb65: &'static str,
    pub approx_days: &'static str,
    pub hypotheses_heading: &'static str,
    pub hypotheses_intro: &'static str,
    pub probability: &'static str,
    pub reasoning: &'static str,
    pub treatment: &'static str,
    pub sources: &'static str,
}

pub fn report_labels(lang: Language) -> ReportLabels {
    match lang {
        Language::En => ReportLabels {
            symbolic_heading: "Symbolic data analysis",
            temperature: "Temperature",
            pain: "Pain",
            duration: "Duration",
            blood_pressure: "Blood pressure",
            curb65: "CURB-65",
            approx_days: "about {days} days",
            hypotheses_heading: "Preliminary hypotheses (not a diagnosis)",
            hypotheses_intro: "Based on the information provided and the sources of my specialty ({specialty})...",
            probability: "Probability",
            reasoning: "Reasoning",
            treatment: "Treatment",
            sources: "Sources",
        },
        Language::It => ReportLabels {
            symbolic_heading: "Analisi dati simbolici",
            temperature: "Temperatura",
            pain: "Dolore",
            duration: "Durata",
            blood_pressure: "Pressione",
            curb65: "CURB-65",
            approx_days: "circa {days} giorni",
            hypotheses_heading: "Ipotesi preliminari (non diagnosi)",
            hypotheses_intro: "Basandomi sulle informazioni e sulle fonti della mia specializzazione ({specialty})...",
            probability: "Probabilità",
            reasoning: "Motivazione",
            treatment: "Trattamento",
            sources: "Fonti",
        },
    }
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

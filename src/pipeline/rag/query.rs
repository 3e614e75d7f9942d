use crate::models::PatientRecord;

/// Symptom entries shorter than this are filler ("yes", "ok", "no").
const MIN_SYMPTOM_CHARS: usize = 4;

/// Structured queries shorter than this fall back to the free-text summary.
const MIN_QUERY_CHARS: usize = 15;

/// Build the retrieval query for a triage run.
///
/// Structured record fields come first: meaningful symptoms, then allergies,
/// medical history and duration. The free-text summary is used only when
/// the structured query is too short to retrieve on.
pub fn build_query(record: &PatientRecord, summary: &str) -> String {
    let mut parts: Vec<String> = record
        .symptoms
        .iter()
        .map(|s| s.trim())
        .filter(|s| s.chars().count() >= MIN_SYMPTOM_CHARS)
        .map(str::to_string)
        .collect();

    let listed = |items: &[String]| -> Option<String> {
        let kept: Vec<&str> = items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        (!kept.is_empty()).then(|| kept.join(", "))
    };

    if let Some(allergies) = listed(&record.allergies) {
        parts.push(format!("allergies: {allergies}"));
    }
    if let Some(history) = listed(&record.medical_history) {
        parts.push(format!("history: {history}"));
    }
    if let Some(duration) = listed(&record.duration) {
        parts.push(format!("duration: {duration}"));
    }

    let structured = parts.join("; ");
    if structured.chars().count() >= MIN_QUERY_CHARS {
        tracing::debug!(query = %structured, "Retrieval query from patient record");
        return structured;
    }

    let summary = summary.trim();
    if summary.is_empty() {
        structured
    } else {
        tracing::debug!(query = %summary, "Retrieval query from summary");
        summary.to_string()
    }
}

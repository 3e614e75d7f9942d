use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Structured patient facts accumulated over a conversation.
///
/// List fields behave as ordered sets: unique, first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientRecord {
    pub symptoms: Vec<String>,
    pub duration: Vec<String>,
    pub negative_findings: Vec<String>,
    pub medical_history: Vec<String>,
    pub medications: Vec<String>,
    pub allergies: Vec<String>,
    pub vital_signs: Map<String, Value>,
    pub notes: String,
}

/// New information extracted from a single user turn.
///
/// Same shape as [`PatientRecord`]; `null` is accepted wherever a field is.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PatientRecordDelta {
    #[serde(deserialize_with = "null_as_default")]
    pub symptoms: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub duration: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub negative_findings: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub medical_history: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub medications: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub allergies: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub vital_signs: Map<String, Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub notes: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn append_unique(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if item.trim().is_empty() {
            continue;
        }
        if !target.iter().any(|existing| existing == item) {
            target.push(item.clone());
        }
    }
}

impl PatientRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a delta into this record.
    ///
    /// Lists append unseen items (exact match), vital signs overwrite by
    /// key, notes append with `; `.
    pub fn merge(&mut self, delta: &PatientRecordDelta) {
        append_unique(&mut self.symptoms, &delta.symptoms);
        append_unique(&mut self.duration, &delta.duration);
        append_unique(&mut self.negative_findings, &delta.negative_findings);
        append_unique(&mut self.medical_history, &delta.medical_history);
        append_unique(&mut self.medications, &delta.medications);
        append_unique(&mut self.allergies, &delta.allergies);

        for (key, value) in &delta.vital_signs {
            self.vital_signs.insert(key.clone(), value.clone());
        }

        let note = delta.notes.trim();
        if !note.is_empty() {
            if self.notes.is_empty() {
                self.notes = note.to_string();
            } else {
                self.notes.push_str("; ");
                self.notes.push_str(note);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty()
            && self.duration.is_empty()
            && self.negative_findings.is_empty()
            && self.medical_history.is_empty()
            && self.medications.is_empty()
            && self.allergies.is_empty()
            && self.vital_signs.is_empty()
            && self.notes.is_empty()
    }

    /// Compact "KNOWN PATIENT DATA" block for prompts. Empty when nothing is known.
    pub fn prompt_context(&self) -> String {
        let mut lines = Vec::new();
        let sections: [(&str, &Vec<String>); 6] = [
            ("Symptoms", &self.symptoms),
            ("Duration", &self.duration),
            ("Excluded", &self.negative_findings),
            ("Medical history", &self.medical_history),
            ("Medications", &self.medications),
            ("Allergies", &self.allergies),
        ];
        for (label, items) in sections {
            if !items.is_empty() {
                lines.push(format!("- {label}: {}", items.join(", ")));
            }
        }
        if !self.vital_signs.is_empty() {
            let vitals: Vec<String> = self
                .vital_signs
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => format!("{k}={s}"),
                    other => format!("{k}={other}"),
                })
                .collect();
            lines.push(format!("- Vital signs: {}", vitals.join(", ")));
        }
        if !self.notes.is_empty() {
            lines.push(format!("- Notes: {}", self.notes));
        }
        lines.join("\n")
    }
}

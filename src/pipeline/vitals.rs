//! Deterministic vital-sign classifiers.
//!
//! Inputs arrive loosely typed from generative output: numbers, numeric
//! strings, decimal commas. Every classifier returns a band or an explicit
//! `VitalError`; none of them panic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DurationThresholds;
use crate::models::{Language, VitalExtract};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VitalError {
    #[error("Value is missing")]
    Missing,

    #[error("Not a number: '{0}'")]
    NotNumeric(String),

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("Unrecognized time unit: '{0}'")]
    UnknownUnit(String),
}

// ═══════════════════════════════════════════════════════════
// Loose numeric parsing
// ═══════════════════════════════════════════════════════════

/// Read a float from a JSON number or numeric string (`"38,5"` allowed).
pub fn loose_f64(value: &Value) -> Result<f64, VitalError> {
    match value {
        Value::Null => Err(VitalError::Missing),
        Value::Number(n) => n.as_f64().ok_or_else(|| VitalError::NotNumeric(n.to_string())),
        Value::String(s) => parse_numeric_str(s),
        Value::Bool(b) => Err(VitalError::NotNumeric(b.to_string())),
        other => Err(VitalError::NotNumeric(other.to_string())),
    }
}

/// Integer view of [`loose_f64`]; fractional parts are truncated.
pub fn loose_i64(value: &Value) -> Result<i64, VitalError> {
    if let Some(i) = value.as_i64() {
        return Ok(i);
    }
    let f = loose_f64(value)?;
    if !f.is_finite() {
        return Err(VitalError::NotNumeric(f.to_string()));
    }
    Ok(f.trunc() as i64)
}

fn parse_numeric_str(s: &str) -> Result<f64, VitalError> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") || trimmed.eq_ignore_ascii_case("null") {
        return Err(VitalError::Missing);
    }
    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .ok_or_else(|| VitalError::NotNumeric(trimmed.to_string()))
}

fn loose_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "si" | "sì" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Build a [`VitalExtract`] from a specialist's `extracted_data` object or
/// from the scribe's recorded `vital_signs`.
///
/// Canonical keys win over their synonyms. A combined `blood_pressure`
/// reading (`"150/95"`) fills whichever half is missing. A key whose value
/// cannot be parsed is left unset.
pub fn extract_vitals(data: &Value) -> VitalExtract {
    let Some(map) = data.as_object() else {
        return VitalExtract::default();
    };

    let lookup = |field: &str| {
        VITAL_KEYS
            .iter()
            .filter(|(canonical, _)| *canonical == field)
            .flat_map(|(canonical, aliases)| std::iter::once(canonical).chain(aliases.iter()))
            .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
    };
    let float = |key: &str| lookup(key).and_then(|v| loose_f64(v).ok());
    let int = |key: &str| lookup(key).and_then(|v| loose_i64(v).ok());

    let (bp_systolic, bp_diastolic) = lookup("blood_pressure")
        .and_then(Value::as_str)
        .and_then(split_blood_pressure)
        .unzip();

    let extract = VitalExtract {
        temperature_celsius: float("temperature_celsius"),
        pain_score: int("pain_score"),
        systolic: int("systolic").or(bp_systolic),
        diastolic: int("diastolic").or(bp_diastolic),
        duration_value: int("duration_value"),
        duration_unit: lookup("duration_unit")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        age: int("age"),
        confusion: lookup("confusion").and_then(loose_bool),
        respiratory_rate: int("respiratory_rate"),
    };

    for key in map.keys() {
        let known = VITAL_KEYS
            .iter()
            .any(|(canonical, aliases)| *canonical == key.as_str() || aliases.contains(&key.as_str()));
        if !known {
            tracing::debug!(key = %key, "Ignoring unknown vital key");
        }
    }

    extract
}

/// Canonical vital keys and the synonyms accepted for each.
pub const VITAL_KEYS: &[(&str, &[&str])] = &[
    ("temperature_celsius", &["temperature", "temp", "body_temperature", "temperatura", "febbre"]),
    ("pain_score", &["pain", "pain_level", "pain_scale", "dolore"]),
    ("systolic", &["systolic_bp", "sistolica", "pressione_sistolica"]),
    ("diastolic", &["diastolic_bp", "diastolica", "pressione_diastolica"]),
    ("blood_pressure", &["bp", "pressione", "pressione_arteriosa"]),
    ("duration_value", &[]),
    ("duration_unit", &[]),
    ("age", &["eta", "età"]),
    ("confusion", &["confusione"]),
    ("respiratory_rate", &["resp_rate", "breathing_rate", "frequenza_respiratoria"]),
];

fn split_blood_pressure(reading: &str) -> Option<(i64, i64)> {
    let (s, d) = reading.split_once('/')?;
    let s = loose_i64(&Value::from(s.trim())).ok()?;
    let d = loose_i64(&Value::from(d.trim().trim_end_matches("mmHg").trim())).ok()?;
    Some((s, d))
}

// ═══════════════════════════════════════════════════════════
// Temperature
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureBand {
    Hypothermia,
    Normal,
    LowGrade,
    ModerateFever,
    HighFever,
}

impl TemperatureBand {
    /// Values falling between the published bands (e.g. 38.25) go to the
    /// next band up, except that high fever starts exactly at 39.5.
    pub fn from_celsius(t: f64) -> Self {
        if t < 35.0 {
            Self::Hypothermia
        } else if t < 37.6 {
            Self::Normal
        } else if t <= 38.2 {
            Self::LowGrade
        } else if t < 39.5 {
            Self::ModerateFever
        } else {
            Self::HighFever
        }
    }

    pub fn label(&self, lang: Language) -> &'static str {
        match (self, lang) {
            (Self::Hypothermia, Language::En) => "Hypothermia",
            (Self::Normal, Language::En) => "Normal",
            (Self::LowGrade, Language::En) => "Low-grade fever",
            (Self::ModerateFever, Language::En) => "Moderate fever",
            (Self::HighFever, Language::En) => "High fever",
            (Self::Hypothermia, Language::It) => "Ipotermia",
            (Self::Normal, Language::It) => "Normale",
            (Self::LowGrade, Language::It) => "Febbricola",
            (Self::ModerateFever, Language::It) => "Febbre moderata",
            (Self::HighFever, Language::It) => "Febbre alta",
        }
    }

    pub fn interpretation(&self, lang: Language) -> &'static str {
        match (self, lang) {
            (Self::Hypothermia, Language::En) => "Dangerously low body temperature.",
            (Self::Normal, Language::En) => "Normal body temperature.",
            (Self::LowGrade, Language::En) => "Slightly elevated temperature.",
            (Self::ModerateFever, Language::En) => "Significant fever.",
            (Self::HighFever, Language::En) => "Very high fever, monitor closely.",
            (Self::Hypothermia, Language::It) => "Temperatura pericolosamente bassa.",
            (Self::Normal, Language::It) => "Temperatura corporea normale.",
            (Self::LowGrade, Language::It) => "Temperatura leggermente elevata.",
            (Self::ModerateFever, Language::It) => "Febbre significativa.",
            (Self::HighFever, Language::It) => "Febbre molto alta, monitorare con attenzione.",
        }
    }
}

/// Anything below 35 °C is hypothermia. Readings above 46 °C are rejected
/// as mis-scaled (e.g. `385` for 38.5).
pub fn classify_temperature(value: &Value) -> Result<TemperatureBand, VitalError> {
    let t = loose_f64(value)?;
    if t > 46.0 {
        return Err(VitalError::OutOfRange {
            field: "temperature_celsius",
            value: t,
        });
    }
    Ok(TemperatureBand::from_celsius(t))
}

// ═══════════════════════════════════════════════════════════
// Pain
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PainBand {
    None,
    Mild,
    Moderate,
    Severe,
}

impl PainBand {
    pub fn label(&self, lang: Language) -> &'static str {
        match (self, lang) {
            (Self::None, Language::En) => "No pain",
            (Self::Mild, Language::En) => "Mild pain",
            (Self::Moderate, Language::En) => "Moderate pain",
            (Self::Severe, Language::En) => "Severe pain",
            (Self::None, Language::It) => "Nessun dolore",
            (Self::Mild, Language::It) => "Dolore lieve",
            (Self::Moderate, Language::It) => "Dolore moderato",
            (Self::Severe, Language::It) => "Dolore severo",
        }
    }
}

/// Numeric rating scale, 0–10.
pub fn classify_pain(value: &Value) -> Result<PainBand, VitalError> {
    let score = loose_i64(value)?;
    pain_band(score)
}

pub fn pain_band(score: i64) -> Result<PainBand, VitalError> {
    match score {
        0 => Ok(PainBand::None),
        1..=3 => Ok(PainBand::Mild),
        4..=6 => Ok(PainBand::Moderate),
        7..=10 => Ok(PainBand::Severe),
        _ => Err(VitalError::OutOfRange {
            field: "pain_score",
            value: score as f64,
        }),
    }
}

// ═══════════════════════════════════════════════════════════
// Duration
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationBand {
    Acute,
    Subacute,
    Chronic,
}

impl DurationBand {
    pub fn label(&self, lang: Language) -> &'static str {
        match (self, lang) {
            (Self::Acute, Language::En) => "Acute",
            (Self::Subacute, Language::En) => "Subacute",
            (Self::Chronic, Language::En) => "Chronic",
            (Self::Acute, Language::It) => "Acuta",
            (Self::Subacute, Language::It) => "Subacuta",
            (Self::Chronic, Language::It) => "Cronica",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationReading {
    pub total_days: i64,
    pub band: DurationBand,
}

/// Days per unit. Hours count as zero days.
fn unit_days(unit: &str) -> Option<i64> {
    let u = unit.trim().to_lowercase();
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| u.starts_with(p));
    if starts(&["day", "giorn", "d"]) && !u.starts_with("dec") {
        Some(1)
    } else if starts(&["week", "settiman", "wk", "w"]) {
        Some(7)
    } else if starts(&["month", "mes", "mo"]) {
        Some(30)
    } else if starts(&["hour", "ora", "ore", "hr", "h"]) {
        Some(0)
    } else {
        None
    }
}

pub fn classify_duration(
    value: &Value,
    unit: &str,
    thresholds: &DurationThresholds,
) -> Result<DurationReading, VitalError> {
    let n = loose_i64(value)?;
    if n < 0 {
        return Err(VitalError::OutOfRange {
            field: "duration_value",
            value: n as f64,
        });
    }
    let per_unit = unit_days(unit).ok_or_else(|| VitalError::UnknownUnit(unit.to_string()))?;
    let total_days = n.saturating_mul(per_unit);

    let band = if total_days <= thresholds.acute_max_days {
        DurationBand::Acute
    } else if total_days <= thresholds.subacute_max_days {
        DurationBand::Subacute
    } else {
        DurationBand::Chronic
    };

    Ok(DurationReading { total_days, band })
}

// ═══════════════════════════════════════════════════════════
// Blood pressure
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloodPressureBand {
    Normal,
    Elevated,
    Stage1,
    Stage2,
    Crisis,
    LowOrUnusual,
}

impl BloodPressureBand {
    pub fn from_readings(systolic: i64, diastolic: i64) -> Self {
        if systolic > 180 || diastolic > 120 {
            Self::Crisis
        } else if systolic >= 140 || diastolic >= 90 {
            Self::Stage2
        } else if (130..=139).contains(&systolic) || (80..=89).contains(&diastolic) {
            Self::Stage1
        } else if (120..=129).contains(&systolic) && diastolic < 80 {
            Self::Elevated
        } else if systolic < 120 && diastolic < 80 {
            Self::Normal
        } else {
            Self::LowOrUnusual
        }
    }

    pub fn label(&self, lang: Language) -> &'static str {
        match (self, lang) {
            (Self::Normal, Language::En) => "Normal",
            (Self::Elevated, Language::En) => "Elevated",
            (Self::Stage1, Language::En) => "Hypertension (stage 1)",
            (Self::Stage2, Language::En) => "Hypertension (stage 2)",
            (Self::Crisis, Language::En) => "Hypertensive crisis",
            (Self::LowOrUnusual, Language::En) => "Low (or unusual) pressure",
            (Self::Normal, Language::It) => "Normale",
            (Self::Elevated, Language::It) => "Elevata",
            (Self::Stage1, Language::It) => "Ipertensione (stadio 1)",
            (Self::Stage2, Language::It) => "Ipertensione (stadio 2)",
            (Self::Crisis, Language::It) => "Crisi ipertensiva",
            (Self::LowOrUnusual, Language::It) => "Ipotensione (o dati insoliti)",
        }
    }

    pub fn interpretation(&self, lang: Language) -> &'static str {
        match (self, lang) {
            (Self::Normal, Language::En) => "Optimal blood pressure.",
            (Self::Elevated, Language::En) => "Elevated pressure; risk of developing hypertension.",
            (Self::Stage1, Language::En) => "Stage 1 hypertension; a medical consultation is advised.",
            (Self::Stage2, Language::En) => "Stage 2 hypertension; a medical consultation is needed.",
            (Self::Crisis, Language::En) => "Hypertensive crisis; seek medical attention immediately.",
            (Self::LowOrUnusual, Language::En) => "Low (hypotension) or unusual pressure values.",
            (Self::Normal, Language::It) => "Pressione sanguigna ottimale.",
            (Self::Elevated, Language::It) => "Pressione elevata. Rischio di sviluppare ipertensione.",
            (Self::Stage1, Language::It) => "Ipertensione di stadio 1. Si raccomanda un consulto medico.",
            (Self::Stage2, Language::It) => "Ipertensione di stadio 2. Consulto medico necessario.",
            (Self::Crisis, Language::It) => "Crisi ipertensiva. Consultare immediatamente un medico.",
            (Self::LowOrUnusual, Language::It) => "Valori di pressione bassi (ipotensione) o insoliti.",
        }
    }
}

pub fn classify_blood_pressure(
    systolic: &Value,
    diastolic: &Value,
) -> Result<BloodPressureBand, VitalError> {
    let s = loose_i64(systolic)?;
    let d = loose_i64(diastolic)?;
    if s <= 0 || d <= 0 || s > 350 || d > 250 {
        return Err(VitalError::OutOfRange {
            field: "blood_pressure",
            value: s as f64,
        });
    }
    Ok(BloodPressureBand::from_readings(s, d))
}

// ═══════════════════════════════════════════════════════════
// CURB-65 (simplified: no urea, no blood pressure)
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curb65Factor {
    Age65OrOver,
    Confusion,
    RespiratoryRate30OrOver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Curb65Score {
    pub score: u8,
    pub factors: Vec<Curb65Factor>,
}

impl Curb65Score {
    pub fn interpretation(&self, lang: Language) -> &'static str {
        match (self.score, lang) {
            (0, Language::En) => "Low risk. Generally treatable at home.",
            (1, Language::En) => "Medium-low risk. Consider a medical evaluation.",
            (2, Language::En) => "Moderate risk. Consider hospital admission.",
            (_, Language::En) => "High risk. Urgent admission recommended.",
            (0, Language::It) => "Rischio basso. Generalmente trattabile a domicilio.",
            (1, Language::It) => "Rischio medio-basso. Considerare valutazione medica.",
            (2, Language::It) => "Rischio moderato. Considerare ricovero ospedaliero.",
            (_, Language::It) => "Rischio alto. Ricovero urgente raccomandato.",
        }
    }
}

pub fn curb65(age: &Value, confusion: bool, respiratory_rate: &Value) -> Result<Curb65Score, VitalError> {
    let age = loose_i64(age)?;
    let rr = loose_i64(respiratory_rate)?;
    if !(0..=130).contains(&age) {
        return Err(VitalError::OutOfRange {
            field: "age",
            value: age as f64,
        });
    }

    let mut factors = Vec::new();
    if age >= 65 {
        factors.push(Curb65Factor::Age65OrOver);
    }
    if confusion {
        factors.push(Curb65Factor::Confusion);
    }
    if rr >= 30 {
        factors.push(Curb65Factor::RespiratoryRate30OrOver);
    }

    Ok(Curb65Score {
        score: factors.len() as u8,
        factors,
    })
}

// ═══════════════════════════════════════════════════════════
// Symbolic report
// ═══════════════════════════════════════════════════════════

/// One line per classifier that has enough input. Classifier errors are
/// logged and the line is skipped.
pub fn symbolic_findings(
    vitals: &VitalExtract,
    durations: &DurationThresholds,
    lang: Language,
) -> Vec<String> {
    let labels = crate::messages::report_labels(lang);
    let mut lines = Vec::new();

    if let Some(t) = vitals.temperature_celsius {
        match classify_temperature(&Value::from(t)) {
            Ok(band) => lines.push(format!(
                "{}: {t:.1} °C, {} ({})",
                labels.temperature,
                band.label(lang),
                band.interpretation(lang)
            )),
            Err(e) => tracing::warn!(error = %e, "Temperature classification skipped"),
        }
    }

    if let Some(p) = vitals.pain_score {
        match pain_band(p) {
            Ok(band) => lines.push(format!("{}: {p}/10, {}", labels.pain, band.label(lang))),
            Err(e) => tracing::warn!(error = %e, "Pain classification skipped"),
        }
    }

    if let (Some(v), Some(unit)) = (vitals.duration_value, vitals.duration_unit.as_deref()) {
        match classify_duration(&Value::from(v), unit, durations) {
            Ok(reading) => lines.push(format!(
                "{}: {} ({})",
                labels.duration,
                reading.band.label(lang),
                labels.approx_days.replace("{days}", &reading.total_days.to_string())
            )),
            Err(e) => tracing::warn!(error = %e, "Duration classification skipped"),
        }
    }

    if let (Some(s), Some(d)) = (vitals.systolic, vitals.diastolic) {
        match classify_blood_pressure(&Value::from(s), &Value::from(d)) {
            Ok(band) => lines.push(format!(
                "{}: {s}/{d} mmHg, {} ({})",
                labels.blood_pressure,
                band.label(lang),
                band.interpretation(lang)
            )),
            Err(e) => tracing::warn!(error = %e, "Blood pressure classification skipped"),
        }
    }

    if let (Some(age), Some(rr)) = (vitals.age, vitals.respiratory_rate) {
        let confusion = vitals.confusion.unwrap_or(false);
        match curb65(&Value::from(age), confusion, &Value::from(rr)) {
            Ok(score) => lines.push(format!(
                "{}: {}/3, {}",
                labels.curb65,
                score.score,
                score.interpretation(lang)
            )),
            Err(e) => tracing::warn!(error = %e, "CURB-65 skipped"),
        }
    }

    lines
}

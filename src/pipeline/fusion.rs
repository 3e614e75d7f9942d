//! Triage Fusion Engine.
//!
//! Combines deterministic vital-sign rules with the probabilistic
//! hypotheses into one recommendation tier. Vital-sign overrides take
//! absolute precedence; otherwise the most severe hypothesis decides.

use crate::config::SafetyThresholds;
use crate::messages::triage_text;
use crate::models::{AnalysisResult, Condition, Language, Probability, TriageRecommendation, TriageTier, VitalExtract};

/// Hypotheses shown to the patient.
pub const PRESENTED_CONDITIONS: usize = 3;

/// Which vital-sign rule forced the tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SafetyOverride {
    Temperature(f64),
    SeverePain(i64),
    Hypertensive { systolic: Option<i64>, diastolic: Option<i64> },
    ModeratePain(i64),
}

impl SafetyOverride {
    pub fn tier(&self) -> TriageTier {
        match self {
            SafetyOverride::ModeratePain(_) => TriageTier::ContactDoctor,
            _ => TriageTier::UrgentCare,
        }
    }
}

/// First vital-sign rule that fires, urgent rules before contact-doctor.
pub fn safety_override(vitals: &VitalExtract, limits: &SafetyThresholds) -> Option<SafetyOverride> {
    if let Some(t) = vitals.temperature_celsius {
        if t > limits.urgent_temperature_celsius {
            return Some(SafetyOverride::Temperature(t));
        }
    }
    if let Some(p) = vitals.pain_score {
        if p >= limits.urgent_pain_score {
            return Some(SafetyOverride::SeverePain(p));
        }
    }
    let systolic_high = vitals.systolic.is_some_and(|s| s > limits.urgent_systolic);
    let diastolic_high = vitals.diastolic.is_some_and(|d| d > limits.urgent_diastolic);
    if systolic_high || diastolic_high {
        return Some(SafetyOverride::Hypertensive {
            systolic: vitals.systolic,
            diastolic: vitals.diastolic,
        });
    }
    match vitals.pain_score {
        Some(p) if p >= limits.contact_pain_score => Some(SafetyOverride::ModeratePain(p)),
        _ => None,
    }
}

/// Maximum severity wins; no hypotheses means insufficient information.
pub fn tier_from_conditions(conditions: &[Condition]) -> TriageTier {
    let highest = conditions.iter().map(|c| c.probability).max_by_key(|p| p.weight());
    match highest {
        Some(Probability::High) => TriageTier::UrgentCare,
        Some(Probability::Medium) => TriageTier::ContactDoctor,
        Some(Probability::Low) => TriageTier::SelfCare,
        None => TriageTier::InsufficientInfo,
    }
}

/// Fuse vitals and hypotheses into a recommendation.
pub fn fuse(
    vitals: &VitalExtract,
    analysis: &AnalysisResult,
    limits: &SafetyThresholds,
    lang: Language,
) -> TriageRecommendation {
    let tier = match safety_override(vitals, limits) {
        Some(rule) => {
            tracing::info!(?rule, tier = %rule.tier(), "Safety override applied");
            rule.tier()
        }
        None => {
            let tier = tier_from_conditions(&analysis.potential_conditions);
            tracing::info!(conditions = analysis.potential_conditions.len(), %tier, "Tier from hypotheses");
            tier
        }
    };

    let (label, message) = triage_text(lang, tier);
    TriageRecommendation {
        tier,
        label: label.to_string(),
        message: message.to_string(),
    }
}

/// Most severe first, ties in original order, at most three.
pub fn present(conditions: &[Condition]) -> Vec<Condition> {
    let mut sorted = conditions.to_vec();
    sorted.sort_by_key(|c| std::cmp::Reverse(c.probability.weight()));
    sorted.truncate(PRESENTED_CONDITIONS);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(name: &str, p: Probability) -> Condition {
        Condition::new(name, p, "")
    }

    fn analysis(conditions: Vec<Condition>) -> AnalysisResult {
        AnalysisResult {
            potential_conditions: conditions,
            ..AnalysisResult::default()
        }
    }

    fn tier(vitals: &VitalExtract, conditions: Vec<Condition>) -> TriageTier {
        fuse(vitals, &analysis(conditions), &SafetyThresholds::default(), Language::En).tier
    }

    #[test]
    fn high_fever_overrides_any_analysis() {
        let vitals = VitalExtract {
            temperature_celsius: Some(40.0),
            ..Default::default()
        };
        assert_eq!(tier(&vitals, vec![]), TriageTier::UrgentCare);
        assert_eq!(tier(&vitals, vec![cond("Cold", Probability::Low)]), TriageTier::UrgentCare);
    }

    #[test]
    fn temperature_at_threshold_does_not_override() {
        let vitals = VitalExtract {
            temperature_celsius: Some(39.5),
            ..Default::default()
        };
        assert_eq!(tier(&vitals, vec![]), TriageTier::InsufficientInfo);
    }

    #[test]
    fn severe_pain_is_urgent_regardless_of_hypotheses() {
        let vitals = VitalExtract {
            pain_score: Some(9),
            ..Default::default()
        };
        assert_eq!(tier(&vitals, vec![]), TriageTier::UrgentCare);
    }

    #[test]
    fn moderate_pain_forces_contact_doctor() {
        let vitals = VitalExtract {
            pain_score: Some(7),
            ..Default::default()
        };
        assert_eq!(tier(&vitals, vec![cond("Strain", Probability::Low)]), TriageTier::ContactDoctor);
        assert_eq!(tier(&vitals, vec![cond("MI", Probability::High)]), TriageTier::ContactDoctor);
    }

    #[test]
    fn hypertensive_readings_are_urgent() {
        for (s, d) in [(Some(181), None), (None, Some(121)), (Some(150), Some(125))] {
            let vitals = VitalExtract {
                systolic: s,
                diastolic: d,
                ..Default::default()
            };
            assert_eq!(tier(&vitals, vec![]), TriageTier::UrgentCare, "{s:?}/{d:?}");
        }
        let vitals = VitalExtract {
            systolic: Some(180),
            diastolic: Some(120),
            ..Default::default()
        };
        assert_eq!(tier(&vitals, vec![]), TriageTier::InsufficientInfo);
    }

    #[test]
    fn maximum_severity_wins() {
        let none = VitalExtract::default();
        assert_eq!(tier(&none, vec![cond("A", Probability::Low)]), TriageTier::SelfCare);
        assert_eq!(
            tier(&none, vec![cond("A", Probability::Medium), cond("B", Probability::Low)]),
            TriageTier::ContactDoctor
        );
        assert_eq!(
            tier(&none, vec![cond("A", Probability::Low), cond("B", Probability::High)]),
            TriageTier::UrgentCare
        );
        assert_eq!(tier(&none, vec![]), TriageTier::InsufficientInfo);
    }

    #[test]
    fn thresholds_are_configurable() {
        let limits = SafetyThresholds {
            urgent_temperature_celsius: 38.0,
            ..Default::default()
        };
        let vitals = VitalExtract {
            temperature_celsius: Some(38.5),
            ..Default::default()
        };
        let rec = fuse(&vitals, &AnalysisResult::empty(), &limits, Language::It);
        assert_eq!(rec.tier, TriageTier::UrgentCare);
        assert_eq!(rec.label, "Cura Urgente (Alto Rischio)");
    }

    #[test]
    fn insufficient_info_uses_default_message() {
        let rec = fuse(
            &VitalExtract::default(),
            &AnalysisResult::failed("partition missing"),
            &SafetyThresholds::default(),
            Language::En,
        );
        assert_eq!(rec.tier, TriageTier::InsufficientInfo);
        assert_eq!(rec.label, "Insufficient Information");
    }

    #[test]
    fn presentation_orders_by_severity_and_truncates() {
        let presented = present(&[
            cond("L1", Probability::Low),
            cond("M1", Probability::Medium),
            cond("H1", Probability::High),
            cond("M2", Probability::Medium),
            cond("L2", Probability::Low),
        ]);
        let names: Vec<&str> = presented.iter().map(|c| c.condition.as_str()).collect();
        assert_eq!(names, vec!["H1", "M1", "M2"]);
    }

    #[test]
    fn high_and_low_end_to_end() {
        let conditions = vec![cond("Low one", Probability::Low), cond("High one", Probability::High)];
        assert_eq!(tier(&VitalExtract::default(), conditions.clone()), TriageTier::UrgentCare);
        assert_eq!(present(&conditions)[0].condition, "High one");
    }
}

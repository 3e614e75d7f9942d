use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "Triage";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Languages with a full message table.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "it"];

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,triage_lib=debug"
    } else {
        "info"
    }
}

/// Get the application data directory (platform data dir + "Triage").
///
/// Falls back to the working directory when the platform exposes none
/// (minimal containers).
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the specialty-partitioned corpus.
pub fn default_corpus_dir() -> PathBuf {
    app_data_dir().join("corpus")
}

/// Default location of optional local ONNX models (`embedder/`, `reranker/`).
pub fn default_models_dir() -> PathBuf {
    app_data_dir().join("models")
}

/// Default location of the session document store.
pub fn default_session_db() -> PathBuf {
    app_data_dir().join("sessions.db")
}

// ═══════════════════════════════════════════════════════════
// Thresholds
// ═══════════════════════════════════════════════════════════

/// Hard vital-sign limits that force a conservative tier regardless of
/// what the hypothesis pipeline produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyThresholds {
    /// Temperature strictly above this forces urgent care.
    pub urgent_temperature_celsius: f64,
    /// Pain at or above this forces urgent care.
    pub urgent_pain_score: i64,
    /// Pain at or above this (and below urgent) forces contact-doctor.
    pub contact_pain_score: i64,
    /// Systolic strictly above this forces urgent care.
    pub urgent_systolic: i64,
    /// Diastolic strictly above this forces urgent care.
    pub urgent_diastolic: i64,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            urgent_temperature_celsius: 39.5,
            urgent_pain_score: 9,
            contact_pain_score: 7,
            urgent_systolic: 180,
            urgent_diastolic: 120,
        }
    }
}

/// Day counts separating acute / subacute / chronic complaints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationThresholds {
    /// Up to and including this many days is acute.
    pub acute_max_days: i64,
    /// Up to and including this many days is subacute; beyond is chronic.
    pub subacute_max_days: i64,
}

impl Default for DurationThresholds {
    fn default() -> Self {
        Self {
            acute_max_days: 14,
            subacute_max_days: 90,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// TriageConfig
// ═══════════════════════════════════════════════════════════

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub ollama_url: String,
    pub llm_model: String,
    pub embed_model: String,
    pub llm_timeout: Duration,
    pub corpus_dir: PathBuf,
    pub models_dir: PathBuf,
    pub session_db: PathBuf,
    pub bind_addr: String,
    pub lock_timeout: Duration,
    pub idle_timeout: Duration,
    pub eviction_interval: Duration,
    /// Stage 1 (vector search) candidate count.
    pub stage1_top_k: usize,
    /// Stage 2 (rerank) kept count.
    pub stage2_top_k: usize,
    pub default_language: String,
    pub safety: SafetyThresholds,
    pub duration: DurationThresholds,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".into(),
            llm_model: "llama3:8b".into(),
            embed_model: "nomic-embed-text".into(),
            llm_timeout: Duration::from_secs(120),
            corpus_dir: default_corpus_dir(),
            models_dir: default_models_dir(),
            session_db: default_session_db(),
            bind_addr: "127.0.0.1:8000".into(),
            lock_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60 * 60),
            eviction_interval: Duration::from_secs(15 * 60),
            stage1_top_k: 30,
            stage2_top_k: 10,
            default_language: "en".into(),
            safety: SafetyThresholds::default(),
            duration: DurationThresholds::default(),
        }
    }
}

/// Errors from configuration resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

impl TriageConfig {
    /// Resolve configuration from `TRIAGE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary key lookup.
    ///
    /// Unset keys keep their defaults; set-but-unparseable keys are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("TRIAGE_OLLAMA_URL") {
            cfg.ollama_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("TRIAGE_LLM_MODEL") {
            cfg.llm_model = v;
        }
        if let Some(v) = lookup("TRIAGE_EMBED_MODEL") {
            cfg.embed_model = v;
        }
        if let Some(v) = lookup("TRIAGE_CORPUS_DIR") {
            cfg.corpus_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TRIAGE_MODELS_DIR") {
            cfg.models_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TRIAGE_SESSION_DB") {
            cfg.session_db = PathBuf::from(v);
        }
        if let Some(v) = lookup("TRIAGE_BIND_ADDR") {
            cfg.bind_addr = v;
        }
        if let Some(v) = lookup("TRIAGE_LLM_TIMEOUT_SECS") {
            cfg.llm_timeout = Duration::from_secs(parse_num("TRIAGE_LLM_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("TRIAGE_LOCK_TIMEOUT_SECS") {
            cfg.lock_timeout = Duration::from_secs(parse_num("TRIAGE_LOCK_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("TRIAGE_IDLE_TIMEOUT_MINS") {
            cfg.idle_timeout =
                Duration::from_secs(parse_num::<u64>("TRIAGE_IDLE_TIMEOUT_MINS", &v)? * 60);
        }
        if let Some(v) = lookup("TRIAGE_EVICTION_INTERVAL_SECS") {
            cfg.eviction_interval =
                Duration::from_secs(parse_num("TRIAGE_EVICTION_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = lookup("TRIAGE_STAGE1_TOP_K") {
            cfg.stage1_top_k = parse_num("TRIAGE_STAGE1_TOP_K", &v)?;
        }
        if let Some(v) = lookup("TRIAGE_STAGE2_TOP_K") {
            cfg.stage2_top_k = parse_num("TRIAGE_STAGE2_TOP_K", &v)?;
        }
        if let Some(v) = lookup("TRIAGE_DEFAULT_LANGUAGE") {
            let lang = v.trim().to_lowercase();
            if !SUPPORTED_LANGUAGES.contains(&lang.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: "TRIAGE_DEFAULT_LANGUAGE",
                    value: v,
                });
            }
            cfg.default_language = lang;
        }
        if let Some(v) = lookup("TRIAGE_URGENT_TEMPERATURE") {
            cfg.safety.urgent_temperature_celsius = parse_num("TRIAGE_URGENT_TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("TRIAGE_URGENT_PAIN") {
            cfg.safety.urgent_pain_score = parse_num("TRIAGE_URGENT_PAIN", &v)?;
        }
        if let Some(v) = lookup("TRIAGE_CONTACT_PAIN") {
            cfg.safety.contact_pain_score = parse_num("TRIAGE_CONTACT_PAIN", &v)?;
        }

        if cfg.stage1_top_k == 0 || cfg.stage2_top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRIAGE_STAGE*_TOP_K",
                value: "0".into(),
            });
        }

        Ok(cfg)
    }
}

fn parse_num<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = TriageConfig::default();
        assert_eq!(cfg.stage1_top_k, 30);
        assert_eq!(cfg.stage2_top_k, 10);
        assert_eq!(cfg.lock_timeout, Duration::from_secs(5));
        assert_eq!(cfg.safety.urgent_pain_score, 9);
        assert_eq!(cfg.safety.contact_pain_score, 7);
        assert_eq!(cfg.duration.acute_max_days, 14);
        assert_eq!(cfg.duration.subacute_max_days, 90);
    }

    #[test]
    fn empty_lookup_yields_defaults() {
        let cfg = TriageConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.llm_model, "llama3:8b");
        assert_eq!(cfg.default_language, "en");
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = TriageConfig::from_lookup(lookup_from(&[
            ("TRIAGE_OLLAMA_URL", "http://gpu-box:11434/"),
            ("TRIAGE_STAGE1_TOP_K", "50"),
            ("TRIAGE_IDLE_TIMEOUT_MINS", "5"),
            ("TRIAGE_DEFAULT_LANGUAGE", "IT"),
            ("TRIAGE_URGENT_TEMPERATURE", "40.0"),
        ]))
        .unwrap();
        assert_eq!(cfg.ollama_url, "http://gpu-box:11434");
        assert_eq!(cfg.stage1_top_k, 50);
        assert_eq!(cfg.idle_timeout, Duration::from_secs(300));
        assert_eq!(cfg.default_language, "it");
        assert!((cfg.safety.urgent_temperature_celsius - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unparseable_value_is_rejected() {
        let err = TriageConfig::from_lookup(lookup_from(&[("TRIAGE_STAGE2_TOP_K", "ten")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "TRIAGE_STAGE2_TOP_K", .. }));
    }

    #[test]
    fn unsupported_language_is_rejected() {
        let result = TriageConfig::from_lookup(lookup_from(&[("TRIAGE_DEFAULT_LANGUAGE", "fr")]));
        assert!(result.is_err());
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let result = TriageConfig::from_lookup(lookup_from(&[("TRIAGE_STAGE1_TOP_K", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with(APP_NAME));
        assert!(default_corpus_dir().starts_with(app_data_dir()));
    }
}

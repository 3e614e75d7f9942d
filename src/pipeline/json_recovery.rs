//! Recovery of structured data from generative output.
//!
//! Models asked for JSON still wrap it in prose, code fences, or an extra
//! envelope key, or encode it twice. Each recovery is an ordered chain of
//! tagged attempts; the first that yields the expected shape wins and its
//! path is reported for logging.

use serde_json::{Map, Value};

use crate::models::Condition;

/// Envelope keys models put around the payload.
pub const WRAPPER_KEYS: &[&str] = &["analysis", "response", "result", "output"];

const CONDITIONS_KEY: &str = "potential_conditions";
const MAX_UNWRAP_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsonRecoveryError {
    #[error("No JSON object found in model output")]
    NoJson,

    #[error("JSON has no usable 'potential_conditions' list")]
    MissingConditions,

    #[error("All {0} condition items failed validation")]
    NoValidItems(usize),
}

/// One step taken while recovering a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStep {
    /// Whole output parsed as-is.
    Strict,
    /// Outermost `{ ... }` span parsed after strict parsing failed.
    BraceBoundary,
    /// Payload found under an envelope key.
    Unwrapped(&'static str),
    /// A string value that itself held JSON.
    EncodedString,
    /// A bare list standing in for the object.
    ListForm,
}

/// Conditions recovered from a hypothesis response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedConditions {
    pub conditions: Vec<Condition>,
    /// Items dropped because they were not objects or failed validation.
    pub dropped: usize,
    pub path: Vec<ParseStep>,
}

// ═══════════════════════════════════════════════════════════
// Top-level value
// ═══════════════════════════════════════════════════════════

/// Parse model output into a JSON value: strict first, then the outermost
/// brace span (which also covers fenced blocks and surrounding prose).
pub fn recover_value(raw: &str) -> Result<(Value, ParseStep), JsonRecoveryError> {
    let trimmed = raw.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Ok((v, ParseStep::Strict));
    }

    if let Some(block) = brace_span(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(block) {
            return Ok((v, ParseStep::BraceBoundary));
        }
    }

    if let Some(block) = bracket_span(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(block) {
            return Ok((v, ParseStep::BraceBoundary));
        }
    }

    Err(JsonRecoveryError::NoJson)
}

/// Recover a JSON object, unwrapping a single envelope key if the object
/// only holds the payload under one.
pub fn recover_object(raw: &str) -> Result<(Map<String, Value>, Vec<ParseStep>), JsonRecoveryError> {
    let (value, step) = recover_value(raw)?;
    let mut path = vec![step];
    let mut current = value;

    for _ in 0..MAX_UNWRAP_DEPTH {
        match current {
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some((key, inner)) = wrapper_entry(&map) {
                        if let Some(inner) = decode_if_string(inner, &mut path) {
                            if inner.is_object() {
                                path.push(ParseStep::Unwrapped(key));
                                current = inner;
                                continue;
                            }
                        }
                    }
                }
                return Ok((map, path));
            }
            Value::String(s) => match recover_value(&s) {
                Ok((inner, _)) => {
                    path.push(ParseStep::EncodedString);
                    current = inner;
                }
                Err(_) => return Err(JsonRecoveryError::NoJson),
            },
            Value::Array(items) => match items.into_iter().find(|v| v.is_object()) {
                Some(first) => {
                    path.push(ParseStep::ListForm);
                    current = first;
                }
                None => return Err(JsonRecoveryError::NoJson),
            },
            _ => return Err(JsonRecoveryError::NoJson),
        }
    }
    Err(JsonRecoveryError::NoJson)
}

fn brace_span(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (start < end).then(|| &s[start..=end])
}

fn bracket_span(s: &str) -> Option<&str> {
    let start = s.find('[')?;
    let end = s.rfind(']')?;
    (start < end).then(|| &s[start..=end])
}

fn wrapper_entry(map: &Map<String, Value>) -> Option<(&'static str, &Value)> {
    WRAPPER_KEYS
        .iter()
        .find_map(|k| map.get(*k).map(|v| (*k, v)))
}

fn decode_if_string(value: &Value, path: &mut Vec<ParseStep>) -> Option<Value> {
    match value {
        Value::String(s) => {
            let (inner, _) = recover_value(s).ok()?;
            path.push(ParseStep::EncodedString);
            Some(inner)
        }
        other => Some(other.clone()),
    }
}

// ═══════════════════════════════════════════════════════════
// Condition lists
// ═══════════════════════════════════════════════════════════

/// Recover a `potential_conditions` list from hypothesis output.
///
/// Attempt order: strict schema, brace boundary, envelope keys (including
/// string-encoded JSON and list forms), then per-item filtering where
/// non-object items and items failing validation are dropped.
///
/// An explicitly empty list is a valid answer. A non-empty list where every
/// item is dropped is not.
pub fn parse_conditions(raw: &str) -> Result<ParsedConditions, JsonRecoveryError> {
    let (value, step) = recover_value(raw)?;
    let mut path = vec![step];
    let items = locate_conditions(value, &mut path, 0).ok_or(JsonRecoveryError::MissingConditions)?;
    validate_items(items, path)
}

/// Validate an already-parsed `potential_conditions` value.
pub fn conditions_from_value(value: Value) -> Result<ParsedConditions, JsonRecoveryError> {
    let mut path = vec![ParseStep::Strict];
    let items = locate_conditions(value, &mut path, 0).ok_or(JsonRecoveryError::MissingConditions)?;
    validate_items(items, path)
}

fn validate_items(
    items: Vec<Value>,
    path: Vec<ParseStep>,
) -> Result<ParsedConditions, JsonRecoveryError> {
    let total = items.len();
    let conditions: Vec<Condition> = items
        .into_iter()
        .filter(|v| v.is_object())
        .filter_map(|v| serde_json::from_value::<Condition>(v).ok())
        .filter(|c| !c.condition.trim().is_empty())
        .collect();

    if total > 0 && conditions.is_empty() {
        return Err(JsonRecoveryError::NoValidItems(total));
    }

    Ok(ParsedConditions {
        dropped: total - conditions.len(),
        conditions,
        path,
    })
}

fn locate_conditions(value: Value, path: &mut Vec<ParseStep>, depth: usize) -> Option<Vec<Value>> {
    if depth > MAX_UNWRAP_DEPTH {
        return None;
    }

    match value {
        Value::Object(mut map) => {
            if let Some(list) = map.remove(CONDITIONS_KEY) {
                match list {
                    Value::Array(items) => return Some(items),
                    Value::String(s) => {
                        let (inner, _) = recover_value(&s).ok()?;
                        path.push(ParseStep::EncodedString);
                        return match inner {
                            Value::Array(items) => Some(items),
                            other => locate_conditions(other, path, depth + 1),
                        };
                    }
                    _ => return None,
                }
            }
            for key in WRAPPER_KEYS {
                if let Some(inner) = map.remove(*key) {
                    path.push(ParseStep::Unwrapped(*key));
                    let inner = match inner {
                        Value::String(s) => {
                            let (decoded, _) = recover_value(&s).ok()?;
                            path.push(ParseStep::EncodedString);
                            decoded
                        }
                        other => other,
                    };
                    return locate_conditions(inner, path, depth + 1);
                }
            }
            None
        }
        Value::Array(items) => {
            if items.iter().any(looks_like_condition) {
                path.push(ParseStep::ListForm);
                return Some(items);
            }
            let nested = items.into_iter().find(|v| {
                v.as_object()
                    .map(|m| m.contains_key(CONDITIONS_KEY) || WRAPPER_KEYS.iter().any(|k| m.contains_key(*k)))
                    .unwrap_or(false)
            })?;
            path.push(ParseStep::ListForm);
            locate_conditions(nested, path, depth + 1)
        }
        _ => None,
    }
}

fn looks_like_condition(v: &Value) -> bool {
    v.as_object()
        .map(|m| m.contains_key("condition"))
        .unwrap_or(false)
}

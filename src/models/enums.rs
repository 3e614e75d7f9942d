use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Error for a string that names no variant of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field} value: '{value}'")]
pub struct InvalidEnum {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Serde goes through the same string table so stored documents and wire
/// payloads agree.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

str_enum!(Role {
    System => "system",
    User => "user",
    Assistant => "assistant",
});

str_enum!(Language {
    En => "en",
    It => "it",
});

str_enum!(TriageTier {
    SelfCare => "self_care",
    ContactDoctor => "contact_doctor",
    UrgentCare => "urgent_care",
    InsufficientInfo => "insufficient_info",
});

impl Default for Language {
    fn default() -> Self {
        Language::En
    }
}

impl Language {
    /// Lenient resolution for request input: unknown or missing tags fall back.
    pub fn resolve(tag: Option<&str>, fallback: Language) -> Language {
        tag.and_then(|t| t.trim().to_lowercase().parse().ok())
            .unwrap_or(fallback)
    }
}

// ═══════════════════════════════════════════════════════════
// Probability
// ═══════════════════════════════════════════════════════════

/// Likelihood label attached to a candidate condition.
///
/// Generative output uses English and Italian variants; they are
/// normalized on the way in and anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Probability {
    High,
    Medium,
    Low,
}

impl Probability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// Normalize a free-form label. Returns `None` for unrecognized input.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "alta" | "alto" | "high" => Some(Self::High),
            "media" | "medio" | "medium" | "moderate" => Some(Self::Medium),
            "bassa" | "basso" | "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Severity weight used for presentation ordering.
    pub fn weight(&self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }
}

impl std::fmt::Display for Probability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Probability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Probability {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Probability::from_label(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "Invalid probability '{s}'. Must be High, Medium, or Low (or Italian equivalents)"
            ))
        })
    }
}

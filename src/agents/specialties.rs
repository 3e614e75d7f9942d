//! Available specialties and name normalization.
//!
//! Corpus partitions are tagged with the Italian specialist noun
//! (`cardiologo`, `allergologo`, ...). Models answer with the discipline,
//! the English noun, or the Italian one; the synonym table folds those onto
//! the partition tag before the availability check.

/// (variant, canonical tag)
const SYNONYMS: &[(&str, &str)] = &[
    ("allergology", "allergologo"),
    ("allergologia", "allergologo"),
    ("allergist", "allergologo"),
    ("allergologist", "allergologo"),
    ("immunology", "allergologo"),
    ("cardiology", "cardiologo"),
    ("cardiologia", "cardiologo"),
    ("cardiologist", "cardiologo"),
    ("gastroenterology", "gastroenterologo"),
    ("gastroenterologia", "gastroenterologo"),
    ("gastroenterologist", "gastroenterologo"),
    ("gastro", "gastroenterologo"),
    ("dermatology", "dermatologo"),
    ("dermatologia", "dermatologo"),
    ("dermatologist", "dermatologo"),
    ("neurology", "neurologo"),
    ("neurologia", "neurologo"),
    ("neurologist", "neurologo"),
    ("pulmonology", "pneumologo"),
    ("pneumologia", "pneumologo"),
    ("pulmonologist", "pneumologo"),
    ("orthopedics", "ortopedico"),
    ("ortopedia", "ortopedico"),
    ("orthopedist", "ortopedico"),
    ("orthopaedist", "ortopedico"),
    ("ent", "otorinolaringoiatra"),
    ("otorinolaringoiatria", "otorinolaringoiatra"),
    ("otolaryngologist", "otorinolaringoiatra"),
    ("endocrinology", "endocrinologo"),
    ("endocrinologia", "endocrinologo"),
    ("endocrinologist", "endocrinologo"),
    ("urology", "urologo"),
    ("urologia", "urologo"),
    ("urologist", "urologo"),
];

/// Lower-case, trim, strip quotes and trailing punctuation, fold synonyms.
pub fn normalize(raw: &str) -> String {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '`')
        .trim()
        .to_lowercase();

    SYNONYMS
        .iter()
        .find(|(variant, _)| *variant == cleaned)
        .map(|(_, tag)| tag.to_string())
        .unwrap_or(cleaned)
}

/// Specialties with a corpus partition, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecialtyRegistry {
    available: Vec<String>,
}

impl SpecialtyRegistry {
    pub fn new<I, S>(specialties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut available: Vec<String> = specialties
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        available.sort();
        available.dedup();
        Self { available }
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.available.iter().any(|s| s == tag)
    }

    /// Normalized tag if it names an available specialty.
    pub fn resolve(&self, raw: &str) -> Option<String> {
        let tag = normalize(raw);
        self.contains(&tag).then_some(tag)
    }

    /// Comma-separated list for prompts.
    pub fn prompt_list(&self) -> String {
        self.available.join(", ")
    }
}

//! Label and value normalization.
//!
//! Raw nutrition labels look like `Calories / kcal:` or `Saturated Fat`. They are turned into a
//! [`NutrientLabel`] by a fixed sequence of small transforms, each of which is pure and
//! idempotent on its own output:
//!
//! 1. [`lowercase_trim`]
//! 2. [`unit_suffix`] is read before the unit is removed
//! 3. [`strip_unit`] drops the `/ unit:` part
//! 4. [`collapse_whitespace`] joins words with `_`
//! 5. [`trim_separators`] removes leftover `_` and `:` at both ends

use once_cell::sync::Lazy;
use regex::Regex;

static UNIT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*/\s*(\w+)\s*:?").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Canonical key of a nutrient plus the unit its values are expressed in (may be empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NutrientLabel {
    pub key: String,
    pub unit: String,
}

pub fn lowercase_trim(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Unit named after a slash, e.g. `kcal` in `calories / kcal:`.
pub fn unit_suffix(label: &str) -> String {
    UNIT_PATTERN
        .captures(label)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default()
}

pub fn strip_unit(label: &str) -> String {
    UNIT_PATTERN.replace(label, "").into_owned()
}

pub fn collapse_whitespace(label: &str) -> String {
    WHITESPACE.replace_all(label.trim(), "_").into_owned()
}

pub fn trim_separators(label: &str) -> String {
    label.trim_matches(|c| c == '_' || c == ':').to_string()
}

/// Full pipeline for table-style labels that may carry a unit.
pub fn nutrient_label(raw: &str) -> NutrientLabel {
    let lowered = lowercase_trim(raw);
    let unit = unit_suffix(&lowered);
    let key = trim_separators(&collapse_whitespace(&strip_unit(&lowered)));
    NutrientLabel { key, unit }
}

/// Pipeline for plain labels that never carry a unit.
pub fn label_key(raw: &str) -> String {
    trim_separators(&collapse_whitespace(&lowercase_trim(raw)))
}

/// Lowercased value with every whitespace character removed (`12 g` → `12g`).
pub fn compact_value(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Lowercased, trimmed value with inner spacing kept.
pub fn clean_value(raw: &str) -> String {
    lowercase_trim(raw)
}

//! Acronym spelling normalisation.
//!
//! Each canonical acronym gets a matcher that accepts its letters separated
//! by an optional hyphen or space ("A D H D", "ptsd", "tf cbt" does not match
//! "TF-CBT" because its own hyphen is required). Matches are rewritten to the
//! canonical uppercase form. This pass only respells acronyms that are
//! already present; it never abbreviates a spelled-out term.

use regex::Regex;

use super::{NormalisationRules, RuleError};

/// `\bA[\- ]?D[\- ]?H[\- ]?D\b`, case-insensitive.
pub(crate) fn tolerant_matcher(acronym: &str) -> Result<Regex, RuleError> {
    let body = acronym
        .chars()
        .map(|c| regex::escape(&c.to_string()))
        .collect::<Vec<_>>()
        .join(r"[\- ]?");
    Regex::new(&format!(r"(?i)\b{body}\b")).map_err(|source| RuleError::Pattern {
        table: "canonical_acronyms",
        entry: acronym.to_string(),
        source,
    })
}

/// Rewrite every tolerant match of a canonical acronym to its canonical form.
pub fn canonicalise(text: &str, rules: &NormalisationRules) -> String {
    let mut out = text.to_string();
    for (re, acronym) in &rules.canonical {
        if re.is_match(&out) {
            out = re.replace_all(&out, acronym.as_str()).into_owned();
        }
    }
    out
}

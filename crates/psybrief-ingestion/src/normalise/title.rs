//! Clinician-facing titles.
//!
//! A title comes from, in order: the extractor's title if usable, the source
//! article title, or [`generate_title`] built from intervention and
//! population. Whichever wins has its protected acronyms re-uppercased and
//! then goes through [`normalise_acronyms`].

use std::sync::OnceLock;

use regex::Regex;

use super::{acronyms, NormalisationRules};

fn title_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w\S*").expect("valid regex"))
}

fn versus_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:versus|vs)\b").expect("valid regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Trim, drop one trailing period, collapse whitespace.
fn clean(s: &str) -> String {
    let t = s.trim();
    let t = t.strip_suffix('.').unwrap_or(t);
    whitespace_re().replace_all(t, " ").trim().to_string()
}

fn contains_bipolar(s: &str, rules: &NormalisationRules) -> bool {
    let lower = s.to_lowercase();
    rules.bipolar_terms.iter().any(|t| lower.contains(t.as_str()))
}

/// Phrase → acronym substitution, skipped entirely for bipolar text.
fn apply_acronym_map(s: &str, rules: &NormalisationRules) -> String {
    if s.is_empty() || contains_bipolar(s, rules) {
        return s.to_string();
    }
    let mut out = s.to_string();
    for (re, acronym) in &rules.acronym_subs {
        if re.is_match(&out) {
            out = re.replace_all(&out, acronym.as_str()).into_owned();
        }
    }
    out
}

fn strip_qualifiers(s: &str, rules: &NormalisationRules) -> String {
    let mut out = s.to_string();
    for re in &rules.qualifiers {
        if let Some(m) = re.find(&out) {
            out = out[m.end()..].to_string();
        }
    }
    out.trim().to_string()
}

/// First character of every word upper, the rest lower.
fn soft_title_case(s: &str) -> String {
    title_word_re()
        .replace_all(s, |caps: &regex::Captures<'_>| {
            let word = &caps[0];
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .into_owned()
}

fn restore_protected(s: &str, rules: &NormalisationRules) -> String {
    let mut out = s.to_string();
    for (re, acronym) in &rules.protected {
        if re.is_match(&out) {
            out = re.replace_all(&out, acronym.as_str()).into_owned();
        }
    }
    out
}

/// Build a title from intervention and population.
pub fn generate_title(
    intervention: Option<&str>,
    population: Option<&str>,
    rules: &NormalisationRules,
) -> String {
    let intervention = apply_acronym_map(&clean(intervention.unwrap_or("")), rules);
    let population = apply_acronym_map(&clean(population.unwrap_or("")), rules);
    let population = strip_qualifiers(&population, rules);

    let title = match (intervention.is_empty(), population.is_empty()) {
        (false, false) => format!("{intervention} for {population}"),
        (false, true) => intervention,
        (true, false) => format!("Study in {population}"),
        (true, true) => rules.tables().untitled.clone(),
    };

    let title = restore_protected(&soft_title_case(&title), rules);
    versus_re().replace_all(&title, "vs").trim().to_string()
}

/// Final pass over any chosen title.
pub fn normalise_acronyms(title: &str, rules: &NormalisationRules) -> String {
    acronyms::canonicalise(title, rules)
}

/// Non-empty and not starting with a digit.
fn usable(title: &str) -> bool {
    title
        .chars()
        .next()
        .is_some_and(|c| !c.is_ascii_digit())
}

/// Pick and normalise the persisted title.
pub fn canonical_title(
    model_title: Option<&str>,
    source_title: Option<&str>,
    intervention: Option<&str>,
    population: Option<&str>,
    rules: &NormalisationRules,
) -> String {
    let model = model_title.map(clean).filter(|t| usable(t));
    let source = source_title.map(clean).filter(|t| !t.is_empty());

    let chosen = match (model, source) {
        (Some(t), _) => t,
        (None, Some(t)) => t,
        (None, None) => generate_title(intervention, population, rules),
    };
    normalise_acronyms(&restore_protected(&chosen, rules), rules)
}

//! Key-findings bullet assembly.
//!
//! Output shape, always 3 to 8 entries:
//!   `Arms: …`, up to 6 findings (trimmed to 5 if needed), `Safety: …`, `Takeaway: ….`

use std::sync::OnceLock;

use regex::Regex;

use super::NormalisationRules;

pub const MAX_FINDINGS: usize = 6;
pub const MAX_BULLETS: usize = 8;
pub const MAX_MIDDLE_WHEN_TRIMMED: usize = 5;

fn slot_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*(?:arms|safety|takeaway)\s*:\s*").expect("valid regex"))
}

/// Remove every leading `Arms:` / `Safety:` / `Takeaway:` tag.
pub fn strip_bullet_prefixes(s: &str) -> String {
    let mut out = s.trim();
    while let Some(m) = slot_prefix_re().find(out) {
        out = out[m.end()..].trim_start();
    }
    out.trim().to_string()
}

/// Uppercase the first character only.
pub fn sentence_case(s: &str) -> String {
    let t = s.trim();
    let mut chars = t.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn comparable(s: &str) -> String {
    s.trim().trim_end_matches('.').trim().to_lowercase()
}

/// Assemble the final bullet list.
pub fn build_key_findings(
    raw_findings: &[String],
    arms: Option<&str>,
    safety_notes: Option<&str>,
    takeaway: Option<&str>,
    rules: &NormalisationRules,
) -> Vec<String> {
    let tables = rules.tables();

    let arms_text = arms
        .map(strip_bullet_prefixes)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| tables.arms_fallback.clone());
    let safety_text = safety_notes
        .map(strip_bullet_prefixes)
        .map(|s| sentence_case(&s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| tables.safety_fallback.clone());
    let takeaway_given = takeaway
        .map(strip_bullet_prefixes)
        .map(|t| sentence_case(&t))
        .filter(|t| !t.is_empty());

    // A stripped finding repeating a synthesized slot adds nothing.
    let mut slot_texts = vec![comparable(&arms_text), comparable(&safety_text)];
    if let Some(t) = &takeaway_given {
        slot_texts.push(comparable(t));
    }

    let mut findings: Vec<String> = raw_findings
        .iter()
        .map(|f| sentence_case(&strip_bullet_prefixes(f)))
        .filter(|f| !f.is_empty())
        .filter(|f| !slot_texts.contains(&comparable(f)))
        .collect();
    findings.truncate(MAX_FINDINGS);

    let takeaway_text = takeaway_given
        .or_else(|| findings.first().cloned())
        .unwrap_or_else(|| tables.takeaway_fallback.clone());
    let takeaway_text = takeaway_text.trim_end().trim_end_matches('.').trim_end();

    let mut bullets = Vec::with_capacity(findings.len() + 3);
    bullets.push(format!("Arms: {arms_text}"));
    bullets.extend(findings);
    bullets.push(format!("Safety: {safety_text}"));
    bullets.push(format!("Takeaway: {takeaway_text}."));

    if bullets.len() > MAX_BULLETS {
        let tail = bullets.split_off(bullets.len() - 2);
        bullets.truncate(1 + MAX_MIDDLE_WHEN_TRIMMED);
        bullets.extend(tail);
    }
    bullets
}

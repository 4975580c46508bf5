//! Category resolution.

use psybrief_common::Category;

use super::NormalisationRules;

fn by_keywords(text: &str, rules: &NormalisationRules) -> Option<Category> {
    rules
        .category_rules
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(c, _)| *c)
}

/// Exact label, then keywords on the category text, then keywords on the
/// population, then `Other`.
pub fn normalise_category(
    raw: Option<&str>,
    population: Option<&str>,
    rules: &NormalisationRules,
) -> Category {
    let raw = raw.map(str::trim).filter(|r| !r.is_empty());

    if let Some(exact) = raw.and_then(Category::from_label) {
        return exact;
    }
    raw.and_then(|r| by_keywords(r, rules))
        .or_else(|| population.and_then(|p| by_keywords(p, rules)))
        .unwrap_or(Category::Other)
}

//! Study-type collapsing.

use psybrief_common::StudyType;

use super::NormalisationRules;

/// Map any text to exactly one study type.
///
/// Exact labels map to themselves; otherwise the keyword rules run in order
/// and the first match wins. Empty or unmatched input gets the fallback.
pub fn normalise_study_type(raw: &str, rules: &NormalisationRules) -> StudyType {
    let raw = raw.trim();
    if raw.is_empty() {
        return rules.tables().study_type_fallback;
    }
    if let Some(exact) = StudyType::from_label(raw) {
        return exact;
    }

    let s = raw.to_lowercase();
    rules
        .study_type_rules
        .iter()
        .find(|(_, any_of)| {
            any_of
                .iter()
                .any(|group| group.iter().all(|kw| s.contains(kw.as_str())))
        })
        .map(|(t, _)| *t)
        .unwrap_or(rules.tables().study_type_fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn st(s: &str) -> StudyType {
        normalise_study_type(s, &NormalisationRules::builtin())
    }

    #[test]
    fn test_examples() {
        assert_eq!(st("Double-blind, randomized, placebo-controlled trial"), StudyType::DbRct);
        assert_eq!(st("post hoc analysis of a prior trial"), StudyType::PostHoc);
        assert_eq!(st("Triple-blind randomised trial"), StudyType::TripleBlindRct);
        assert_eq!(st("Single-blind, randomized, sham-controlled clinical study"), StudyType::SbRct);
        assert_eq!(st("open-label randomized trial"), StudyType::Rct);
        assert_eq!(st("Exploratory analysis"), StudyType::SecondaryAnalysis);
        assert_eq!(st("Prospective cohort study"), StudyType::Cohort);
        assert_eq!(st("case control"), StudyType::CaseControl);
        assert_eq!(st("Observational study"), StudyType::Observational);
        assert_eq!(st("Study protocol"), StudyType::Protocol);
    }

    #[test]
    fn test_reviews_win_over_random() {
        assert_eq!(
            st("Systematic review and meta-analysis of randomized trials"),
            StudyType::MetaAnalysis
        );
        assert_eq!(st("systematic review of randomised studies"), StudyType::SystematicReview);
    }

    #[test]
    fn test_labels_are_fixed_points() {
        for t in StudyType::ALL {
            assert_eq!(st(t.as_str()), t);
            assert_eq!(st(&t.as_str().to_uppercase()), t);
        }
    }

    #[test]
    fn test_total_with_fallback() {
        assert_eq!(st(""), StudyType::ClinicalTrial);
        assert_eq!(st("   "), StudyType::ClinicalTrial);
        assert_eq!(st("open-label pilot"), StudyType::ClinicalTrial);
        assert_eq!(st("🙂 ∆ unknown"), StudyType::ClinicalTrial);
    }
}

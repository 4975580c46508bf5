//! Deterministic normalisation engine.
//!
//! Turns a validated [`ExtractionResult`] into a [`NormalisedExtraction`]:
//! - `title`: fallback title generation and the final acronym pass
//! - `study_type`: free text → one of the 14 study-type labels
//! - `category`: free text / population → one of the 6 categories
//! - `findings`: Arms / findings / Safety / Takeaway bullet assembly
//!
//! All lookup data lives in [`RuleTables`], compiled once into
//! [`NormalisationRules`] and passed in explicitly. No function here does I/O.

pub mod acronyms;
pub mod category;
pub mod findings;
pub mod study_type;
pub mod title;

use std::sync::{Arc, OnceLock};

use chrono::NaiveDate;
use psybrief_common::{Category, StudyType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ExtractionResult, NormalisedExtraction, TrustedMetadata};

pub use category::normalise_category;
pub use findings::build_key_findings;
pub use study_type::normalise_study_type;
pub use title::{canonical_title, generate_title, normalise_acronyms};

// ── Tables ────────────────────────────────────────────────────────────────────

/// Phrase → acronym substitution used by fallback title generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcronymRule {
    pub phrase: String,
    pub acronym: String,
}

/// A study type and the keyword groups that select it. The rule matches when
/// every keyword of any one group occurs in the lowercased input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyTypeRule {
    pub study_type: StudyType,
    pub any_of: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryKeywords {
    pub category: Category,
    pub keywords: Vec<String>,
}

/// Lookup data for the engine. Every field has a built-in default, so a
/// config file only lists what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTables {
    /// Applied in order; longer phrases must precede their substrings.
    pub acronym_map: Vec<AcronymRule>,
    /// Re-uppercased after title casing.
    pub protected_acronyms: Vec<String>,
    /// Spelling-normalised in every final title. Listing an acronym here
    /// never makes the engine introduce it.
    pub canonical_acronyms: Vec<String>,
    /// Strings containing any of these skip acronym substitution entirely.
    pub bipolar_terms: Vec<String>,
    /// Regex fragments stripped from the start of the population, in order.
    pub population_qualifiers: Vec<String>,
    /// First match wins.
    pub study_type_rules: Vec<StudyTypeRule>,
    pub study_type_fallback: StudyType,
    /// Highest priority first.
    pub category_keywords: Vec<CategoryKeywords>,
    pub untitled: String,
    pub arms_fallback: String,
    pub safety_fallback: String,
    pub takeaway_fallback: String,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn groups(items: &[&[&str]]) -> Vec<Vec<String>> {
    items.iter().map(|g| strings(g)).collect()
}

impl Default for RuleTables {
    fn default() -> Self {
        let acronym_map = [
            ("major depressive disorder", "MDD"),
            ("major depression", "MDD"),
            ("depression", "MDD"),
            ("generalized anxiety disorder", "GAD"),
            ("schizophrenia", "SCZ"),
            ("autism spectrum disorder", "ASD"),
            ("autism", "ASD"),
            ("adhd", "ADHD"),
            ("attention-deficit/hyperactivity disorder", "ADHD"),
            ("post-traumatic stress disorder", "PTSD"),
            ("obsessive-compulsive disorder", "OCD"),
        ]
        .into_iter()
        .map(|(phrase, acronym)| AcronymRule { phrase: phrase.into(), acronym: acronym.into() })
        .collect();

        use StudyType as T;
        let study_type_rules = [
            // Reviews first so "random" inside them cannot win.
            (T::MetaAnalysis,      groups(&[&["meta-analysis"], &["meta analysis"]])),
            (T::SystematicReview,  groups(&[&["systematic review"]])),
            (T::TripleBlindRct,    groups(&[&["triple", "blind", "random"]])),
            (T::DbRct,             groups(&[&["double", "blind", "random"]])),
            (T::SbRct,             groups(&[&["single", "blind", "random"]])),
            (T::Rct,               groups(&[&["random"]])),
            (T::PostHoc,           groups(&[&["post hoc"], &["post-hoc"]])),
            (T::SecondaryAnalysis, groups(&[&["secondary"], &["exploratory"]])),
            (T::Cohort,            groups(&[&["cohort"]])),
            (T::CaseControl,       groups(&[&["case-control"], &["case control"]])),
            (T::Observational,     groups(&[&["observational"]])),
            (T::Protocol,          groups(&[&["protocol"]])),
        ]
        .into_iter()
        .map(|(study_type, any_of)| StudyTypeRule { study_type, any_of })
        .collect();

        let category_keywords = [
            (Category::Neurodevelopmental, &[
                "adhd", "attention-deficit", "attention deficit", "hyperactivity", "autism",
                "autistic", "asd", "intellectual disabilit", "learning disorder",
                "learning disabilit", "tourette", "tic disorder", "neurodevelopmental",
            ][..]),
            (Category::Psychosis, &[
                "schizophreni", "schizoaffective", "psychosis", "psychotic", "hallucination",
                "delusion", "scz",
            ][..]),
            (Category::Mood, &[
                "depress", "mdd", "bipolar", "mania", "manic", "mood", "affective", "dysthymi",
            ][..]),
            (Category::Anxiety, &[
                "anxiety", "anxious", "gad", "panic", "phobi", "ptsd", "post-traumatic",
                "posttraumatic", "ocd", "obsessive-compulsive", "obsessive compulsive",
            ][..]),
            (Category::SleepWake, &[
                "insomnia", "hypersomnia", "sleep", "circadian", "narcolepsy", "melatonin",
            ][..]),
        ]
        .into_iter()
        .map(|(category, kws)| CategoryKeywords { category, keywords: strings(kws) })
        .collect();

        Self {
            acronym_map,
            protected_acronyms: strings(&["MDD", "GAD", "ADHD", "ASD", "SCZ", "PTSD", "OCD"]),
            canonical_acronyms: strings(&[
                "ADHD", "ASD", "PTSD", "MDD", "TF-CBT", "CBT", "SSRI", "SNRI", "OCD", "BD",
            ]),
            bipolar_terms: strings(&[
                "bipolar", "bipolar disorder", "bipolar depression", "bipolar i", "bipolar ii",
                "manic-depressive",
            ]),
            population_qualifiers: strings(&[
                r"adults?\s+with", r"patients?\s+with", r"individuals?\s+with", r"people\s+with",
            ]),
            study_type_rules,
            study_type_fallback: StudyType::ClinicalTrial,
            category_keywords,
            untitled: "Untitled Study".to_string(),
            arms_fallback: "Not specified in abstract.".to_string(),
            safety_fallback: "Not reported in abstract.".to_string(),
            takeaway_fallback:
                "Consider clinical relevance and generalizability before applying these findings."
                    .to_string(),
        }
    }
}

// ── Compiled rules ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid pattern for {table} entry {entry:?}: {source}")]
    Pattern {
        table: &'static str,
        entry: String,
        #[source]
        source: regex::Error,
    },

    #[error("{table} contains an empty entry")]
    EmptyEntry { table: &'static str },
}

/// [`RuleTables`] validated and compiled. Read-only; share it behind `Arc`.
#[derive(Debug)]
pub struct NormalisationRules {
    tables: RuleTables,
    pub(crate) acronym_subs: Vec<(Regex, String)>,
    pub(crate) protected: Vec<(Regex, String)>,
    pub(crate) canonical: Vec<(Regex, String)>,
    pub(crate) bipolar_terms: Vec<String>,
    pub(crate) qualifiers: Vec<Regex>,
    pub(crate) study_type_rules: Vec<(StudyType, Vec<Vec<String>>)>,
    pub(crate) category_rules: Vec<(Category, Regex)>,
}

/// Case-insensitive whole-word matcher for a literal.
fn word_regex(table: &'static str, literal: &str) -> Result<Regex, RuleError> {
    let pattern = format!(r"(?i)\b{}\b", regex::escape(literal));
    compile(table, literal, &pattern)
}

fn compile(table: &'static str, entry: &str, pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|source| RuleError::Pattern {
        table,
        entry: entry.to_string(),
        source,
    })
}

fn non_empty<'a>(table: &'static str, items: impl IntoIterator<Item = &'a String>) -> Result<(), RuleError> {
    if items.into_iter().any(|s| s.trim().is_empty()) {
        return Err(RuleError::EmptyEntry { table });
    }
    Ok(())
}

impl NormalisationRules {
    pub fn compile(tables: RuleTables) -> Result<Self, RuleError> {
        non_empty("acronym_map", tables.acronym_map.iter().flat_map(|r| [&r.phrase, &r.acronym]))?;
        non_empty("protected_acronyms", &tables.protected_acronyms)?;
        non_empty("canonical_acronyms", &tables.canonical_acronyms)?;
        non_empty("bipolar_terms", &tables.bipolar_terms)?;
        non_empty("population_qualifiers", &tables.population_qualifiers)?;
        non_empty(
            "study_type_rules",
            tables.study_type_rules.iter().flat_map(|r| r.any_of.iter().flatten()),
        )?;
        non_empty(
            "category_keywords",
            tables.category_keywords.iter().flat_map(|c| c.keywords.iter()),
        )?;

        let acronym_subs = tables
            .acronym_map
            .iter()
            .map(|r| Ok((word_regex("acronym_map", &r.phrase)?, r.acronym.clone())))
            .collect::<Result<_, RuleError>>()?;

        let protected = tables
            .protected_acronyms
            .iter()
            .map(|a| Ok((word_regex("protected_acronyms", a)?, a.clone())))
            .collect::<Result<_, RuleError>>()?;

        let canonical = tables
            .canonical_acronyms
            .iter()
            .map(|a| Ok((acronyms::tolerant_matcher(a)?, a.clone())))
            .collect::<Result<_, RuleError>>()?;

        let qualifiers = tables
            .population_qualifiers
            .iter()
            .map(|q| compile("population_qualifiers", q, &format!(r"(?i)^(?:{q})\s+")))
            .collect::<Result<_, RuleError>>()?;

        let study_type_rules = tables
            .study_type_rules
            .iter()
            .map(|r| {
                let groups = r
                    .any_of
                    .iter()
                    .map(|g| g.iter().map(|k| k.to_lowercase()).collect())
                    .collect();
                (r.study_type, groups)
            })
            .collect();

        let category_rules = tables
            .category_keywords
            .iter()
            .filter(|c| !c.keywords.is_empty())
            .map(|c| {
                let alternation = c
                    .keywords
                    .iter()
                    .map(|k| regex::escape(k))
                    .collect::<Vec<_>>()
                    .join("|");
                // Keywords are stems: anchored at the start of a word only.
                let re = compile("category_keywords", c.category.as_str(), &format!(r"(?i)\b(?:{alternation})"))?;
                Ok((c.category, re))
            })
            .collect::<Result<_, RuleError>>()?;

        Ok(Self {
            bipolar_terms: tables.bipolar_terms.iter().map(|t| t.to_lowercase()).collect(),
            acronym_subs,
            protected,
            canonical,
            qualifiers,
            study_type_rules,
            category_rules,
            tables,
        })
    }

    /// The built-in tables, compiled once per process.
    pub fn builtin() -> Arc<Self> {
        static BUILTIN: OnceLock<Arc<NormalisationRules>> = OnceLock::new();
        BUILTIN
            .get_or_init(|| {
                Arc::new(
                    NormalisationRules::compile(RuleTables::default())
                        .expect("built-in normalisation tables compile"),
                )
            })
            .clone()
    }

    pub fn tables(&self) -> &RuleTables {
        &self.tables
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Normalise one extraction. `ingested_on` is used when the source carries
/// no publication date.
pub fn normalise(
    extracted: &ExtractionResult,
    meta: &TrustedMetadata,
    rules: &NormalisationRules,
    ingested_on: NaiveDate,
) -> NormalisedExtraction {
    let population = extracted
        .population
        .as_deref()
        .map(findings::strip_bullet_prefixes)
        .map(|p| findings::sentence_case(&p))
        .filter(|p| !p.is_empty());
    let intervention = extracted
        .intervention
        .as_deref()
        .map(findings::strip_bullet_prefixes)
        .filter(|i| !i.is_empty());
    let arms = extracted
        .arms
        .as_deref()
        .map(findings::strip_bullet_prefixes)
        .filter(|a| !a.is_empty());

    let title = canonical_title(
        extracted.title.as_deref(),
        meta.title.as_deref(),
        extracted.intervention.as_deref(),
        extracted.population.as_deref(),
        rules,
    );

    let key_findings = build_key_findings(
        &extracted.key_findings,
        arms.as_deref(),
        extracted.safety_notes.as_deref(),
        extracted.takeaway.as_deref(),
        rules,
    );

    NormalisedExtraction {
        title,
        journal: extracted.journal.clone(),
        doi: meta.doi.clone(),
        external_id: meta.external_id.clone(),
        authors: extracted.authors.clone(),
        publication_date: meta.pub_date.unwrap_or(ingested_on),
        sample_size: extracted.sample_size,
        population,
        intervention,
        arms,
        key_findings,
        takeaway: extracted.takeaway.clone(),
        study_type: normalise_study_type(extracted.study_type.as_deref().unwrap_or(""), rules),
        safety_notes: extracted.safety_notes.clone(),
        category: normalise_category(
            extracted.category.as_deref(),
            extracted.population.as_deref(),
            rules,
        ),
    }
}

//! Data models for the ingestion pipeline.

use chrono::NaiveDate;
use psybrief_common::{Category, StudyType};
use psybrief_db::{NewInsight, NewStudy};
use serde::{Deserialize, Serialize};

/// One article as read from the source feed. Transient.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawArticle {
    /// PMID. Dedup key.
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub journal_title: Option<String>,
    pub journal_abbrev: Option<String>,
    pub doi: Option<String>,
    /// "Last Initials", in source order.
    pub authors: Vec<String>,
    /// Never empty for articles the parser emits.
    pub abstract_text: String,
    pub pub_date: Option<NaiveDate>,
}

impl RawArticle {
    /// Display journal: ISO abbreviation, else full title.
    pub fn journal(&self) -> Option<&str> {
        self.journal_abbrev
            .as_deref()
            .or(self.journal_title.as_deref())
    }

    pub fn metadata(&self) -> TrustedMetadata {
        TrustedMetadata {
            external_id: self.external_id.clone(),
            title: self.title.clone(),
            journal: self.journal().map(String::from),
            doi: self.doi.clone(),
            authors: self.authors.clone(),
            pub_date: self.pub_date,
        }
    }
}

/// Source-provided fields. Wins over anything the extractor returns for the same field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrustedMetadata {
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub pub_date: Option<NaiveDate>,
}

/// Validated extractor output. Study type and category are still free text here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub title: Option<String>,
    pub journal: Option<String>,
    pub authors: Vec<String>,
    pub sample_size: Option<i64>,
    pub population: Option<String>,
    pub intervention: Option<String>,
    pub arms: Option<String>,
    /// At most 6 raw entries.
    pub key_findings: Vec<String>,
    pub takeaway: Option<String>,
    pub study_type: Option<String>,
    pub safety_notes: Option<String>,
    pub category: Option<String>,
}

/// Canonical record produced by the normalisation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalisedExtraction {
    pub title: String,
    pub journal: Option<String>,
    pub doi: Option<String>,
    #[serde(rename = "pmid")]
    pub external_id: Option<String>,
    pub authors: Vec<String>,
    pub publication_date: NaiveDate,
    pub sample_size: Option<i64>,
    pub population: Option<String>,
    pub intervention: Option<String>,
    pub arms: Option<String>,
    /// Final bullets: Arms first, Safety second to last, Takeaway last.
    pub key_findings: Vec<String>,
    pub takeaway: Option<String>,
    pub study_type: StudyType,
    pub safety_notes: Option<String>,
    pub category: Category,
}

impl NormalisedExtraction {
    pub fn new_study(&self) -> NewStudy {
        NewStudy {
            title: self.title.clone(),
            journal: self.journal.clone(),
            doi: self.doi.clone(),
            external_id: self.external_id.clone(),
            publication_date: self.publication_date,
            study_type: self.study_type,
            category: self.category,
            authors: self.authors.clone(),
        }
    }

    pub fn new_insight(&self) -> NewInsight {
        NewInsight {
            sample_size: self.sample_size,
            population: self.population.clone(),
            intervention: self.intervention.clone(),
            key_findings: self.key_findings.clone(),
            safety_notes: self.safety_notes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_prefers_iso_abbreviation() {
        let mut a = RawArticle {
            journal_title: Some("JAMA Psychiatry".to_string()),
            journal_abbrev: Some("JAMA Psychiatry".to_string()),
            abstract_text: "x".to_string(),
            ..Default::default()
        };
        a.journal_title = Some("The American Journal of Psychiatry".to_string());
        a.journal_abbrev = Some("Am J Psychiatry".to_string());
        assert_eq!(a.journal(), Some("Am J Psychiatry"));

        a.journal_abbrev = None;
        assert_eq!(a.journal(), Some("The American Journal of Psychiatry"));
        assert_eq!(a.metadata().journal.as_deref(), Some("The American Journal of Psychiatry"));
    }
}

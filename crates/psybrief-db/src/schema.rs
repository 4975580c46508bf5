//! Persisted records.
//!
//! `Study` holds bibliographic and classification metadata; `Insight` holds
//! the extracted clinical content. They are 1:1, linked by `Insight::study_id`.

use chrono::{DateTime, NaiveDate, Utc};
use psybrief_common::{Category, StudyType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TABLE_STUDIES: &str = "studies";
pub const TABLE_INSIGHTS: &str = "ai_insights";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub id: Uuid,
    pub title: String,
    pub journal: Option<String>,
    pub doi: Option<String>,
    /// Upstream article id (PMID). Unique across all studies when present.
    pub external_id: Option<String>,
    pub publication_date: NaiveDate,
    pub study_type: StudyType,
    pub category: Category,
    /// Only changed by curation, never by ingestion.
    pub archived: bool,
    pub authors: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Study fields supplied by the pipeline; id, archive flag and timestamp are the store's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStudy {
    pub title: String,
    pub journal: Option<String>,
    pub doi: Option<String>,
    pub external_id: Option<String>,
    pub publication_date: NaiveDate,
    pub study_type: StudyType,
    pub category: Category,
    pub authors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: Uuid,
    pub study_id: Uuid,
    pub sample_size: Option<i64>,
    pub population: Option<String>,
    pub intervention: Option<String>,
    pub key_findings: Vec<String>,
    pub safety_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insight fields supplied by the pipeline; the store links it to the new Study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInsight {
    pub sample_size: Option<i64>,
    pub population: Option<String>,
    pub intervention: Option<String>,
    pub key_findings: Vec<String>,
    pub safety_notes: Option<String>,
}

impl NewStudy {
    pub fn into_study(self, id: Uuid) -> Study {
        Study {
            id,
            title: self.title,
            journal: self.journal,
            doi: self.doi,
            external_id: self.external_id,
            publication_date: self.publication_date,
            study_type: self.study_type,
            category: self.category,
            archived: false,
            authors: self.authors,
            created_at: Utc::now(),
        }
    }
}

impl NewInsight {
    pub fn into_insight(self, id: Uuid, study_id: Uuid) -> Insight {
        Insight {
            id,
            study_id,
            sample_size: self.sample_size,
            population: self.population,
            intervention: self.intervention,
            key_findings: self.key_findings,
            safety_notes: self.safety_notes,
            created_at: Utc::now(),
        }
    }
}

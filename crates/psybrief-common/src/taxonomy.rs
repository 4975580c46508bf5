//! Study-type and category vocabularies.
//!
//! Both enums are closed: nothing outside these variants is ever persisted.
//! Free text is collapsed into them by the normalisation engine in
//! `psybrief-ingestion`; this module only knows the canonical labels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown label: {0}")]
pub struct UnknownLabel(pub String);

/// Study design label shown on every card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudyType {
    #[serde(rename = "RCT")]
    Rct,
    #[serde(rename = "DB RCT")]
    DbRct,
    #[serde(rename = "SB RCT")]
    SbRct,
    #[serde(rename = "Triple-blind RCT")]
    TripleBlindRct,
    #[serde(rename = "Clinical Trial")]
    ClinicalTrial,
    #[serde(rename = "Observational")]
    Observational,
    #[serde(rename = "Cohort")]
    Cohort,
    #[serde(rename = "Case-Control")]
    CaseControl,
    #[serde(rename = "Systematic Review")]
    SystematicReview,
    #[serde(rename = "Meta-analysis")]
    MetaAnalysis,
    #[serde(rename = "Post hoc")]
    PostHoc,
    #[serde(rename = "Secondary analysis")]
    SecondaryAnalysis,
    #[serde(rename = "Protocol")]
    Protocol,
    #[serde(rename = "Other")]
    Other,
}

impl StudyType {
    pub const ALL: [StudyType; 14] = [
        StudyType::Rct,
        StudyType::DbRct,
        StudyType::SbRct,
        StudyType::TripleBlindRct,
        StudyType::ClinicalTrial,
        StudyType::Observational,
        StudyType::Cohort,
        StudyType::CaseControl,
        StudyType::SystematicReview,
        StudyType::MetaAnalysis,
        StudyType::PostHoc,
        StudyType::SecondaryAnalysis,
        StudyType::Protocol,
        StudyType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StudyType::Rct               => "RCT",
            StudyType::DbRct             => "DB RCT",
            StudyType::SbRct             => "SB RCT",
            StudyType::TripleBlindRct    => "Triple-blind RCT",
            StudyType::ClinicalTrial     => "Clinical Trial",
            StudyType::Observational     => "Observational",
            StudyType::Cohort            => "Cohort",
            StudyType::CaseControl       => "Case-Control",
            StudyType::SystematicReview  => "Systematic Review",
            StudyType::MetaAnalysis      => "Meta-analysis",
            StudyType::PostHoc           => "Post hoc",
            StudyType::SecondaryAnalysis => "Secondary analysis",
            StudyType::Protocol          => "Protocol",
            StudyType::Other             => "Other",
        }
    }

    /// Exact (case-insensitive) match against the canonical labels.
    pub fn from_label(label: &str) -> Option<Self> {
        let l = label.trim();
        Self::ALL.into_iter().find(|t| t.as_str().eq_ignore_ascii_case(l))
    }
}

impl fmt::Display for StudyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudyType {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

/// Clinical area a study is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Mood,
    Anxiety,
    Psychosis,
    Neurodevelopmental,
    #[serde(rename = "Sleep-Wake")]
    SleepWake,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Mood,
        Category::Anxiety,
        Category::Psychosis,
        Category::Neurodevelopmental,
        Category::SleepWake,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Mood               => "Mood",
            Category::Anxiety            => "Anxiety",
            Category::Psychosis          => "Psychosis",
            Category::Neurodevelopmental => "Neurodevelopmental",
            Category::SleepWake          => "Sleep-Wake",
            Category::Other              => "Other",
        }
    }

    /// Exact label match; tolerates "Sleep Wake", "sleep/wake" and "sleep_wake".
    pub fn from_label(label: &str) -> Option<Self> {
        let l = label.trim().to_lowercase().replace([' ', '/', '_'], "-");
        Self::ALL.into_iter().find(|c| c.as_str().to_lowercase() == l)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

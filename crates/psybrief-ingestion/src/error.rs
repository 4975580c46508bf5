//! Per-article error taxonomy.
//!
//! Every variant is caught at the article boundary and reported in the batch
//! result; none of them cancels sibling articles.

use std::fmt;

use psybrief_db::{DbError, PersistError};
use psybrief_llm::LlmError;
use thiserror::Error;
use uuid::Uuid;

/// Malformed article block. The parser logs it and excludes the article, so
/// it never reaches the per-article pipeline.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("malformed article markup (pmid {pmid:?}) at byte {position}: {message}")]
    Xml {
        pmid: Option<String>,
        position: u64,
        message: String,
    },
}

/// Extractor output that does not match the minimal extraction shape.
#[derive(Debug, Clone, Error)]
pub enum ExtractionSchemaError {
    #[error("extractor output is not JSON: {0}")]
    NotJson(String),

    #[error("extractor output is not a JSON object")]
    NotAnObject,

    #[error("field `{field}` has the wrong type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Which write of the Study + Insight pair failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStep {
    Lookup,
    Study,
    Insight,
}

impl PersistStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistStep::Lookup  => "lookup",
            PersistStep::Study   => "study",
            PersistStep::Insight => "insight",
        }
    }
}

impl fmt::Display for PersistStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Gate response that is not the expected JSON shape.
    #[error("{gate} classifier returned malformed output: {message}")]
    Classifier { gate: &'static str, message: String },

    /// The capability call itself could not complete.
    #[error("{purpose} call failed: {source}")]
    Capability {
        purpose: &'static str,
        #[source]
        source: LlmError,
    },

    #[error("extraction failed schema validation: {0}")]
    ExtractionSchema(#[from] ExtractionSchemaError),

    #[error("{step} write failed: {source}")]
    Persistence {
        step: PersistStep,
        study_id: Option<Uuid>,
        #[source]
        source: DbError,
    },

    /// Insight write failed and the compensating delete failed as well.
    #[error("study {study_id} is orphaned: insight write failed ({source}) and cleanup failed ({cleanup})")]
    OrphanedStudy {
        study_id: Uuid,
        source: DbError,
        cleanup: DbError,
    },

    /// The article task panicked or was cancelled.
    #[error("article task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    /// Short machine-readable tag used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Classifier { .. }   => "classifier_error",
            PipelineError::Capability { .. }   => "capability_error",
            PipelineError::ExtractionSchema(_) => "extraction_schema_error",
            PipelineError::Persistence { .. }  => "persistence_error",
            PipelineError::OrphanedStudy { .. } => "orphaned_study",
            PipelineError::Aborted(_)          => "aborted",
        }
    }
}

impl From<PersistError> for PipelineError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::Study(source) => PipelineError::Persistence {
                step: PersistStep::Study,
                study_id: None,
                source,
            },
            PersistError::Insight { study_id, source } => PipelineError::Persistence {
                step: PersistStep::Insight,
                study_id: Some(study_id),
                source,
            },
            PersistError::OrphanedStudy { study_id, source, cleanup } => {
                PipelineError::OrphanedStudy { study_id, source, cleanup }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orphan_is_distinct_from_clean_insight_failure() {
        let id = Uuid::new_v4();
        let clean: PipelineError = PersistError::Insight {
            study_id: id,
            source: DbError::Unavailable("down".into()),
        }
        .into();
        let orphan: PipelineError = PersistError::OrphanedStudy {
            study_id: id,
            source: DbError::Unavailable("down".into()),
            cleanup: DbError::Unavailable("still down".into()),
        }
        .into();

        assert_eq!(clean.kind(), "persistence_error");
        assert_eq!(orphan.kind(), "orphaned_study");
        assert!(orphan.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_persistence_message_names_the_failed_write() {
        let err: PipelineError = PersistError::Study(DbError::Unavailable("down".into())).into();
        assert_eq!(err.to_string(), "study write failed: Store unavailable: down");

        let lookup = PipelineError::Persistence {
            step: PersistStep::Lookup,
            study_id: None,
            source: DbError::Unavailable("down".into()),
        };
        assert_eq!(lookup.kind(), "persistence_error");
    }

    #[test]
    fn test_capability_message_is_human_readable() {
        let err = PipelineError::Capability {
            purpose: "actionability",
            source: LlmError::RateLimitExceeded,
        };
        assert_eq!(err.to_string(), "actionability call failed: Rate limit exceeded");
    }
}

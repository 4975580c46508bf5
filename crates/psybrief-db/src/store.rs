//! Keyed record store contract.
//!
//! The store enforces external-id uniqueness itself: `insert_study` must fail
//! with `DbError::Duplicate` when the id is taken, whatever pre-check the
//! caller did.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{DbError, PersistError, Result};
use crate::schema::{Insight, NewInsight, NewStudy, Study};

#[async_trait]
pub trait StudyStore: Send + Sync {
    /// Id of the Study carrying this external id, if any.
    async fn find_study_id_by_external_id(&self, external_id: &str) -> Result<Option<Uuid>>;

    async fn insert_study(&self, study: &NewStudy) -> Result<Study>;

    /// Fails with `NotFound` if the Study does not exist and `Duplicate` if it
    /// already has an Insight.
    async fn insert_insight(&self, study_id: Uuid, insight: &NewInsight) -> Result<Insight>;

    /// Removes a Study and its Insight, if any.
    async fn delete_study(&self, study_id: Uuid) -> Result<()>;

    async fn get_study(&self, study_id: Uuid) -> Result<Option<Study>>;

    async fn get_insight(&self, study_id: Uuid) -> Result<Option<Insight>>;

    async fn count_studies(&self) -> Result<u64>;

    /// Curation hook; the ingestion pipeline never calls it.
    async fn set_archived(&self, study_id: Uuid, archived: bool) -> Result<()>;

    /// Write a Study and its Insight.
    ///
    /// The default runs the two inserts in order and deletes the Study again
    /// if the Insight insert fails. Between the two writes the Study is
    /// visible, so a concurrent duplicate insert can report the id of a Study
    /// that is then removed. Stores that can make the pair atomic override
    /// this (`PgStore` with a transaction, `MemoryStore` under one lock).
    async fn create_study_with_insight(
        &self,
        study: &NewStudy,
        insight: &NewInsight,
    ) -> std::result::Result<(Study, Insight), PersistError> {
        let created = self.insert_study(study).await.map_err(PersistError::Study)?;

        match self.insert_insight(created.id, insight).await {
            Ok(ins) => Ok((created, ins)),
            Err(source) => {
                tracing::warn!(study_id = %created.id, error = %source, "Insight insert failed, removing study");
                match self.delete_study(created.id).await {
                    Ok(()) => Err(PersistError::Insight { study_id: created.id, source }),
                    Err(cleanup) => Err(PersistError::OrphanedStudy {
                        study_id: created.id,
                        source,
                        cleanup,
                    }),
                }
            }
        }
    }
}

/// Convenience for stores whose row lookups return `None` for missing rows.
pub(crate) fn not_found(what: &str, id: Uuid) -> DbError {
    DbError::NotFound(format!("{what} {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::NaiveDate;
    use psybrief_common::{Category, StudyType};

    /// Delegates every call but keeps the default two-step write.
    struct TwoStep(MemoryStore);

    #[async_trait]
    impl StudyStore for TwoStep {
        async fn find_study_id_by_external_id(&self, external_id: &str) -> Result<Option<Uuid>> {
            self.0.find_study_id_by_external_id(external_id).await
        }
        async fn insert_study(&self, study: &NewStudy) -> Result<Study> {
            self.0.insert_study(study).await
        }
        async fn insert_insight(&self, study_id: Uuid, insight: &NewInsight) -> Result<Insight> {
            self.0.insert_insight(study_id, insight).await
        }
        async fn delete_study(&self, study_id: Uuid) -> Result<()> {
            self.0.delete_study(study_id).await
        }
        async fn get_study(&self, study_id: Uuid) -> Result<Option<Study>> {
            self.0.get_study(study_id).await
        }
        async fn get_insight(&self, study_id: Uuid) -> Result<Option<Insight>> {
            self.0.get_insight(study_id).await
        }
        async fn count_studies(&self) -> Result<u64> {
            self.0.count_studies().await
        }
        async fn set_archived(&self, study_id: Uuid, archived: bool) -> Result<()> {
            self.0.set_archived(study_id, archived).await
        }
    }

    fn study(ext: &str) -> NewStudy {
        NewStudy {
            title: "Lithium for Bipolar Depression".to_string(),
            journal: None,
            doi: None,
            external_id: Some(ext.to_string()),
            publication_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            study_type: StudyType::Rct,
            category: Category::Mood,
            authors: vec![],
        }
    }

    fn insight() -> NewInsight {
        NewInsight {
            sample_size: None,
            population: None,
            intervention: Some("Lithium".to_string()),
            key_findings: vec!["Arms: Not specified in abstract.".to_string()],
            safety_notes: None,
        }
    }

    #[tokio::test]
    async fn test_default_write_succeeds_and_links_insight() {
        let store = TwoStep(MemoryStore::new());
        let (s, i) = store.create_study_with_insight(&study("1"), &insight()).await.unwrap();
        assert_eq!(i.study_id, s.id);
    }

    #[tokio::test]
    async fn test_default_write_cleans_up_then_reports_orphan() {
        let store = TwoStep(MemoryStore::new());
        store.0.fail_insight_writes(true);
        let err = store.create_study_with_insight(&study("2"), &insight()).await.unwrap_err();
        assert!(matches!(err, PersistError::Insight { .. }));
        assert_eq!(store.count_studies().await.unwrap(), 0);

        store.0.fail_deletes(true);
        let err = store.create_study_with_insight(&study("3"), &insight()).await.unwrap_err();
        assert!(matches!(err, PersistError::OrphanedStudy { .. }));
        assert_eq!(store.count_studies().await.unwrap(), 1);
    }
}

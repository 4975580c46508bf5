//! Dedup & persistence gate.
//!
//! Handles:
//! - Study lookup by external id (PMID) before any write
//! - Study + Insight INSERT as one unit (see `StudyStore::create_study_with_insight`)
//! - Unique-key races: a `Duplicate` from the store is the same as a pre-check hit

use std::sync::Arc;

use psybrief_db::{PersistError, StudyStore};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PersistStep, PipelineError};
use crate::models::NormalisedExtraction;

/// Result of a study upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created { study_id: Uuid, insight_id: Uuid },
    /// Nothing written; a Study with this external id already exists.
    Existing { study_id: Uuid },
}

impl UpsertOutcome {
    pub fn study_id(&self) -> Uuid {
        match self {
            UpsertOutcome::Created { study_id, .. } | UpsertOutcome::Existing { study_id } => *study_id,
        }
    }
}

#[derive(Clone)]
pub struct IngestionRepository {
    store: Arc<dyn StudyStore>,
}

impl IngestionRepository {
    pub fn new(store: Arc<dyn StudyStore>) -> Self {
        Self { store }
    }

    /// Id of the Study already holding this external id.
    ///
    /// A failed lookup is logged and treated as "not found": the store's
    /// uniqueness constraint still stops a second insert.
    pub async fn find_existing(&self, external_id: Option<&str>) -> Option<Uuid> {
        let ext = external_id?;
        match self.store.find_study_id_by_external_id(ext).await {
            Ok(found) => found,
            Err(e) => {
                warn!(pmid = ext, error = %e, "External id lookup failed; relying on insert-time uniqueness");
                None
            }
        }
    }

    /// Insert Study + Insight unless the external id is already taken.
    pub async fn upsert_study(&self, record: &NormalisedExtraction) -> Result<UpsertOutcome, PipelineError> {
        let ext = record.external_id.as_deref();

        if let Some(study_id) = self.find_existing(ext).await {
            debug!(pmid = ext.unwrap_or("-"), %study_id, "Study already exists, skipping insert");
            return Ok(UpsertOutcome::Existing { study_id });
        }

        match self
            .store
            .create_study_with_insight(&record.new_study(), &record.new_insight())
            .await
        {
            Ok((study, insight)) => {
                info!(pmid = ext.unwrap_or("-"), study_id = %study.id, "Study created");
                Ok(UpsertOutcome::Created { study_id: study.id, insight_id: insight.id })
            }
            Err(e) if e.is_duplicate() => self.resolve_race(ext, e).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Another run inserted the same external id between our lookup and insert.
    async fn resolve_race(&self, ext: Option<&str>, err: PersistError) -> Result<UpsertOutcome, PipelineError> {
        let lookup = match ext {
            Some(ext) => self.store.find_study_id_by_external_id(ext).await,
            None => Ok(None),
        };
        match lookup {
            Ok(Some(study_id)) => {
                debug!(pmid = ext.unwrap_or("-"), %study_id, "Lost insert race; reporting existing study");
                Ok(UpsertOutcome::Existing { study_id })
            }
            Ok(None) => Err(err.into()),
            Err(source) => Err(PipelineError::Persistence {
                step: PersistStep::Lookup,
                study_id: None,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use psybrief_common::{Category, StudyType};
    use psybrief_db::{Insight, MemoryStore, NewInsight, NewStudy, Study};

    fn record(pmid: Option<&str>) -> NormalisedExtraction {
        NormalisedExtraction {
            title: "Sertraline vs Placebo in MDD".to_string(),
            journal: Some("JAMA Psychiatry".to_string()),
            doi: None,
            external_id: pmid.map(String::from),
            authors: vec![],
            publication_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            sample_size: Some(240),
            population: Some("MDD".to_string()),
            intervention: Some("Sertraline vs placebo".to_string()),
            arms: Some("Sertraline vs placebo".to_string()),
            key_findings: vec![
                "Arms: Sertraline vs placebo".to_string(),
                "Safety: Not reported in abstract.".to_string(),
                "Takeaway: Works.".to_string(),
            ],
            takeaway: None,
            study_type: StudyType::DbRct,
            safety_notes: None,
            category: Category::Mood,
        }
    }

    #[tokio::test]
    async fn test_second_upsert_reports_existing() {
        let store = Arc::new(MemoryStore::new());
        let repo = IngestionRepository::new(store.clone());

        let first = repo.upsert_study(&record(Some("4242"))).await.unwrap();
        let second = repo.upsert_study(&record(Some("4242"))).await.unwrap();

        assert!(matches!(first, UpsertOutcome::Created { .. }));
        assert_eq!(second, UpsertOutcome::Existing { study_id: first.study_id() });
        assert_eq!(store.count_by_external_id("4242").await, 1);
        assert_eq!(store.count_insights().await, 1);
    }

    #[tokio::test]
    async fn test_insight_failure_is_persistence_error() {
        let store = Arc::new(MemoryStore::new());
        store.fail_insight_writes(true);
        let repo = IngestionRepository::new(store.clone());

        let err = repo.upsert_study(&record(Some("1"))).await.unwrap_err();
        assert!(matches!(err, PipelineError::Persistence { step: PersistStep::Insight, .. }));
        assert_eq!(store.count_studies().await.unwrap(), 0);
    }

    /// First lookup misses, as if another run inserted concurrently.
    struct RacingStore {
        inner: MemoryStore,
        lookups: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl StudyStore for RacingStore {
        async fn find_study_id_by_external_id(&self, ext: &str) -> psybrief_db::Result<Option<Uuid>> {
            let n = self.lookups.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 { Ok(None) } else { self.inner.find_study_id_by_external_id(ext).await }
        }
        async fn insert_study(&self, s: &NewStudy) -> psybrief_db::Result<Study> { self.inner.insert_study(s).await }
        async fn insert_insight(&self, id: Uuid, i: &NewInsight) -> psybrief_db::Result<Insight> { self.inner.insert_insight(id, i).await }
        async fn delete_study(&self, id: Uuid) -> psybrief_db::Result<()> { self.inner.delete_study(id).await }
        async fn get_study(&self, id: Uuid) -> psybrief_db::Result<Option<Study>> { self.inner.get_study(id).await }
        async fn get_insight(&self, id: Uuid) -> psybrief_db::Result<Option<Insight>> { self.inner.get_insight(id).await }
        async fn count_studies(&self) -> psybrief_db::Result<u64> { self.inner.count_studies().await }
        async fn set_archived(&self, id: Uuid, a: bool) -> psybrief_db::Result<()> { self.inner.set_archived(id, a).await }
    }

    #[tokio::test]
    async fn test_unique_violation_after_precheck_is_existing() {
        let inner = MemoryStore::new();
        let (existing, _) = inner
            .create_study_with_insight(&record(Some("77")).new_study(), &record(Some("77")).new_insight())
            .await
            .unwrap();
        let store = Arc::new(RacingStore { inner, lookups: Default::default() });
        let repo = IngestionRepository::new(store);

        let out = repo.upsert_study(&record(Some("77"))).await.unwrap();
        assert_eq!(out, UpsertOutcome::Existing { study_id: existing.id });
    }
}

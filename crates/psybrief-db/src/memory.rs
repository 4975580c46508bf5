//! In-process store.
//!
//! Used when no database URL is configured and by the test suites. Writes can
//! be made to fail on demand to exercise the pipeline's failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{DbError, PersistError, Result};
use crate::schema::{Insight, NewInsight, NewStudy, Study};
use crate::store::{not_found, StudyStore};

#[derive(Default)]
struct Tables {
    studies: HashMap<Uuid, Study>,
    by_external_id: HashMap<String, Uuid>,
    /// Keyed by study id.
    insights: HashMap<Uuid, Insight>,
}

impl Tables {
    fn insert_study(&mut self, study: &NewStudy) -> Result<Study> {
        if let Some(ext) = &study.external_id {
            if self.by_external_id.contains_key(ext) {
                return Err(DbError::Duplicate(format!("external_id {ext}")));
            }
        }

        let row = study.clone().into_study(Uuid::new_v4());
        if let Some(ext) = &row.external_id {
            self.by_external_id.insert(ext.clone(), row.id);
        }
        self.studies.insert(row.id, row.clone());
        Ok(row)
    }

    fn insert_insight(&mut self, study_id: Uuid, insight: &NewInsight) -> Result<Insight> {
        if !self.studies.contains_key(&study_id) {
            return Err(not_found("study", study_id));
        }
        if self.insights.contains_key(&study_id) {
            return Err(DbError::Duplicate(format!("insight for study {study_id}")));
        }

        let row = insight.clone().into_insight(Uuid::new_v4(), study_id);
        self.insights.insert(study_id, row.clone());
        Ok(row)
    }

    fn remove_study(&mut self, study_id: Uuid) {
        if let Some(study) = self.studies.remove(&study_id) {
            if let Some(ext) = study.external_id {
                self.by_external_id.remove(&ext);
            }
        }
        self.insights.remove(&study_id);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_study_writes: AtomicBool,
    fail_insight_writes: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `insert_study` fail with `Unavailable`.
    pub fn fail_study_writes(&self, fail: bool) {
        self.fail_study_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `insert_insight` fail with `Unavailable`.
    pub fn fail_insight_writes(&self, fail: bool) {
        self.fail_insight_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `delete_study` fail with `Unavailable`.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of studies stored under this external id (0 or 1).
    pub async fn count_by_external_id(&self, external_id: &str) -> usize {
        let t = self.tables.read().await;
        t.studies
            .values()
            .filter(|s| s.external_id.as_deref() == Some(external_id))
            .count()
    }

    pub async fn count_insights(&self) -> usize {
        self.tables.read().await.insights.len()
    }

    fn check(&self, switch: &AtomicBool, what: &str) -> Result<()> {
        if switch.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable(what.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StudyStore for MemoryStore {
    async fn find_study_id_by_external_id(&self, external_id: &str) -> Result<Option<Uuid>> {
        Ok(self.tables.read().await.by_external_id.get(external_id).copied())
    }

    async fn insert_study(&self, study: &NewStudy) -> Result<Study> {
        self.check(&self.fail_study_writes, "study writes disabled")?;
        self.tables.write().await.insert_study(study)
    }

    async fn insert_insight(&self, study_id: Uuid, insight: &NewInsight) -> Result<Insight> {
        self.check(&self.fail_insight_writes, "insight writes disabled")?;
        self.tables.write().await.insert_insight(study_id, insight)
    }

    async fn delete_study(&self, study_id: Uuid) -> Result<()> {
        self.check(&self.fail_deletes, "deletes disabled")?;
        self.tables.write().await.remove_study(study_id);
        Ok(())
    }

    async fn get_study(&self, study_id: Uuid) -> Result<Option<Study>> {
        Ok(self.tables.read().await.studies.get(&study_id).cloned())
    }

    async fn get_insight(&self, study_id: Uuid) -> Result<Option<Insight>> {
        Ok(self.tables.read().await.insights.get(&study_id).cloned())
    }

    async fn count_studies(&self) -> Result<u64> {
        Ok(self.tables.read().await.studies.len() as u64)
    }

    async fn set_archived(&self, study_id: Uuid, archived: bool) -> Result<()> {
        let mut t = self.tables.write().await;
        let study = t.studies.get_mut(&study_id).ok_or_else(|| not_found("study", study_id))?;
        study.archived = archived;
        Ok(())
    }

    /// Both writes and any cleanup happen under one write lock, so a
    /// concurrent lookup never sees a Study that is about to be removed.
    async fn create_study_with_insight(
        &self,
        study: &NewStudy,
        insight: &NewInsight,
    ) -> std::result::Result<(Study, Insight), PersistError> {
        self.check(&self.fail_study_writes, "study writes disabled")
            .map_err(PersistError::Study)?;

        let mut t = self.tables.write().await;
        let created = t.insert_study(study).map_err(PersistError::Study)?;

        let inserted = self
            .check(&self.fail_insight_writes, "insight writes disabled")
            .and_then(|()| t.insert_insight(created.id, insight));
        match inserted {
            Ok(ins) => Ok((created, ins)),
            Err(source) => {
                tracing::warn!(study_id = %created.id, error = %source, "Insight insert failed, removing study");
                match self.check(&self.fail_deletes, "deletes disabled") {
                    Ok(()) => {
                        t.remove_study(created.id);
                        Err(PersistError::Insight { study_id: created.id, source })
                    }
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

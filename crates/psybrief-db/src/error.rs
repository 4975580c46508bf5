//! Database error types.

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Unique-key violation. For studies this means the external id is taken.
    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        DbError::Pool(err.to_string())
    }
}

impl From<deadpool_postgres::CreatePoolError> for DbError {
    fn from(err: deadpool_postgres::CreatePoolError) -> Self {
        DbError::Pool(err.to_string())
    }
}

/// Failure of the two-step Study + Insight write.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Nothing was written.
    #[error("study insert failed: {0}")]
    Study(#[source] DbError),

    /// The Study was written, the Insight was not, and the Study was removed again.
    #[error("insight insert failed for study {study_id} (study rolled back): {source}")]
    Insight { study_id: Uuid, source: DbError },

    /// The Study was written, the Insight was not, and removing the Study failed too.
    #[error("insight insert failed for study {study_id} and cleanup failed ({cleanup}); study is orphaned: {source}")]
    OrphanedStudy { study_id: Uuid, source: DbError, cleanup: DbError },
}

impl PersistError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, PersistError::Study(DbError::Duplicate(_)))
    }
}

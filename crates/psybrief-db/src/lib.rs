//! PsyBrief persistence layer.
//!
//! Studies and their Insights live behind the [`StudyStore`] trait. Two
//! stores ship with the crate:
//!
//! - [`PgStore`] — PostgreSQL via a deadpool connection pool; Study and
//!   Insight are written in one transaction.
//! - [`MemoryStore`] — in-process tables, used when no database URL is
//!   configured and throughout the tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use psybrief_db::{PgStore, StudyStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PgStore::connect("postgres://localhost/psybrief", 4).await?;
//!     println!("{} studies", store.count_studies().await?);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod store;

pub use error::{DbError, PersistError, Result};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use schema::{Insight, NewInsight, NewStudy, Study, TABLE_INSIGHTS, TABLE_STUDIES};
pub use store::StudyStore;

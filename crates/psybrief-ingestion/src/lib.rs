//! psybrief-ingestion — Abstract ingestion pipeline.
//!
//! - PubMed discovery and XML parsing
//! - Relevance and actionability gates
//! - Structured extraction and deterministic normalisation
//! - Dedup and persistence of Study + Insight pairs
//! - Batch orchestration with per-article isolation

pub mod capability;
pub mod error;
pub mod extraction;
pub mod gates;
pub mod models;
pub mod normalise;
pub mod pipeline;
pub mod repository;
pub mod sources;

pub use capability::{Capability, CapabilityError, JsonShapeError};
pub use error::{ExtractionSchemaError, ParseError, PersistStep, PipelineError};
pub use extraction::ExtractionEngine;
pub use gates::{ActionabilityGate, ActionabilityVerdict, RelevanceGate, RelevanceVerdict};
pub use models::{ExtractionResult, NormalisedExtraction, RawArticle, TrustedMetadata};
pub use normalise::{NormalisationRules, RuleTables};
pub use pipeline::{
    ArticleOutcome, ArticleState, BatchReport, IngestionPipeline, PipelineComponents, SkipReason,
};
pub use repository::{IngestionRepository, UpsertOutcome};
pub use sources::pubmed::{parse_articles, PubMedClient, SearchParams};
pub use sources::{ArticleFeed, FeedBatch};

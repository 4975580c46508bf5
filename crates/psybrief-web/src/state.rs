//! Shared application state for the web server.

use std::sync::Arc;

use psybrief_db::StudyStore;
use psybrief_ingestion::{
    ActionabilityGate, ArticleFeed, Capability, IngestionPipeline, NormalisationRules,
    PipelineComponents, RelevanceGate,
};

/// Shared state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub relevance: RelevanceGate,
    pub actionability: ActionabilityGate,
    /// Full staged pipeline, used for XML and PubMed batches.
    pub pipeline: IngestionPipeline,
    /// Dedup, extraction, normalisation and persistence only.
    pub extraction: IngestionPipeline,
    pub feed: Arc<dyn ArticleFeed>,
}

impl AppState {
    pub fn new(
        capability: Capability,
        store: Arc<dyn StudyStore>,
        rules: Arc<NormalisationRules>,
        feed: Arc<dyn ArticleFeed>,
        max_concurrency: usize,
    ) -> Self {
        let components = PipelineComponents::new(capability, store, rules);
        Self {
            relevance: components.relevance.clone(),
            actionability: components.actionability.clone(),
            pipeline: IngestionPipeline::standard(&components).with_max_concurrency(max_concurrency),
            extraction: IngestionPipeline::extraction_only(&components),
            feed,
        }
    }
}

pub type SharedState = Arc<AppState>;

//! Axum router — maps all URL paths to handlers.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{
    classify::{actionability, relevance},
    ingestion::{extract, ingest, ingest_pubmed},
    system::health,
};
use crate::state::{AppState, SharedState};

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);

    Router::new()
        .route("/health",             get(health))
        .route("/api/relevance",      post(relevance))
        .route("/api/actionability",  post(actionability))
        .route("/api/extract",        post(extract))
        .route("/api/ingest",         post(ingest))
        .route("/api/ingest-pubmed",  post(ingest_pubmed))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

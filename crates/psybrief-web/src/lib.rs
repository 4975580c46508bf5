//! psybrief-web — HTTP surface for the psybrief ingestion pipeline.
//!   - Relevance / actionability checks for a single abstract
//!   - Single-abstract extraction
//!   - PubMed XML and live PubMed batch ingestion

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

//! Extraction and batch ingestion endpoints.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use psybrief_ingestion::{ArticleOutcome, ArticleState, BatchReport, TrustedMetadata};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::require_abstract;
use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

// ── Request bodies ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ExtractBody {
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// String or number.
    pub pmid: Option<Value>,
    pub title: Option<String>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
}

fn pmid_text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl ExtractBody {
    fn metadata(&self) -> TrustedMetadata {
        TrustedMetadata {
            external_id: pmid_text(self.pmid.as_ref()),
            title: non_blank(self.title.clone()),
            journal: non_blank(self.journal.clone()),
            doi: non_blank(self.doi.clone()),
            authors: self.authors.clone(),
            pub_date: None,
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `POST /api/extract`: dedup, extract, normalise and persist one abstract.
pub async fn extract(
    State(state): State<SharedState>,
    Json(body): Json<ExtractBody>,
) -> ApiResult<Json<ArticleOutcome>> {
    let meta = body.metadata();
    let abstract_text = require_abstract(body.abstract_text)?;

    match state.extraction.process(ArticleState::new(abstract_text, meta)).await {
        ArticleOutcome::Failed { error, .. } => Err(ApiError::Internal(error)),
        outcome => Ok(Json(outcome)),
    }
}

/// `POST /api/ingest`: body is a PubMed efetch XML document.
pub async fn ingest(State(state): State<SharedState>, body: String) -> ApiResult<Json<BatchReport>> {
    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing PubMed XML".to_string()));
    }
    Ok(Json(state.pipeline.ingest_xml(&body).await))
}

/// `POST /api/ingest-pubmed`: search PubMed with the configured term and
/// ingest whatever comes back.
pub async fn ingest_pubmed(State(state): State<SharedState>) -> ApiResult<Response> {
    let batch = state.feed.fetch_recent().await?;

    if batch.ids.is_empty() {
        info!("PubMed search returned no ids");
        return Ok(Json(json!({ "message": "No PubMed IDs found" })).into_response());
    }

    info!(ids = batch.ids.len(), "Fetched PubMed batch");
    let report = state.pipeline.ingest_xml(&batch.xml).await;
    Ok(Json(report).into_response())
}

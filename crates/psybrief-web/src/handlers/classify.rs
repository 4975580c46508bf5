//! Standalone relevance and actionability endpoints.

use axum::{extract::State, Json};
use psybrief_ingestion::{ActionabilityVerdict, RelevanceVerdict};

use super::{require_abstract, AbstractBody};
use crate::error::ApiResult;
use crate::state::SharedState;

/// `POST /api/relevance`. Never fails once the abstract is present: a
/// broken model call answers `{"relevant": false}`.
pub async fn relevance(
    State(state): State<SharedState>,
    Json(body): Json<AbstractBody>,
) -> ApiResult<Json<RelevanceVerdict>> {
    let abstract_text = require_abstract(body.abstract_text)?;
    Ok(Json(state.relevance.judge(None, &abstract_text).await))
}

/// `POST /api/actionability`.
pub async fn actionability(
    State(state): State<SharedState>,
    Json(body): Json<AbstractBody>,
) -> ApiResult<Json<ActionabilityVerdict>> {
    let abstract_text = require_abstract(body.abstract_text)?;
    let verdict = state.actionability.judge(None, &abstract_text).await?;
    Ok(Json(verdict))
}

//! HTTP handlers for all API routes.

pub mod classify;
pub mod ingestion;
pub mod system;

use serde::Deserialize;

use crate::error::ApiError;

/// Body shared by the classification endpoints.
#[derive(Debug, Deserialize)]
pub struct AbstractBody {
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
}

/// The abstract, or a 400 when it is missing or blank.
pub(crate) fn require_abstract(text: Option<String>) -> Result<String, ApiError> {
    text.filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing abstract".to_string()))
}

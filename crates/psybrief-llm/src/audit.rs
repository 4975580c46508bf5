//! Audit records for capability calls.
//!
//! Each relevance, actionability and extraction call produces one entry so
//! call volume and token spend per batch can be reconstructed from the logs.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::backend::LlmResponse;

/// Which pipeline stage issued the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPurpose {
    Relevance,
    Actionability,
    Extraction,
}

impl CallPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallPurpose::Relevance     => "relevance",
            CallPurpose::Actionability => "actionability",
            CallPurpose::Extraction    => "extraction",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAuditEntry {
    pub id: Uuid,
    pub purpose: CallPurpose,
    /// External id of the article the call was made for, if known.
    pub article_id: Option<String>,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub output_hash: String,
    pub latency_ms: u64,
    pub called_at: chrono::DateTime<Utc>,
}

impl LlmAuditEntry {
    pub fn new(
        purpose: CallPurpose,
        article_id: Option<String>,
        response: &LlmResponse,
        latency_ms: u64,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(response.content.as_bytes());
        let output_hash = format!("{:x}", hasher.finalize());

        Self {
            id: Uuid::new_v4(),
            purpose,
            article_id,
            model: response.model.clone(),
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            output_hash,
            latency_ms,
            called_at: Utc::now(),
        }
    }

    /// Write the entry to the `psybrief::audit` tracing target.
    pub fn emit(&self) {
        tracing::debug!(
            target: "psybrief::audit",
            id = %self.id,
            purpose = self.purpose.as_str(),
            article_id = self.article_id.as_deref().unwrap_or("-"),
            model = %self.model,
            prompt_tokens = self.prompt_tokens,
            completion_tokens = self.completion_tokens,
            latency_ms = self.latency_ms,
            output_hash = %self.output_hash,
            "capability call"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content: &str) -> LlmResponse {
        LlmResponse {
            content: content.to_string(),
            model: "gpt-4o-mini".to_string(),
            prompt_tokens: 300,
            completion_tokens: 12,
        }
    }

    #[test]
    fn test_output_hash_is_stable_sha256() {
        let a = LlmAuditEntry::new(CallPurpose::Relevance, None, &response("{\"relevant\":true}"), 40);
        let b = LlmAuditEntry::new(CallPurpose::Relevance, None, &response("{\"relevant\":true}"), 90);
        assert_eq!(a.output_hash, b.output_hash);
        assert_eq!(a.output_hash.len(), 64);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_entry_copies_usage() {
        let e = LlmAuditEntry::new(
            CallPurpose::Extraction,
            Some("39001234".to_string()),
            &response("{}"),
            1200,
        );
        assert_eq!(e.prompt_tokens, 300);
        assert_eq!(e.completion_tokens, 12);
        assert_eq!(e.purpose.as_str(), "extraction");
        assert_eq!(e.article_id.as_deref(), Some("39001234"));
    }
}

//! Single-call boundary to the text-understanding capability.
//!
//! Every gate and the extraction engine go through [`Capability::call_json`]:
//! one JSON-mode request, one audit entry, and the response parsed into a
//! JSON object. Nothing downstream trusts the object's shape.

use std::sync::Arc;
use std::time::Instant;

use psybrief_llm::{CallPurpose, LlmAuditEntry, LlmBackend, LlmError, LlmRequest};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The call itself did not complete.
    #[error(transparent)]
    Transport(#[from] LlmError),

    /// The call completed but the content is not a JSON object.
    #[error(transparent)]
    Malformed(#[from] JsonShapeError),
}

/// Why model output is not a usable JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonShapeError {
    #[error("not JSON: {0}")]
    NotJson(String),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

#[derive(Clone)]
pub struct Capability {
    backend: Arc<dyn LlmBackend>,
    model: Option<String>,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl Capability {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            model: None,
            temperature: 0.0,
            max_tokens: None,
        }
    }

    /// Override the backend's default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.backend.model_id())
    }

    pub async fn call_json(
        &self,
        purpose: CallPurpose,
        article_id: Option<&str>,
        system: &str,
        user: &str,
    ) -> Result<Map<String, Value>, CapabilityError> {
        let mut req = LlmRequest::prompt(system, user)
            .json()
            .with_temperature(self.temperature);
        req.model = self.model.clone();
        req.max_tokens = self.max_tokens;

        let t0 = Instant::now();
        let resp = self.backend.complete(req).await?;
        LlmAuditEntry::new(
            purpose,
            article_id.map(String::from),
            &resp,
            t0.elapsed().as_millis() as u64,
        )
        .emit();

        Ok(parse_json_object(&resp.content)?)
    }
}

/// Parse model output as a JSON object, tolerating a surrounding Markdown
/// code fence.
pub fn parse_json_object(content: &str) -> Result<Map<String, Value>, JsonShapeError> {
    let body = strip_code_fence(content.trim());
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(JsonShapeError::NotAnObject(json_kind(&other))),
        Err(e) => Err(JsonShapeError::NotJson(e.to_string())),
    }
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Drop the info string ("json") up to the first newline.
    let rest = rest.find('\n').map_or("", |i| &rest[i + 1..]);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

pub(crate) fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null      => "null",
        Value::Bool(_)   => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_)  => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let m = parse_json_object(r#"{ "relevant": true }"#).unwrap();
        assert_eq!(m["relevant"], Value::Bool(true));
    }

    #[test]
    fn test_fenced_object() {
        let m = parse_json_object("```json\n{\"actionable\": false, \"reason\": \"x\"}\n```").unwrap();
        assert_eq!(m["reason"], Value::String("x".into()));
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert_eq!(parse_json_object("[1, 2]").unwrap_err(), JsonShapeError::NotAnObject("array"));
        assert_eq!(parse_json_object("true").unwrap_err(), JsonShapeError::NotAnObject("boolean"));
        assert!(matches!(
            parse_json_object("Yes, it is relevant."),
            Err(JsonShapeError::NotJson(_))
        ));
        assert!(matches!(parse_json_object(""), Err(JsonShapeError::NotJson(_))));
    }
}

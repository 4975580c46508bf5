//! In-process backend that answers from a closure.
//!
//! Used by the test suites and for offline dry runs: no network, no keys.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{LlmBackend, LlmError, LlmRequest, LlmResponse};

type Responder = dyn Fn(&LlmRequest) -> Result<String, LlmError> + Send + Sync;

pub struct ScriptedBackend {
    model: String,
    responder: Box<Responder>,
    calls: AtomicUsize,
    seen: Mutex<Vec<LlmRequest>>,
}

impl ScriptedBackend {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&LlmRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            model: "scripted".to_string(),
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same content.
    pub fn constant(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::new(move |_| Ok(content.clone()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.seen.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

/// System prompt of a request, or "" if it has none.
pub fn system_prompt(req: &LlmRequest) -> &str {
    req.messages
        .iter()
        .find(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

/// Last user turn of a request, or "".
pub fn user_prompt(req: &LlmRequest) -> &str {
    req.messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(req.clone());
        }
        let content = (self.responder)(&req)?;
        Ok(LlmResponse {
            prompt_tokens: (system_prompt(&req).len() + user_prompt(&req).len()) as u32 / 4,
            completion_tokens: content.len() as u32 / 4,
            content,
            model: req.model.clone().unwrap_or_else(|| self.model.clone()),
        })
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { true }
}

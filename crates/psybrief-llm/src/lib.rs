//! psybrief-llm — Text-understanding capability boundary.
//! Implements the LlmBackend trait used by the classification gates and the
//! extraction engine, plus per-call audit records.

pub mod audit;
pub mod backend;
pub mod scripted;

pub use audit::{CallPurpose, LlmAuditEntry};
pub use backend::{
    AnthropicBackend, LlmBackend, LlmError, LlmRequest, LlmResponse, Message, OllamaBackend,
    OpenAiBackend, OpenAiCompatibleBackend,
};
pub use scripted::ScriptedBackend;

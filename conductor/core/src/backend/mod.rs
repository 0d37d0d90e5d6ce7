//! LLM Backend Integration
//!
//! This module provides abstracted access to chat-completion providers
//! through a common trait interface.
//!
//! # Available Backends
//!
//! - **OpenAI-compatible**: api.openai.com, api.together.xyz, or any server
//!   that speaks `/chat/completions` (streaming SSE or batch)
//! - **Scripted**: queued canned answers for tests and offline runs
//!
//! # Usage
//!
//! ```ignore
//! use robot_conductor::backend::{BackendConfig, LlmBackend, LlmRequest, OpenAiBackend};
//!
//! let backend = OpenAiBackend::from_config(&BackendConfig::default())?;
//! let request = LlmRequest::new("Hello!", "gpt-4o-mini");
//! let rx = backend.send_streaming(&request).await?;
//! ```

mod openai;
mod scripted;
mod traits;

pub use openai::{parse_sse_line, OpenAiBackend, SseEvent};
pub use scripted::{Script, ScriptedBackend, StreamTail};
pub use traits::{
    is_model_not_found, BackendConfig, LlmBackend, LlmRequest, LlmResponse, ModelInfo, Provider,
    StreamingToken,
};

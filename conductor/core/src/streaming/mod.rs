//! Response Streaming
//!
//! Everything between the provider and the robot's voice.
//!
//! ```text
//! LlmBackend ──deltas──▶ ResponseConsumer ──fragments──▶ FragmentStream ──▶ Conductor
//!                         (segment + sanitize)            (ordered, with end marker)
//! ```
//!
//! # Features
//!
//! - **Streaming or batch**: the consumer does not assume the provider streams
//! - **Prefix-stable**: a streamed fragment is released once and never revised
//! - **Explicit end**: finished and failed production are distinct terminal states

mod consumer;
mod fragments;

pub use consumer::{ResponseConsumer, ResponseMode, ResponseSettings};
pub use fragments::{fragment_channel, FragmentSink, FragmentStream, StreamEnd};

// Re-export StreamingToken from backend for convenience
pub use crate::backend::StreamingToken;

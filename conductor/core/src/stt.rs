//! Speech-to-text boundary
//!
//! Transcription itself lives outside this crate. The Conductor only needs a
//! [`SpeechToText`] implementation that turns a robot's microphone stream
//! into text; [`Conductor::run_utterance`](crate::Conductor::run_utterance)
//! normalizes the transcript and starts a turn with it.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::messages::DeviceId;

/// Raw PCM chunks from a robot's microphone
pub type AudioStream = mpsc::Receiver<Vec<u8>>;

/// Turns a microphone stream into text
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe everything on `audio` until the stream ends
    async fn transcribe(&self, device: &DeviceId, audio: AudioStream) -> anyhow::Result<String>;
}

/// Lowercase and trim a transcript; `None` if nothing was said
#[must_use]
pub fn normalize_transcript(text: &str) -> Option<String> {
    let normalized = text.trim().to_lowercase();
    (!normalized.is_empty()).then_some(normalized)
}

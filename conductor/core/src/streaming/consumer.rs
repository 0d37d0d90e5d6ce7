//! Response Consumer
//!
//! Drives one language-model exchange and turns the reply into fragments.
//!
//! [`ResponseConsumer::request`] returns a [`FragmentStream`] immediately and
//! fills it from a background task:
//!
//! - **Streaming**: every delta goes into a [`Segmenter`]; only fragments it
//!   releases are pushed, so nothing is ever emitted twice
//! - **Batch**: the complete reply is segmented once and pushed in full
//!
//! Each fragment is sanitized for speech before it is pushed. A failure
//! before the first fragment fails the stream outright; after that the
//! delivered fragments stand and only the unfinished tail is lost. A reply
//! with nothing speakable counts as [`TurnError::EmptyResponse`].
//!
//! If the provider rejects the model as unknown before any fragment was
//! delivered, the request is retried once against the fallback model.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::fragments::{fragment_channel, FragmentSink, FragmentStream};
use crate::backend::{is_model_not_found, LlmBackend, LlmRequest, StreamingToken};
use crate::error::TurnError;
use crate::memory::ConversationHistory;
use crate::persona::{Persona, DEFAULT_PROMPT};
use crate::text::{sanitize, segment, Segmenter};

/// Capacity of the fragment channel between producer and Conductor
const FRAGMENT_BUFFER: usize = 64;

/// How the provider delivers its answer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Incremental deltas
    #[default]
    Streaming,
    /// One complete message
    Batch,
}

/// Request parameters shared by every turn
#[derive(Clone, Debug)]
pub struct ResponseSettings {
    /// Delivery mode
    pub mode: ResponseMode,
    /// Primary model
    pub model: String,
    /// Model to retry with when the primary one is unknown
    pub fallback_model: Option<String>,
    /// Base system prompt, extended per persona
    pub system_prompt: String,
    /// Maximum tokens in a reply
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling mass
    pub top_p: f32,
}

impl Default for ResponseSettings {
    fn default() -> Self {
        Self {
            mode: ResponseMode::Streaming,
            model: "gpt-4o-mini".to_string(),
            fallback_model: Some("gpt-3.5-turbo".to_string()),
            system_prompt: DEFAULT_PROMPT.to_string(),
            max_tokens: 2048,
            temperature: 1.0,
            top_p: 1.0,
        }
    }
}

/// Issues provider requests and produces fragment streams
pub struct ResponseConsumer<B: LlmBackend> {
    backend: Arc<B>,
    settings: ResponseSettings,
}

impl<B: LlmBackend + 'static> ResponseConsumer<B> {
    /// Create a consumer over a backend
    pub fn new(backend: Arc<B>, settings: ResponseSettings) -> Self {
        Self { backend, settings }
    }

    /// Build the provider request for a turn
    #[must_use]
    pub fn build_request(
        &self,
        history: &ConversationHistory,
        persona: Persona,
        text: &str,
    ) -> LlmRequest {
        LlmRequest::new(text, self.settings.model.clone())
            .with_stream(self.settings.mode == ResponseMode::Streaming)
            .with_system(persona.system_prompt(&self.settings.system_prompt))
            .with_history(history.messages().to_vec())
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature)
            .with_top_p(self.settings.top_p)
    }

    /// Start a request; fragments arrive on the returned stream
    ///
    /// Dropping the stream stops the producer.
    pub fn request(
        &self,
        history: &ConversationHistory,
        persona: Persona,
        text: &str,
    ) -> FragmentStream {
        let request = self.build_request(history, persona, text);
        let (sink, stream) = fragment_channel(FRAGMENT_BUFFER);
        let backend = Arc::clone(&self.backend);
        let mode = self.settings.mode;
        let fallback = self.settings.fallback_model.clone();

        tokio::spawn(produce(backend, request, mode, fallback, sink));
        stream
    }
}

/// Producer task: run the exchange, retrying once on an unknown model
async fn produce<B: LlmBackend>(
    backend: Arc<B>,
    mut request: LlmRequest,
    mode: ResponseMode,
    fallback_model: Option<String>,
    mut sink: FragmentSink,
) {
    let mut fallback_model = fallback_model.filter(|m| *m != request.model);
    loop {
        let result = match mode {
            ResponseMode::Streaming => stream_once(backend.as_ref(), &request, &mut sink).await,
            ResponseMode::Batch => batch_once(backend.as_ref(), &request, &mut sink).await,
        };

        match result {
            Ok(()) => {
                sink.finish().await;
                return;
            }
            Err(TurnError::Provider(message))
                if sink.emitted() == 0 && is_model_not_found(&message) =>
            {
                if let Some(fallback) = fallback_model.take() {
                    tracing::warn!(
                        model = %request.model,
                        fallback = %fallback,
                        "Model not available, retrying with fallback"
                    );
                    request = request.with_model(fallback);
                    continue;
                }
                sink.fail(TurnError::Provider(message)).await;
                return;
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    fragments = sink.emitted(),
                    "Response production failed"
                );
                sink.fail(error).await;
                return;
            }
        }
    }
}

/// Sanitize and push one fragment; false once the consumer is gone
///
/// A fragment with nothing pronounceable left is skipped.
async fn emit(sink: &mut FragmentSink, raw: &str) -> bool {
    let clean = sanitize(raw);
    let clean = clean.trim();
    if !clean.chars().any(char::is_alphanumeric) {
        tracing::trace!(fragment = raw, "Skipping unpronounceable fragment");
        return true;
    }
    sink.push(clean.to_string()).await
}

async fn stream_once<B: LlmBackend + ?Sized>(
    backend: &B,
    request: &LlmRequest,
    sink: &mut FragmentSink,
) -> Result<(), TurnError> {
    let mut tokens = backend
        .send_streaming(request)
        .await
        .map_err(|e| TurnError::Provider(e.to_string()))?;
    let mut segmenter = Segmenter::new();

    loop {
        let token = tokio::select! {
            biased;
            () = sink.closed() => return Ok(()),
            token = tokens.recv() => token,
        };

        match token {
            Some(StreamingToken::Token(delta)) => {
                for fragment in segmenter.push(&delta) {
                    if !emit(sink, &fragment).await {
                        return Ok(());
                    }
                }
            }
            Some(StreamingToken::Complete { message }) => {
                // Deltas already delivered win over the summary message
                if segmenter.text().is_empty() {
                    for fragment in segmenter.push(&message) {
                        if !emit(sink, &fragment).await {
                            return Ok(());
                        }
                    }
                }
                break;
            }
            Some(StreamingToken::Error(e)) => return Err(TurnError::Provider(e)),
            None => {
                return Err(TurnError::Provider(
                    "stream closed without completing".to_string(),
                ))
            }
        }
    }

    for fragment in segmenter.finish() {
        if !emit(sink, &fragment).await {
            return Ok(());
        }
    }
    if sink.emitted() == 0 {
        return Err(TurnError::EmptyResponse);
    }
    Ok(())
}

async fn batch_once<B: LlmBackend + ?Sized>(
    backend: &B,
    request: &LlmRequest,
    sink: &mut FragmentSink,
) -> Result<(), TurnError> {
    let response = tokio::select! {
        biased;
        () = sink.closed() => return Ok(()),
        response = backend.send(request) => response,
    };
    let response = response.map_err(|e| TurnError::Provider(e.to_string()))?;

    for fragment in segment(&response.content) {
        if !emit(sink, &fragment).await {
            return Ok(());
        }
    }
    if sink.emitted() == 0 {
        return Err(TurnError::EmptyResponse);
    }
    Ok(())
}

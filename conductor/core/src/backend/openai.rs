//! OpenAI-compatible Backend Implementation
//!
//! One client for every provider that speaks the OpenAI chat API:
//! OpenAI itself, Together, and self-hosted servers.
//!
//! # API
//!
//! - `POST /chat/completions` - Chat completions, batch or streamed as
//!   server-sent events (`data: {...}` lines ending with `data: [DONE]`)
//! - `GET /models` - List available models (also used as health probe)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::{
    BackendConfig, LlmBackend, LlmRequest, LlmResponse, ModelInfo, Provider, StreamingToken,
};

/// One parsed server-sent event line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseEvent {
    /// Text delta
    Delta(String),
    /// End of stream marker
    Done,
    /// Error object sent in-band
    Error(String),
}

/// Parse one line of a `/chat/completions` event stream
///
/// Returns `None` for blank lines, comments, non-data fields, and chunks
/// that carry no text (role announcements, finish reasons).
#[must_use]
pub fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => return Some(SseEvent::Error(format!("malformed stream chunk: {e}"))),
    };

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map_or_else(|| error.to_string(), String::from);
        return Some(SseEvent::Error(message));
    }

    value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(|content| content.as_str())
        .filter(|content| !content.is_empty())
        .map(|content| SseEvent::Delta(content.to_string()))
}

/// Time allowed to establish the connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest silence tolerated between two reads of a response body
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI-compatible backend client
#[derive(Clone)]
pub struct OpenAiBackend {
    /// Display name of the provider
    name: String,
    /// Base URL without trailing slash (e.g. `https://api.openai.com/v1`)
    base_url: String,
    /// Bearer token
    api_key: Option<String>,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OpenAiBackend {
    /// Create a new backend for a base URL
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> anyhow::Result<Self> {
        Self::with_read_timeout(name, base_url, api_key, READ_TIMEOUT)
    }

    fn with_read_timeout(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        read_timeout: Duration,
    ) -> anyhow::Result<Self> {
        // No whole-request timeout: a long stream is bounded by the turn
        // deadline, a stalled one by the read timeout
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(read_timeout)
            .build()?;
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            http_client,
        })
    }

    /// Create from `BackendConfig`
    pub fn from_config(config: &BackendConfig) -> anyhow::Result<Self> {
        let Some(base_url) = config.base_url() else {
            anyhow::bail!("provider '{}' needs an endpoint", config.provider);
        };
        let name = match config.provider {
            Provider::OpenAi => "OpenAI",
            Provider::Together => "Together",
            Provider::Custom => "Custom",
        };
        Self::new(name, base_url, config.api_key.clone())
    }

    /// Get chat completions endpoint URL
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Get models endpoint URL
    fn models_url(&self) -> String {
        format!("{}/models", self.base_url)
    }

    /// JSON body for a chat completion request
    fn build_body(request: &LlmRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages()
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "stream": stream,
        });
        if request.max_tokens > 0 {
            body["max_tokens"] = serde_json::json!(request.max_tokens);
        }
        body
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn post(&self, body: &serde_json::Value) -> anyhow::Result<reqwest::Response> {
        let response = self
            .authorized(self.http_client.post(self.completions_url()))
            .json(body)
            .send()
            .await?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {status}: {body}", self.name);
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> bool {
        self.authorized(self.http_client.get(self.models_url()))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }

    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>> {
        let (tx, rx) = mpsc::channel(100);

        let response = self.post(&Self::build_body(request, true)).await?;
        let mut stream = response.bytes_stream();

        // Spawn task to process stream
        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();
            let mut full_response = String::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(StreamingToken::Error(e.to_string())).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                // Split on newlines at the byte level so multi-byte
                // characters straddling chunks survive
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    match parse_sse_line(&line) {
                        Some(SseEvent::Delta(token)) => {
                            full_response.push_str(&token);
                            if tx.send(StreamingToken::Token(token)).await.is_err() {
                                // Receiver dropped, stop streaming
                                return;
                            }
                        }
                        Some(SseEvent::Done) => {
                            let _ = tx
                                .send(StreamingToken::Complete {
                                    message: full_response,
                                })
                                .await;
                            return;
                        }
                        Some(SseEvent::Error(e)) => {
                            let _ = tx.send(StreamingToken::Error(e)).await;
                            return;
                        }
                        None => {}
                    }
                }
            }

            // Stream ended without [DONE]
            if full_response.is_empty() {
                let _ = tx
                    .send(StreamingToken::Error(
                        "stream closed before any content".to_string(),
                    ))
                    .await;
            } else {
                let _ = tx
                    .send(StreamingToken::Complete {
                        message: full_response,
                    })
                    .await;
            }
        });

        Ok(rx)
    }

    async fn send(&self, request: &LlmRequest) -> anyhow::Result<LlmResponse> {
        let start = Instant::now();
        let response = self.post(&Self::build_body(request, false)).await?;
        let data: serde_json::Value = response.json().await?;

        let content = data
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .unwrap_or("")
            .to_string();

        let tokens_used = data
            .get("usage")
            .and_then(|u| u.get("total_tokens"))
            .and_then(serde_json::Value::as_u64)
            .and_then(|c| u32::try_from(c).ok());

        let model = data
            .get("model")
            .and_then(|m| m.as_str())
            .map_or_else(|| request.model.clone(), String::from);

        Ok(LlmResponse {
            content,
            model,
            tokens_used,
            duration_ms: u64::try_from(start.elapsed().as_millis()).ok(),
        })
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let response = self
            .authorized(self.http_client.get(self.models_url()))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {status}: {body}", self.name);
        }

        let data: serde_json::Value = response.json().await?;

        // OpenAI wraps the list in {"data": [...]}, Together returns a bare array
        let entries = data
            .get("data")
            .and_then(|d| d.as_array())
            .or_else(|| data.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(entries
            .iter()
            .filter_map(|m| {
                let name = m.get("id")?.as_str()?.to_string();
                let owned_by = m.get("owned_by").and_then(|o| o.as_str()).map(String::from);
                Some(ModelInfo { name, owned_by })
            })
            .collect())
    }
}

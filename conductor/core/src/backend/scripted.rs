//! Scripted Backend
//!
//! A provider that answers from a queue of scripts instead of the network.
//! Tests use it to stage streaming, batch, and failure scenarios; the CLI
//! uses it for offline runs. With an empty queue it echoes the prompt.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::traits::{LlmBackend, LlmRequest, LlmResponse, ModelInfo, StreamingToken};

/// How a scripted stream ends
#[derive(Clone, Debug)]
pub enum StreamTail {
    /// Normal completion
    Complete,
    /// In-band error after the deltas
    Error(String),
    /// Close the channel without a terminal token
    Drop,
    /// Never finish
    Hang,
}

/// One scripted answer
#[derive(Clone, Debug)]
pub enum Script {
    /// Deliver deltas one at a time with `delay` before each
    Stream {
        /// Text deltas
        deltas: Vec<String>,
        /// Pause before each delta
        delay: Duration,
        /// What follows the last delta
        tail: StreamTail,
    },
    /// Answer with complete text after `delay`
    Reply {
        /// Response text
        text: String,
        /// Pause before answering
        delay: Duration,
    },
    /// Reject the request outright
    Fail(String),
}

impl Script {
    /// A stream that completes normally
    pub fn stream<I, S>(deltas: I, delay: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Stream {
            deltas: deltas.into_iter().map(Into::into).collect(),
            delay,
            tail: StreamTail::Complete,
        }
    }

    /// An immediate complete answer
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply {
            text: text.into(),
            delay: Duration::ZERO,
        }
    }
}

/// Backend driven by queued scripts
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedBackend {
    /// Create a backend with an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with queued scripts
    pub fn with_scripts(scripts: impl IntoIterator<Item = Script>) -> Self {
        let backend = Self::new();
        backend.scripts.lock().extend(scripts);
        backend
    }

    /// Queue another script
    pub fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    /// Every request received, in order
    #[must_use]
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }

    fn next_script(&self, request: &LlmRequest) -> Script {
        self.requests.lock().push(request.clone());
        self.scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Script::reply(format!("You said: {}.", request.prompt.trim())))
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>> {
        let (deltas, delay, tail) = match self.next_script(request) {
            Script::Fail(message) => anyhow::bail!(message),
            Script::Reply { text, delay } => (vec![text], delay, StreamTail::Complete),
            Script::Stream {
                deltas,
                delay,
                tail,
            } => (deltas, delay, tail),
        };

        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(async move {
            let mut full = String::new();
            for delta in deltas {
                tokio::time::sleep(delay).await;
                full.push_str(&delta);
                if tx.send(StreamingToken::Token(delta)).await.is_err() {
                    return;
                }
            }
            match tail {
                StreamTail::Complete => {
                    let _ = tx.send(StreamingToken::Complete { message: full }).await;
                }
                StreamTail::Error(message) => {
                    let _ = tx.send(StreamingToken::Error(message)).await;
                }
                StreamTail::Drop => {}
                StreamTail::Hang => tx.closed().await,
            }
        });
        Ok(rx)
    }

    async fn send(&self, request: &LlmRequest) -> anyhow::Result<LlmResponse> {
        let content = match self.next_script(request) {
            Script::Fail(message) => anyhow::bail!(message),
            Script::Reply { text, delay } => {
                tokio::time::sleep(delay).await;
                text
            }
            Script::Stream {
                deltas,
                delay,
                tail,
            } => {
                let count = u32::try_from(deltas.len()).unwrap_or(u32::MAX);
                tokio::time::sleep(delay.saturating_mul(count)).await;
                match tail {
                    StreamTail::Complete => deltas.concat(),
                    StreamTail::Error(message) => anyhow::bail!(message),
                    StreamTail::Drop => anyhow::bail!("connection closed"),
                    StreamTail::Hang => std::future::pending().await,
                }
            }
        };

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            tokens_used: None,
            duration_ms: None,
        })
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            name: "scripted".to_string(),
            owned_by: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_when_queue_empty() {
        let backend = ScriptedBackend::new();
        let response = backend.send(&LlmRequest::new("hello robot", "m")).await.unwrap();
        assert_eq!(response.content, "You said: hello robot.");
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_script_tail() {
        let backend = ScriptedBackend::with_scripts([Script::Stream {
            deltas: vec!["Hi".to_string()],
            delay: Duration::from_millis(10),
            tail: StreamTail::Error("boom".to_string()),
        }]);
        let mut rx = backend.send_streaming(&LlmRequest::new("q", "m")).await.unwrap();

        assert!(matches!(rx.recv().await, Some(StreamingToken::Token(t)) if t == "Hi"));
        assert!(matches!(rx.recv().await, Some(StreamingToken::Error(e)) if e == "boom"));
        assert!(rx.recv().await.is_none());
    }
}

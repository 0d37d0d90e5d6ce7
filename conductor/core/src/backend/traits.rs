//! LLM Backend Traits
//!
//! Trait definitions for language-model providers. The Conductor talks to
//! every provider through [`LlmBackend`], so switching between OpenAI,
//! Together, or a self-hosted OpenAI-compatible server never touches turn
//! logic.
//!
//! # Design Philosophy
//!
//! The LlmBackend trait provides a common interface for:
//! - Sending a chat request and receiving the reply (streaming or batch)
//! - Health checking the provider
//! - Querying available models
//!
//! Implementations handle provider-specific details (URLs, auth, wire format).

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::messages::ChatMessage;

/// Token stream events from LLM backends
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamingToken {
    /// A text delta from the response
    Token(String),
    /// Response completed successfully
    Complete {
        /// The complete message (may differ from concatenated tokens)
        message: String,
    },
    /// Error occurred during streaming
    Error(String),
}

/// A chat completion request
#[derive(Clone, Debug)]
pub struct LlmRequest {
    /// The new user message
    pub prompt: String,
    /// Model to use (provider-specific identifier)
    pub model: String,
    /// Whether to stream the response
    pub stream: bool,
    /// Maximum tokens in response (0 = provider default)
    pub max_tokens: u32,
    /// Sampling temperature (0.0-2.0)
    pub temperature: f32,
    /// Nucleus sampling mass (0.0-1.0)
    pub top_p: f32,
    /// System prompt (optional, sent first)
    pub system: Option<String>,
    /// Earlier messages of this conversation, oldest first
    pub history: Vec<ChatMessage>,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            model: String::new(),
            stream: true,
            max_tokens: 2048,
            temperature: 1.0,
            top_p: 1.0,
            system: None,
            history: Vec::new(),
        }
    }
}

impl LlmRequest {
    /// Create a new request with prompt and model
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set streaming mode
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set top-p
    #[must_use]
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p.clamp(0.0, 1.0);
        self
    }

    /// Set system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set conversation history
    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Same request against another model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Full message list: system prompt, history, then the new user message
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(system) = &self.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(self.prompt.clone()));
        messages
    }
}

/// Response from non-streaming LLM request
#[derive(Clone, Debug)]
pub struct LlmResponse {
    /// The response text
    pub content: String,
    /// Model that generated the response
    pub model: String,
    /// Tokens used (if available)
    pub tokens_used: Option<u32>,
    /// Response generation time in milliseconds
    pub duration_ms: Option<u64>,
}

/// Information about an available model
#[derive(Clone, Debug)]
pub struct ModelInfo {
    /// Model identifier
    pub name: String,
    /// Organization that owns the model (if reported)
    pub owned_by: Option<String>,
}

/// LLM Backend trait
///
/// Implement this trait to add support for different LLM providers.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Get the backend name (e.g., "OpenAI", "Together")
    fn name(&self) -> &str;

    /// Check if the backend is healthy and reachable
    async fn health_check(&self) -> bool;

    /// Send a request and get a streaming response
    ///
    /// Returns a channel receiver that will receive tokens as they arrive.
    /// The channel will be closed when the response is complete or an error occurs.
    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>>;

    /// Send a request and wait for complete response (non-streaming)
    async fn send(&self, request: &LlmRequest) -> anyhow::Result<LlmResponse>;

    /// List available models
    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>>;

    /// Check if a specific model is available
    async fn has_model(&self, model: &str) -> anyhow::Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| m.name == model))
    }
}

/// Whether a provider error says the requested model does not exist
#[must_use]
pub fn is_model_not_found(error: &str) -> bool {
    let lower = error.to_lowercase();
    lower.contains("model_not_found") || lower.contains("does not exist")
}

/// Which OpenAI-compatible service to talk to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// api.openai.com
    #[default]
    OpenAi,
    /// api.together.xyz
    Together,
    /// Any OpenAI-compatible endpoint
    Custom,
}

impl Provider {
    /// Base URL used when no endpoint is configured
    #[must_use]
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Together => Some("https://api.together.xyz/v1"),
            Self::Custom => None,
        }
    }

    /// Model used when none is configured
    #[must_use]
    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi | Self::Custom => "gpt-4o-mini",
            Self::Together => "meta-llama/Llama-3-70b-chat-hf",
        }
    }

    /// Model to retry with when the configured one is unknown
    #[must_use]
    pub fn default_fallback_model(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("gpt-3.5-turbo"),
            Self::Together | Self::Custom => None,
        }
    }

    /// Whether requests must carry an API key
    #[must_use]
    pub fn requires_api_key(self) -> bool {
        !matches!(self, Self::Custom)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => f.write_str("openai"),
            Self::Together => f.write_str("together"),
            Self::Custom => f.write_str("custom"),
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "together" | "togetherai" => Ok(Self::Together),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown provider '{other}' (expected openai, together, custom)")),
        }
    }
}

/// Backend connection configuration
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendConfig {
    /// Which service to use
    pub provider: Provider,
    /// API key sent as a bearer token
    pub api_key: Option<String>,
    /// Base URL override (required for custom providers)
    pub endpoint: Option<String>,
}

impl BackendConfig {
    /// Base URL requests go to, if one can be determined
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| self.provider.default_base_url())
            .map(|url| url.trim_end_matches('/').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageRole;

    #[test]
    fn test_llm_request_builder() {
        let request = LlmRequest::new("Hello", "gpt-4o-mini")
            .with_stream(false)
            .with_temperature(0.5)
            .with_top_p(0.9)
            .with_system("You are helpful")
            .with_max_tokens(100);

        assert_eq!(request.prompt, "Hello");
        assert_eq!(request.model, "gpt-4o-mini");
        assert!(!request.stream);
        assert!((request.temperature - 0.5).abs() < f32::EPSILON);
        assert!((request.top_p - 0.9).abs() < f32::EPSILON);
        assert_eq!(request.system, Some("You are helpful".to_string()));
        assert_eq!(request.max_tokens, 100);
    }

    #[test]
    fn test_messages_order() {
        let request = LlmRequest::new("and now?", "m")
            .with_system("sys")
            .with_history(vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]);

        let roles: Vec<_> = request.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
        assert_eq!(request.messages().last().map(|m| m.content.as_str()), Some("and now?"));
    }

    #[test]
    fn test_model_not_found_detection() {
        assert!(is_model_not_found(
            "OpenAI returned 404 Not Found: {\"error\":{\"code\":\"model_not_found\"}}"
        ));
        assert!(is_model_not_found("The model `gpt-9` does not exist"));
        assert!(!is_model_not_found("rate limit exceeded"));
    }

    #[test]
    fn test_provider_defaults() {
        let config = BackendConfig::default();
        assert_eq!(config.base_url().as_deref(), Some("https://api.openai.com/v1"));

        let together = BackendConfig {
            provider: Provider::Together,
            ..Default::default()
        };
        assert_eq!(together.base_url().as_deref(), Some("https://api.together.xyz/v1"));
        assert_eq!(Provider::Together.default_model(), "meta-llama/Llama-3-70b-chat-hf");

        let custom = BackendConfig {
            provider: Provider::Custom,
            endpoint: Some("http://localhost:8080/v1/".to_string()),
            ..Default::default()
        };
        assert_eq!(custom.base_url().as_deref(), Some("http://localhost:8080/v1"));
        assert!(BackendConfig {
            provider: Provider::Custom,
            ..Default::default()
        }
        .base_url()
        .is_none());
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("OpenAI".parse::<Provider>(), Ok(Provider::OpenAi));
        assert_eq!("together".parse::<Provider>(), Ok(Provider::Together));
        assert!("ollama".parse::<Provider>().is_err());
    }
}

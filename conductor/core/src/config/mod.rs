//! TOML Configuration File Support
//!
//! Centralized configuration loading for the robot conductor, supporting a
//! TOML file at `~/.config/robot-conductor/conductor.toml`.
//!
//! # Configuration Priority
//!
//! Values are applied in this order, later layers winning:
//! 1. Default values
//! 2. TOML configuration file
//! 3. Environment variables
//! 4. CLI arguments ([`ConfigOverrides`])
//!
//! # Example Configuration
//!
//! ```toml
//! [provider]
//! kind = "openai"
//! api_key = "sk-..."
//! model = "gpt-4o-mini"
//! fallback_model = "gpt-3.5-turbo"
//! streaming = true
//!
//! [turn]
//! timeout_secs = 120
//! fragment_pause_ms = 200
//! speaking_animation = true
//!
//! [memory]
//! save_chat = true
//! max_messages = 16
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{BackendConfig, Provider};
use crate::conductor::ConductorConfig;
use crate::memory::DEFAULT_MAX_MESSAGES;
use crate::streaming::ResponseMode;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Provider section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    /// openai, together, or custom
    pub kind: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// Base URL (required for custom)
    pub endpoint: Option<String>,

    /// Primary model
    pub model: Option<String>,

    /// Model to retry with when the primary one is unknown
    pub fallback_model: Option<String>,

    /// Base system prompt
    pub prompt: Option<String>,

    /// Maximum tokens in a reply
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Nucleus sampling mass
    pub top_p: Option<f32>,

    /// false selects batch mode
    pub streaming: Option<bool>,
}

/// Turn section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnToml {
    /// Whole-turn deadline in seconds
    pub timeout_secs: Option<u64>,

    /// Control grant timeout in seconds
    pub lease_timeout_secs: Option<u64>,

    /// Pause between fragments in milliseconds
    pub fragment_pause_ms: Option<u64>,

    /// Pause before release in milliseconds
    pub settle_pause_ms: Option<u64>,

    /// Pause between thinking animation plays in milliseconds
    pub idle_animation_interval_ms: Option<u64>,

    /// Loop an animation while speaking
    pub speaking_animation: Option<bool>,

    /// Serialize actuator RPCs per connection
    pub serialize_device_rpcs: Option<bool>,

    /// Spoken when no usable reply arrives
    pub fallback_text: Option<String>,

    /// Use the robot's own voice
    pub robot_voice: Option<bool>,

    /// Speech duration scalar
    pub speech_speed: Option<f32>,
}

/// Memory section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryToml {
    /// Whether turns read and extend conversation memory
    pub save_chat: Option<bool>,

    /// Messages remembered per robot
    pub max_messages: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorToml {
    /// Provider configuration section
    pub provider: ProviderToml,

    /// Turn configuration section
    pub turn: TurnToml,

    /// Memory configuration section
    pub memory: MemoryToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Everything needed to build a backend and a Conductor
///
/// Use [`load_config`] to load with proper priority handling.
#[derive(Clone, Debug)]
pub struct ConductorConfigFile {
    /// Provider connection
    pub backend: BackendConfig,

    /// Explicitly configured model; `None` means the provider's default
    pub model: Option<String>,

    /// Explicitly configured fallback model; `None` means the provider's default
    pub fallback_model: Option<String>,

    /// Conductor behavior
    pub conductor: ConductorConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ConductorConfigFile {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            model: None,
            fallback_model: None,
            conductor: ConductorConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ConductorConfigFile {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Model requests go to
    #[must_use]
    pub fn effective_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.backend.provider.default_model().to_string())
    }

    /// Model retried when the provider does not know the primary one
    ///
    /// Only OpenAI has a default; other providers retry only when one is
    /// configured.
    #[must_use]
    pub fn effective_fallback_model(&self) -> Option<String> {
        self.fallback_model.clone().or_else(|| {
            self.backend
                .provider
                .default_fallback_model()
                .map(str::to_string)
        })
    }

    /// Conductor configuration with the effective models filled in
    #[must_use]
    pub fn conductor_config(&self) -> ConductorConfig {
        let mut config = self.conductor.clone();
        config.response.model = self.effective_model();
        config.response.fallback_model = self.effective_fallback_model();
        config
    }

    /// Check turn and memory settings
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = self.conductor.max_history_messages;
        if !(2..=DEFAULT_MAX_MESSAGES).contains(&max) || max % 2 != 0 {
            return Err(ConfigError::ValidationError(format!(
                "memory.max_messages must be an even number between 2 and {DEFAULT_MAX_MESSAGES}, got {max}"
            )));
        }
        if self.conductor.turn_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "turn.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.conductor.response.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "provider.temperature must be between 0 and 2, got {}",
                self.conductor.response.temperature
            )));
        }
        let speed = self.conductor.duration_scalar;
        if speed.is_nan() || speed <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "turn.speech_speed must be positive, got {speed}"
            )));
        }
        Ok(())
    }

    /// Check that the provider can actually be reached
    ///
    /// Offline runs skip this.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a custom provider without
    /// an endpoint or a hosted provider without an API key.
    pub fn validate_provider(&self) -> Result<(), ConfigError> {
        let provider = self.backend.provider;
        if self.backend.base_url().is_none() {
            return Err(ConfigError::ValidationError(format!(
                "provider '{provider}' needs provider.endpoint (or OPENAI_BASE)"
            )));
        }
        let has_key = self
            .backend
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if provider.requires_api_key() && !has_key {
            return Err(ConfigError::ValidationError(format!(
                "provider '{provider}' needs provider.api_key (or OPENAI_KEY)"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/robot-conductor/conductor.toml` or
/// `~/.config/robot-conductor/conductor.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("robot-conductor").join("conductor.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] after.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// result fails [`ConductorConfigFile::validate`]. A missing config file is
/// not an error (defaults are used).
pub fn load_config() -> Result<ConductorConfigFile, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ConductorConfigFile, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Load configuration with a custom environment lookup
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or the merged configuration is invalid.
pub fn load_config_with<F>(path: Option<PathBuf>, env: F) -> Result<ConductorConfigFile, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ConductorConfigFile::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConductorToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env)?;
    config.validate()?;

    Ok(config)
}

fn parse_provider(value: &str) -> Result<Provider, ConfigError> {
    value.parse().map_err(ConfigError::ValidationError)
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value != "0" && value != "false" && value != "no" && value != "off"
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ConductorConfigFile, toml: &ConductorToml) -> Result<(), ConfigError> {
    let provider = &toml.provider;
    if let Some(ref kind) = provider.kind {
        config.backend.provider = parse_provider(kind)?;
    }
    if provider.api_key.is_some() {
        config.backend.api_key.clone_from(&provider.api_key);
    }
    if provider.endpoint.is_some() {
        config.backend.endpoint.clone_from(&provider.endpoint);
    }
    if provider.model.is_some() {
        config.model.clone_from(&provider.model);
    }

    if provider.fallback_model.is_some() {
        config.fallback_model.clone_from(&provider.fallback_model);
    }

    let response = &mut config.conductor.response;
    if let Some(ref prompt) = provider.prompt {
        response.system_prompt.clone_from(prompt);
    }
    if let Some(max_tokens) = provider.max_tokens {
        response.max_tokens = max_tokens;
    }
    if let Some(temperature) = provider.temperature {
        response.temperature = temperature;
    }
    if let Some(top_p) = provider.top_p {
        response.top_p = top_p;
    }
    if let Some(streaming) = provider.streaming {
        response.mode = if streaming {
            ResponseMode::Streaming
        } else {
            ResponseMode::Batch
        };
    }

    // Turn settings
    let turn = &toml.turn;
    let conductor = &mut config.conductor;
    if let Some(secs) = turn.timeout_secs {
        conductor.turn_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = turn.lease_timeout_secs {
        conductor.lease_timeout = Duration::from_secs(secs);
    }
    if let Some(ms) = turn.fragment_pause_ms {
        conductor.fragment_pause = Duration::from_millis(ms);
    }
    if let Some(ms) = turn.settle_pause_ms {
        conductor.settle_pause = Duration::from_millis(ms);
    }
    if let Some(ms) = turn.idle_animation_interval_ms {
        conductor.idle_animation_interval = Duration::from_millis(ms);
    }
    if let Some(enabled) = turn.speaking_animation {
        conductor.speaking_animation = enabled;
    }
    if let Some(enabled) = turn.serialize_device_rpcs {
        conductor.serialize_device_rpcs = enabled;
    }
    if let Some(ref text) = turn.fallback_text {
        conductor.fallback_text.clone_from(text);
    }
    if let Some(enabled) = turn.robot_voice {
        conductor.use_robot_voice = enabled;
    }
    if let Some(speed) = turn.speech_speed {
        conductor.duration_scalar = speed;
    }

    // Memory settings
    if let Some(enabled) = toml.memory.save_chat {
        conductor.save_chat = enabled;
    }
    if let Some(max) = toml.memory.max_messages {
        conductor.max_history_messages = max;
    }

    Ok(())
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ConductorConfigFile, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(kind) = env("ROBOT_CONDUCTOR_PROVIDER") {
        config.backend.provider = parse_provider(&kind)?;
        config.source = ConfigSource::Env;
    }
    if let Some(key) = env("OPENAI_KEY") {
        config.backend.api_key = Some(key);
        config.source = ConfigSource::Env;
    }
    if let Some(base) = env("OPENAI_BASE") {
        config.backend.endpoint = Some(base);
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env("ROBOT_CONDUCTOR_MODEL") {
        config.model = Some(model);
        config.source = ConfigSource::Env;
    }
    if let Some(prompt) = env("ROBOT_CONDUCTOR_PROMPT") {
        config.conductor.response.system_prompt = prompt;
        config.source = ConfigSource::Env;
    }
    if let Some(streaming) = env("ROBOT_CONDUCTOR_STREAMING") {
        config.conductor.response.mode = if parse_flag(&streaming) {
            ResponseMode::Streaming
        } else {
            ResponseMode::Batch
        };
        config.source = ConfigSource::Env;
    }
    if let Some(save) = env("ROBOT_CONDUCTOR_SAVE_CHAT") {
        config.conductor.save_chat = parse_flag(&save);
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = env("ROBOT_CONDUCTOR_TURN_TIMEOUT") {
        if let Ok(secs) = timeout.trim().parse::<u64>() {
            config.conductor.turn_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        } else {
            tracing::warn!(value = %timeout, "Ignoring non-numeric ROBOT_CONDUCTOR_TURN_TIMEOUT");
        }
    }
    if let Some(enabled) = env("ROBOT_CONDUCTOR_SPEAKING_ANIMATION") {
        config.conductor.speaking_animation = parse_flag(&enabled);
        config.source = ConfigSource::Env;
    }
    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Model override
    pub model: Option<String>,

    /// Delivery mode override
    pub mode: Option<ResponseMode>,

    /// Memory on/off override
    pub save_chat: Option<bool>,

    /// Speaking animation override
    pub speaking_animation: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Set delivery mode override
    #[must_use]
    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set memory override
    #[must_use]
    pub fn with_save_chat(mut self, enabled: bool) -> Self {
        self.save_chat = Some(enabled);
        self
    }

    /// Set speaking animation override
    #[must_use]
    pub fn with_speaking_animation(mut self, enabled: bool) -> Self {
        self.speaking_animation = Some(enabled);
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.model.is_none()
            && self.mode.is_none()
            && self.save_chat.is_none()
            && self.speaking_animation.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ConductorConfigFile) {
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }
        if let Some(ref model) = self.model {
            config.model = Some(model.clone());
        }
        if let Some(mode) = self.mode {
            config.conductor.response.mode = mode;
        }
        if let Some(enabled) = self.save_chat {
            config.conductor.save_chat = enabled;
        }
        if let Some(enabled) = self.speaking_animation {
            config.conductor.speaking_animation = enabled;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = ConductorConfigFile::default();

        assert_eq!(config.backend.provider, Provider::OpenAi);
        assert_eq!(config.effective_model(), "gpt-4o-mini");
        assert!(config.conductor.save_chat);
        assert_eq!(config.conductor.max_history_messages, 16);
        assert_eq!(config.conductor.turn_timeout, Duration::from_secs(120));
        assert_eq!(config.conductor.response.max_tokens, 2048);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.to_string_lossy().contains("robot-conductor"));
            assert!(p.to_string_lossy().contains("conductor.toml"));
        }
    }

    // =========================================================================
    // TOML Parsing Tests
    // =========================================================================

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
[provider]
kind = "together"
api_key = "tg-123"
fallback_model = "meta-llama/Llama-3-8b-chat-hf"
prompt = "You are a tiny robot."
temperature = 0.7
streaming = false

[turn]
timeout_secs = 30
fragment_pause_ms = 50
speaking_animation = false
speech_speed = 1.5

[memory]
save_chat = false
max_messages = 8
"#,
        );

        let config = load_config_with(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.backend.provider, Provider::Together);
        assert_eq!(config.backend.api_key.as_deref(), Some("tg-123"));
        assert_eq!(config.effective_model(), "meta-llama/Llama-3-70b-chat-hf");
        let conductor = config.conductor_config();
        assert_eq!(conductor.response.model, "meta-llama/Llama-3-70b-chat-hf");
        assert_eq!(
            conductor.response.fallback_model.as_deref(),
            Some("meta-llama/Llama-3-8b-chat-hf")
        );
        assert_eq!(conductor.response.system_prompt, "You are a tiny robot.");
        assert_eq!(conductor.response.mode, ResponseMode::Batch);
        assert_eq!(conductor.turn_timeout, Duration::from_secs(30));
        assert_eq!(conductor.fragment_pause, Duration::from_millis(50));
        assert!(!conductor.speaking_animation);
        assert!(!conductor.save_chat);
        assert_eq!(conductor.max_history_messages, 8);
        assert_eq!(config.source(), ConfigSource::File);
        assert!(config.validate_provider().is_ok());
    }

    #[test]
    fn test_parse_empty_toml() {
        let file = write_toml("");
        let config = load_config_with(Some(file.path().to_path_buf()), no_env).unwrap();
        assert_eq!(config.effective_model(), "gpt-4o-mini");
        assert_eq!(config.source(), ConfigSource::File);
    }

    #[test]
    fn test_fallback_model_follows_provider() {
        let openai = ConductorConfigFile::default().conductor_config();
        assert_eq!(openai.response.fallback_model.as_deref(), Some("gpt-3.5-turbo"));

        for kind in ["together", "custom"] {
            let file = write_toml(&format!(
                "[provider]\nkind = \"{kind}\"\nendpoint = \"http://localhost:8080/v1\"\n"
            ));
            let config = load_config_with(Some(file.path().to_path_buf()), no_env).unwrap();
            assert_eq!(config.conductor_config().response.fallback_model, None, "{kind}");
        }
    }

    #[test]
    fn test_missing_file_graceful() {
        let path = PathBuf::from("/nonexistent/robot-conductor/conductor.toml");
        let config = load_config_with(Some(path), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_malformed_toml_error() {
        let file = write_toml("[provider\nkind = ");
        let result = load_config_with(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let file = write_toml("[provider]\nkind = \"ollama\"\n");
        let result = load_config_with(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    // =========================================================================
    // Validation Tests
    // =========================================================================

    #[test]
    fn test_max_messages_validation() {
        for bad in [0, 1, 3, 18] {
            let file = write_toml(&format!("[memory]\nmax_messages = {bad}\n"));
            let result = load_config_with(Some(file.path().to_path_buf()), no_env);
            assert!(
                matches!(result, Err(ConfigError::ValidationError(_))),
                "max_messages = {bad} should be rejected"
            );
        }
        let file = write_toml("[memory]\nmax_messages = 2\n");
        assert!(load_config_with(Some(file.path().to_path_buf()), no_env).is_ok());
    }

    #[test]
    fn test_provider_validation() {
        let mut config = ConductorConfigFile::default();
        assert!(config.validate_provider().is_err());

        config.backend.api_key = Some("sk-test".to_string());
        assert!(config.validate_provider().is_ok());

        config.backend.provider = Provider::Custom;
        config.backend.api_key = None;
        assert!(config.validate_provider().is_err());

        config.backend.endpoint = Some("http://localhost:8080/v1".to_string());
        assert!(config.validate_provider().is_ok());
    }

    // =========================================================================
    // Priority Tests
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml("[provider]\nmodel = \"file-model\"\n\n[memory]\nsave_chat = true\n");
        let env: HashMap<&str, &str> = HashMap::from([
            ("ROBOT_CONDUCTOR_MODEL", "env-model"),
            ("ROBOT_CONDUCTOR_SAVE_CHAT", "false"),
            ("ROBOT_CONDUCTOR_STREAMING", "0"),
            ("ROBOT_CONDUCTOR_TURN_TIMEOUT", "45"),
            ("OPENAI_KEY", "sk-env"),
            ("OPENAI_BASE", "http://localhost:1234/v1"),
        ]);

        let config = load_config_with(Some(file.path().to_path_buf()), |key| {
            env.get(key).map(ToString::to_string)
        })
        .unwrap();

        assert_eq!(config.effective_model(), "env-model");
        assert!(!config.conductor.save_chat);
        assert_eq!(config.conductor.response.mode, ResponseMode::Batch);
        assert_eq!(config.conductor.turn_timeout, Duration::from_secs(45));
        assert_eq!(config.backend.api_key.as_deref(), Some("sk-env"));
        assert_eq!(
            config.backend.base_url().as_deref(),
            Some("http://localhost:1234/v1")
        );
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_bad_env_number_ignored() {
        let config = load_config_with(None, |key| {
            (key == "ROBOT_CONDUCTOR_TURN_TIMEOUT").then(|| "soon".to_string())
        })
        .unwrap();
        assert_eq!(config.conductor.turn_timeout, Duration::from_secs(120));
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = load_config_with(None, |key| {
            (key == "ROBOT_CONDUCTOR_MODEL").then(|| "env-model".to_string())
        })
        .unwrap();

        ConfigOverrides::new()
            .with_model("cli-model".to_string())
            .with_mode(ResponseMode::Batch)
            .with_save_chat(false)
            .with_speaking_animation(false)
            .apply(&mut config);

        assert_eq!(config.conductor_config().response.model, "cli-model");
        assert_eq!(config.conductor.response.mode, ResponseMode::Batch);
        assert!(!config.conductor.save_chat);
        assert!(!config.conductor.speaking_animation);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_config_overrides_empty_no_change() {
        let mut config = ConductorConfigFile::default();
        let overrides = ConfigOverrides::new();
        assert!(overrides.is_empty());
        overrides.apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
        assert_eq!(ConfigSource::File.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }
}

//! File and environment configuration for the assistant.
//!
//! Configuration can come from a TOML, YAML, or JSON file, from `DOCENT_*`
//! environment variables, or from a file with environment overrides layered on
//! top. Every section has working defaults, so an empty file is a valid
//! configuration for a local Ollama setup.

use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;

use crate::agent::RoundConfig;
use crate::conversation::WindowConfig;
use crate::gateway::{
    AnthropicConfig, AnthropicGateway, ModelBackend, OllamaConfig, OllamaGateway,
};
use crate::provider::{StdioConfig, Transport, TransportFactory};
use crate::session::{ExpiryPolicy, IdleExpiry, NeverExpire};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable parsing error: {0}")]
    EnvVarParse(String),
    #[error("File parsing error: {0}")]
    FileParse(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level configuration for an assistant process.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocentConfig {
    /// Model gateway selection and tuning
    #[serde(default)]
    pub gateway: GatewaySection,
    /// Sliding-window truncation of conversation history
    #[serde(default)]
    pub conversation: ConversationSection,
    /// Round loop limits
    #[serde(default)]
    pub rounds: RoundSection,
    /// Session lifetime policy
    #[serde(default)]
    pub sessions: SessionSection,
    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingSection,
    /// External tool providers to connect at startup
    #[serde(default)]
    pub providers: Vec<ProviderSection>,
}

/// Which model backend serves completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Anthropic,
    Ollama,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::EnvVarParse(format!(
                "unknown backend '{}' (expected 'anthropic' or 'ollama')",
                other
            ))),
        }
    }
}

/// Model gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySection {
    /// Backend that serves model completions
    #[serde(default)]
    pub backend: BackendKind,
    /// Model identifier passed to the backend
    #[serde(default = "default_model")]
    pub model: String,
    /// Custom endpoint URL; each backend has its own default
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Maximum tokens per model reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature; the backend default applies when unset
    pub temperature: Option<f32>,
}

/// Conversation window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSection {
    /// Truncation triggers once the transcript exceeds this many turns
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Turns kept when truncation triggers
    #[serde(default = "default_retain_turns")]
    pub retain_turns: usize,
}

/// Round loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSection {
    /// Model rounds allowed per user message
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Ceiling on any single model call, in seconds
    #[serde(with = "duration_seconds", default = "default_gateway_timeout")]
    pub gateway_timeout: Duration,
}

/// Session lifetime configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionSection {
    /// Idle time after which a session may be swept, in seconds.
    /// Sessions never expire when unset.
    #[serde(with = "opt_duration_seconds", default)]
    pub expire_after_idle: Option<Duration>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::EnvVarParse(format!(
                "unknown log format '{}' (expected 'text' or 'json')",
                other
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default filter directive, overridable via `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Line format for log output
    #[serde(default)]
    pub format: LogFormat,
    /// Log file path; logs go to stderr when unset
    pub file: Option<PathBuf>,
}

/// How a configured provider is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Websocket,
}

/// One external tool provider.
///
/// Stdio providers need `command` (plus optional `args`, `env`, and
/// `working_dir`); websocket providers need `url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    /// Name used in logs and for prompt/resource routing
    pub name: String,
    /// How the provider process is reached
    pub transport: TransportKind,
    /// Command to spawn (stdio only)
    pub command: Option<String>,
    /// Arguments for the spawned command (stdio only)
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the spawned command (stdio only)
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the spawned command (stdio only)
    pub working_dir: Option<PathBuf>,
    /// Endpoint URL (websocket only)
    pub url: Option<String>,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            backend: BackendKind::Anthropic,
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: None,
        }
    }
}

impl Default for ConversationSection {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            retain_turns: default_retain_turns(),
        }
    }
}

impl Default for RoundSection {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            gateway_timeout: default_gateway_timeout(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

impl DocentConfig {
    /// Load configuration from a file (supports TOML, YAML, JSON)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let extension = path.extension().and_then(|s| s.to_str());

        match extension {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            _ => Err(ConfigError::FileParse(
                "Unsupported file format. Use .toml, .yaml, .yml, or .json".to_string(),
            )),
        }
    }

    /// Load configuration from `DOCENT_*` environment variables.
    ///
    /// Providers cannot be configured through the environment; use a file for
    /// those.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(backend) = env::var("DOCENT_BACKEND") {
            config.gateway.backend = backend.parse()?;
        }
        if let Ok(model) = env::var("DOCENT_MODEL") {
            config.gateway.model = model;
        }
        if let Ok(base_url) = env::var("DOCENT_BASE_URL") {
            config.gateway.base_url = Some(base_url);
        }
        if let Ok(max_tokens) = env::var("DOCENT_MAX_TOKENS") {
            config.gateway.max_tokens = max_tokens
                .parse()
                .map_err(|e| ConfigError::EnvVarParse(format!("DOCENT_MAX_TOKENS: {}", e)))?;
        }
        if let Ok(temperature) = env::var("DOCENT_TEMPERATURE") {
            config.gateway.temperature = Some(
                temperature
                    .parse()
                    .map_err(|e| ConfigError::EnvVarParse(format!("DOCENT_TEMPERATURE: {}", e)))?,
            );
        }

        if let Ok(max_turns) = env::var("DOCENT_MAX_TURNS") {
            config.conversation.max_turns = max_turns
                .parse()
                .map_err(|e| ConfigError::EnvVarParse(format!("DOCENT_MAX_TURNS: {}", e)))?;
        }
        if let Ok(retain_turns) = env::var("DOCENT_RETAIN_TURNS") {
            config.conversation.retain_turns = retain_turns
                .parse()
                .map_err(|e| ConfigError::EnvVarParse(format!("DOCENT_RETAIN_TURNS: {}", e)))?;
        }

        if let Ok(max_rounds) = env::var("DOCENT_MAX_ROUNDS") {
            config.rounds.max_rounds = max_rounds
                .parse()
                .map_err(|e| ConfigError::EnvVarParse(format!("DOCENT_MAX_ROUNDS: {}", e)))?;
        }
        if let Ok(timeout) = env::var("DOCENT_GATEWAY_TIMEOUT") {
            config.rounds.gateway_timeout =
                Duration::from_secs(timeout.parse().map_err(|e| {
                    ConfigError::EnvVarParse(format!("DOCENT_GATEWAY_TIMEOUT: {}", e))
                })?);
        }

        if let Ok(idle) = env::var("DOCENT_SESSION_IDLE_SECS") {
            config.sessions.expire_after_idle =
                Some(Duration::from_secs(idle.parse().map_err(|e| {
                    ConfigError::EnvVarParse(format!("DOCENT_SESSION_IDLE_SECS: {}", e))
                })?));
        }

        if let Ok(level) = env::var("DOCENT_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = env::var("DOCENT_LOG_FORMAT") {
            config.logging.format = format.parse()?;
        }
        if let Ok(file) = env::var("DOCENT_LOG_FILE") {
            config.logging.file = Some(PathBuf::from(file));
        }

        Ok(config)
    }

    /// Merge configuration with environment variable overrides
    pub fn merge_with_env(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;

        if env::var("DOCENT_BACKEND").is_ok() {
            self.gateway.backend = env_config.gateway.backend;
        }
        if env::var("DOCENT_MODEL").is_ok() {
            self.gateway.model = env_config.gateway.model;
        }
        if env::var("DOCENT_BASE_URL").is_ok() {
            self.gateway.base_url = env_config.gateway.base_url;
        }
        if env::var("DOCENT_MAX_TOKENS").is_ok() {
            self.gateway.max_tokens = env_config.gateway.max_tokens;
        }
        if env::var("DOCENT_TEMPERATURE").is_ok() {
            self.gateway.temperature = env_config.gateway.temperature;
        }
        if env::var("DOCENT_MAX_TURNS").is_ok() {
            self.conversation.max_turns = env_config.conversation.max_turns;
        }
        if env::var("DOCENT_RETAIN_TURNS").is_ok() {
            self.conversation.retain_turns = env_config.conversation.retain_turns;
        }
        if env::var("DOCENT_MAX_ROUNDS").is_ok() {
            self.rounds.max_rounds = env_config.rounds.max_rounds;
        }
        if env::var("DOCENT_GATEWAY_TIMEOUT").is_ok() {
            self.rounds.gateway_timeout = env_config.rounds.gateway_timeout;
        }
        if env::var("DOCENT_SESSION_IDLE_SECS").is_ok() {
            self.sessions.expire_after_idle = env_config.sessions.expire_after_idle;
        }
        if env::var("DOCENT_LOG_LEVEL").is_ok() {
            self.logging.level = env_config.logging.level;
        }
        if env::var("DOCENT_LOG_FORMAT").is_ok() {
            self.logging.format = env_config.logging.format;
        }
        if env::var("DOCENT_LOG_FILE").is_ok() {
            self.logging.file = env_config.logging.file;
        }

        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.model.is_empty() {
            return Err(ConfigError::Validation("Model cannot be empty".to_string()));
        }
        if self.gateway.backend == BackendKind::Anthropic && self.gateway.api_key_env.is_empty() {
            return Err(ConfigError::Validation(
                "api_key_env cannot be empty for the anthropic backend".to_string(),
            ));
        }
        if self.gateway.max_tokens == 0 {
            return Err(ConfigError::Validation(
                "Max tokens must be greater than 0".to_string(),
            ));
        }
        if let Some(temperature) = self.gateway.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err(ConfigError::Validation(
                    "Temperature must be between 0.0 and 1.0".to_string(),
                ));
            }
        }

        if self.conversation.retain_turns == 0 {
            return Err(ConfigError::Validation(
                "retain_turns must be greater than 0".to_string(),
            ));
        }
        if self.conversation.retain_turns > self.conversation.max_turns {
            return Err(ConfigError::Validation(
                "retain_turns cannot exceed max_turns".to_string(),
            ));
        }

        if self.rounds.max_rounds == 0 {
            return Err(ConfigError::Validation(
                "max_rounds must be greater than 0".to_string(),
            ));
        }
        if self.rounds.gateway_timeout.as_secs() == 0 {
            return Err(ConfigError::Validation(
                "Gateway timeout must be greater than 0".to_string(),
            ));
        }

        if self.sessions.expire_after_idle == Some(Duration::ZERO) {
            return Err(ConfigError::Validation(
                "Session idle expiry must be greater than 0".to_string(),
            ));
        }

        if self.logging.level.is_empty() {
            return Err(ConfigError::Validation(
                "Log level cannot be empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.is_empty() {
                return Err(ConfigError::Validation(
                    "Provider name cannot be empty".to_string(),
                ));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate provider name '{}'",
                    provider.name
                )));
            }
            provider.validate()?;
        }

        Ok(())
    }
}

impl GatewaySection {
    /// Build the configured model backend.
    ///
    /// The Anthropic backend reads its API key from the environment variable
    /// named by `api_key_env`; the key itself never appears in configuration
    /// files.
    pub fn build_backend(&self) -> Result<Arc<dyn ModelBackend>, ConfigError> {
        match self.backend {
            BackendKind::Anthropic => {
                let api_key = env::var(&self.api_key_env).map_err(|_| {
                    ConfigError::Validation(format!(
                        "Environment variable '{}' is not set",
                        self.api_key_env
                    ))
                })?;
                let mut config = AnthropicConfig::new(api_key, &self.model);
                if let Some(base_url) = &self.base_url {
                    config.base_url = base_url.clone();
                }
                config.max_tokens = self.max_tokens;
                config.temperature = self.temperature;
                Ok(Arc::new(AnthropicGateway::new(config)))
            }
            BackendKind::Ollama => {
                let mut config = OllamaConfig::new(&self.model);
                if let Some(base_url) = &self.base_url {
                    config.base_url = base_url.clone();
                }
                Ok(Arc::new(OllamaGateway::new(config)))
            }
        }
    }
}

impl ConversationSection {
    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            max_turns: self.max_turns,
            retain_turns: self.retain_turns,
        }
    }
}

impl RoundSection {
    pub fn round_config(&self) -> RoundConfig {
        RoundConfig {
            max_rounds: self.max_rounds,
            gateway_timeout: self.gateway_timeout,
        }
    }
}

impl SessionSection {
    /// Expiry policy matching this section.
    pub fn expiry_policy(&self) -> Arc<dyn ExpiryPolicy> {
        match self.expire_after_idle {
            Some(max_idle) => Arc::new(IdleExpiry::new(max_idle)),
            None => Arc::new(NeverExpire),
        }
    }
}

impl ProviderSection {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.transport {
            TransportKind::Stdio => {
                if self.command.as_deref().unwrap_or("").is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "Provider '{}' uses a stdio transport and needs a command",
                        self.name
                    )));
                }
            }
            TransportKind::Websocket => {
                let url = self.url.as_deref().unwrap_or("");
                if url.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "Provider '{}' uses a websocket transport and needs a url",
                        self.name
                    )));
                }
                url::Url::parse(url).map_err(|e| {
                    ConfigError::Validation(format!(
                        "Provider '{}' has an invalid url: {}",
                        self.name, e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Build the transport this section describes.
    ///
    /// Call [`DocentConfig::validate`] first; missing per-kind fields fall
    /// back to empty strings here.
    pub fn to_transport(&self) -> Box<dyn Transport> {
        match self.transport {
            TransportKind::Stdio => TransportFactory::stdio(StdioConfig {
                command: self.command.clone().unwrap_or_default(),
                args: self.args.clone(),
                env: self.env.clone(),
                working_dir: self.working_dir.clone(),
            }),
            TransportKind::Websocket => {
                TransportFactory::websocket(self.url.clone().unwrap_or_default())
            }
        }
    }
}

/// Custom serialization for Duration as seconds
mod duration_seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Custom serialization for Option<Duration> as seconds
mod opt_duration_seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

// Default value functions for serde
fn default_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_turns() -> usize {
    10
}

fn default_retain_turns() -> usize {
    9
}

fn default_max_rounds() -> u32 {
    12
}

fn default_gateway_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = DocentConfig::default();
        assert_eq!(config.gateway.backend, BackendKind::Anthropic);
        assert_eq!(config.gateway.model, "claude-3-5-sonnet-20241022");
        assert_eq!(config.gateway.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(config.conversation.max_turns, 10);
        assert_eq!(config.conversation.retain_turns, 9);
        assert_eq!(config.rounds.max_rounds, 12);
        assert_eq!(config.rounds.gateway_timeout, Duration::from_secs(120));
        assert!(config.sessions.expire_after_idle.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.providers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = DocentConfig::default();
        config.conversation.retain_turns = 0;
        assert!(config.validate().is_err());

        let mut config = DocentConfig::default();
        config.conversation.retain_turns = config.conversation.max_turns + 1;
        assert!(config.validate().is_err());

        let mut config = DocentConfig::default();
        config.gateway.temperature = Some(1.5);
        assert!(config.validate().is_err());

        let mut config = DocentConfig::default();
        config.providers.push(ProviderSection {
            name: "notes".to_string(),
            transport: TransportKind::Websocket,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            url: None,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("needs a url"));

        config.providers[0].url = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.providers[0].url = Some("ws://localhost:9001/rpc".to_string());
        assert!(config.validate().is_ok());

        // A second provider with the same name is rejected.
        let duplicate = config.providers[0].clone();
        config.providers.push(duplicate);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate provider name"));
    }

    #[test]
    fn test_toml_config_loading() {
        let toml_content = r#"
[gateway]
backend = "anthropic"
model = "claude-3-5-haiku-20241022"
max_tokens = 2048
temperature = 0.2

[conversation]
max_turns = 20
retain_turns = 15

[rounds]
max_rounds = 6
gateway_timeout = 60

[sessions]
expire_after_idle = 900

[logging]
level = "debug"
format = "json"

[[providers]]
name = "notes"
transport = "stdio"
command = "python3"
args = ["-m", "notes_server"]

[[providers]]
name = "graph"
transport = "websocket"
url = "ws://localhost:9001/rpc"
"#;

        let temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        std::fs::write(temp_file.path(), toml_content).unwrap();

        let config = DocentConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.gateway.model, "claude-3-5-haiku-20241022");
        assert_eq!(config.gateway.max_tokens, 2048);
        assert_eq!(config.gateway.temperature, Some(0.2));
        assert_eq!(config.conversation.max_turns, 20);
        assert_eq!(config.rounds.max_rounds, 6);
        assert_eq!(config.rounds.gateway_timeout, Duration::from_secs(60));
        assert_eq!(
            config.sessions.expire_after_idle,
            Some(Duration::from_secs(900))
        );
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].name, "notes");
        assert_eq!(config.providers[0].transport, TransportKind::Stdio);
        assert_eq!(config.providers[0].command.as_deref(), Some("python3"));
        assert_eq!(config.providers[0].args, vec!["-m", "notes_server"]);
        assert_eq!(config.providers[1].transport, TransportKind::Websocket);
        assert_eq!(
            config.providers[1].url.as_deref(),
            Some("ws://localhost:9001/rpc")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_config_loading() {
        let yaml_content = r#"
gateway:
  backend: ollama
  model: "llama3.1:8b"
providers:
  - name: notes
    transport: stdio
    command: ./notes-server
"#;

        let temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        std::fs::write(temp_file.path(), yaml_content).unwrap();

        let config = DocentConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.gateway.backend, BackendKind::Ollama);
        assert_eq!(config.gateway.model, "llama3.1:8b");
        assert_eq!(config.conversation.max_turns, 10);
        assert_eq!(config.providers[0].command.as_deref(), Some("./notes-server"));
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let temp_file = NamedTempFile::with_suffix(".ini").unwrap();
        std::fs::write(temp_file.path(), "gateway=none").unwrap();

        let err = DocentConfig::from_file(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported file format"));
    }

    #[test]
    fn test_env_var_loading() {
        env::set_var("DOCENT_BACKEND", "ollama");
        env::set_var("DOCENT_MODEL", "llama3.1:8b");
        env::set_var("DOCENT_MAX_ROUNDS", "3");

        let config = DocentConfig::from_env().unwrap();
        assert_eq!(config.gateway.backend, BackendKind::Ollama);
        assert_eq!(config.gateway.model, "llama3.1:8b");
        assert_eq!(config.rounds.max_rounds, 3);

        // Clean up
        env::remove_var("DOCENT_BACKEND");
        env::remove_var("DOCENT_MODEL");
        env::remove_var("DOCENT_MAX_ROUNDS");
    }

    #[test]
    fn test_merge_with_env() {
        env::set_var("DOCENT_LOG_LEVEL", "trace");
        env::set_var("DOCENT_GATEWAY_TIMEOUT", "30");

        let mut config = DocentConfig::default();
        config.gateway.model = "from-file".to_string();
        let merged = config.merge_with_env().unwrap();

        assert_eq!(merged.logging.level, "trace");
        assert_eq!(merged.rounds.gateway_timeout, Duration::from_secs(30));
        // Values without an override keep the file setting.
        assert_eq!(merged.gateway.model, "from-file");

        // Clean up
        env::remove_var("DOCENT_LOG_LEVEL");
        env::remove_var("DOCENT_GATEWAY_TIMEOUT");
    }

    #[test]
    fn test_build_backend_reads_key_from_env() {
        let mut section = GatewaySection::default();
        section.api_key_env = "DOCENT_CONFIG_TEST_KEY".to_string();
        section.model = "claude-3-5-haiku-20241022".to_string();

        let err = section.build_backend().unwrap_err();
        assert!(err.to_string().contains("DOCENT_CONFIG_TEST_KEY"));

        env::set_var("DOCENT_CONFIG_TEST_KEY", "sk-test");
        let backend = section.build_backend().unwrap();
        assert_eq!(backend.model_id(), "claude-3-5-haiku-20241022");
        env::remove_var("DOCENT_CONFIG_TEST_KEY");
    }

    #[test]
    fn test_build_ollama_backend_needs_no_key() {
        let section = GatewaySection {
            backend: BackendKind::Ollama,
            model: "llama3.1:8b".to_string(),
            ..GatewaySection::default()
        };
        let backend = section.build_backend().unwrap();
        assert_eq!(backend.model_id(), "llama3.1:8b");
    }

    #[test]
    fn test_provider_section_builds_transport() {
        let section = ProviderSection {
            name: "notes".to_string(),
            transport: TransportKind::Stdio,
            command: Some("python3".to_string()),
            args: vec!["-m".to_string(), "notes_server".to_string()],
            env: HashMap::new(),
            working_dir: None,
            url: None,
        };
        assert_eq!(section.to_transport().endpoint(), "python3 -m notes_server");

        let section = ProviderSection {
            name: "graph".to_string(),
            transport: TransportKind::Websocket,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            url: Some("ws://localhost:9001/rpc".to_string()),
        };
        assert_eq!(section.to_transport().endpoint(), "ws://localhost:9001/rpc");
    }

    #[test]
    fn test_section_conversions_match_runtime_defaults() {
        let config = DocentConfig::default();
        let window = config.conversation.window_config();
        assert_eq!(window.max_turns, WindowConfig::default().max_turns);
        assert_eq!(window.retain_turns, WindowConfig::default().retain_turns);

        let round = config.rounds.round_config();
        assert_eq!(round.max_rounds, RoundConfig::default().max_rounds);
        assert_eq!(
            round.gateway_timeout,
            RoundConfig::default().gateway_timeout
        );
    }
}

//! TOML Configuration File Support
//!
//! Centralized configuration loading for the relay, built once at start-up
//! and shared read-only by every request. The configuration file lives at
//! `~/.config/convoscribe/relay.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (see [`ConfigOverrides`])
//! 2. Environment variables (a `.env` file is honoured by the daemon)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:5000"
//! static_dir = "/srv/convoscribe/client"
//!
//! [ollama]
//! endpoint = "http://gpu-box:11434"
//! text_models = ["llama3.1:8b"]
//! vision_models = ["llava:latest", "llava:13b"]
//! summary_model = "gemma3:latest"
//! explanation_model = "llama3.1:8b"
//!
//! [openai]
//! api_key = "sk-..."
//! vision_model = "gpt-4o"
//! text_model = "gpt-4o-mini"
//!
//! [prompt]
//! text_window = 20
//! vision_window = 16
//! vision_max_chars = 200
//!
//! [timeouts]
//! text_secs = 180
//! vision_secs = 300
//! transcript_secs = 300
//!
//! [transcript]
//! languages = ["en", "en-US", "en-GB"]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{DEFAULT_OLLAMA_ENDPOINT, DEFAULT_OPENAI_BASE_URL};
use crate::messages::Modality;
use crate::prompt::PromptConfig;
use crate::transcript::DEFAULT_LANGUAGES;

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

/// Tracks where the highest-priority configuration value came from
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

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Listen address, e.g. `127.0.0.1:5000`
    pub bind: Option<String>,

    /// Directory holding the built web client
    pub static_dir: Option<PathBuf>,
}

/// Ollama section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaToml {
    /// Base URL of the Ollama server
    pub endpoint: Option<String>,

    /// Text chat models, in fallback order
    pub text_models: Option<Vec<String>>,

    /// Vision chat models, in fallback order
    pub vision_models: Option<Vec<String>>,

    /// Model used for transcript summaries
    pub summary_model: Option<String>,

    /// Model used for transcript explanations
    pub explanation_model: Option<String>,
}

/// OpenAI section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiToml {
    /// API key; the cloud fallback is disabled without one
    pub api_key: Option<String>,

    /// API root for OpenAI-compatible servers
    pub base_url: Option<String>,

    /// Model used for image requests
    pub vision_model: Option<String>,

    /// Model used for transcript workflows
    pub text_model: Option<String>,
}

/// Prompt section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptToml {
    /// History messages kept for text prompts
    pub text_window: Option<usize>,

    /// History messages kept for vision prompts
    pub vision_window: Option<usize>,

    /// Characters kept per history message in vision prompts
    pub vision_max_chars: Option<usize>,

    /// Replacement preamble for text prompts
    pub text_preamble: Option<String>,

    /// Replacement preamble for vision prompts
    pub vision_preamble: Option<String>,
}

/// Timeout section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsToml {
    /// Text chat timeout in seconds
    pub text_secs: Option<u64>,

    /// Vision chat timeout in seconds
    pub vision_secs: Option<u64>,

    /// Summary/explanation timeout in seconds
    pub transcript_secs: Option<u64>,
}

/// Transcript section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptToml {
    /// Accepted caption languages, in preference order
    pub languages: Option<Vec<String>>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayToml {
    /// Server section
    pub server: ServerToml,

    /// Ollama section
    pub ollama: OllamaToml,

    /// OpenAI section
    pub openai: OpenAiToml,

    /// Prompt section
    pub prompt: PromptToml,

    /// Timeouts section
    pub timeouts: TimeoutsToml,

    /// Transcript section
    pub transcript: TranscriptToml,
}

// =============================================================================
// Resolved Settings
// =============================================================================

/// HTTP server settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSettings {
    /// Listen address
    pub bind_addr: String,
    /// Directory of static client files, if any
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            static_dir: None,
        }
    }
}

/// Local Ollama settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OllamaSettings {
    /// Base URL (no `/api/...` suffix)
    pub endpoint: String,
    /// Text chat models, in fallback order
    pub text_models: Vec<String>,
    /// Vision chat models, in fallback order
    pub vision_models: Vec<String>,
    /// Summary model
    pub summary_model: String,
    /// Explanation model
    pub explanation_model: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
            text_models: vec!["llama3.1:8b".to_string()],
            vision_models: vec![
                "llava:latest".to_string(),
                "llava:13b".to_string(),
                "llava:7b".to_string(),
                "llava-llama3:latest".to_string(),
            ],
            summary_model: "gemma3:latest".to_string(),
            explanation_model: "llama3.1:8b".to_string(),
        }
    }
}

/// Cloud OpenAI settings
#[derive(Clone, PartialEq, Eq)]
pub struct OpenAiSettings {
    /// API key; `None` disables the cloud fallback
    pub api_key: Option<String>,
    /// API root
    pub base_url: String,
    /// Vision model
    pub vision_model: String,
    /// Text model for transcript workflows
    pub text_model: String,
}

impl std::fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("vision_model", &self.vision_model)
            .field("text_model", &self.text_model)
            .finish()
    }
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            vision_model: "gpt-4o".to_string(),
            text_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Per-call backend timeouts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutSettings {
    /// Text chat
    pub text: Duration,
    /// Vision chat
    pub vision: Duration,
    /// Summary/explanation
    pub transcript: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            text: Duration::from_secs(180),
            vision: Duration::from_secs(300),
            transcript: Duration::from_secs(300),
        }
    }
}

impl TimeoutSettings {
    /// Chat timeout for a modality
    #[must_use]
    pub fn for_modality(&self, modality: Modality) -> Duration {
        match modality {
            Modality::Text => self.text,
            Modality::Vision => self.vision,
        }
    }
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the relay
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// HTTP server
    pub server: ServerSettings,

    /// Local Ollama backend
    pub ollama: OllamaSettings,

    /// Cloud OpenAI backend
    pub openai: OpenAiSettings,

    /// Prompt rendering
    pub prompt: PromptConfig,

    /// Backend timeouts
    pub timeouts: TimeoutSettings,

    /// Accepted caption languages, in preference order
    pub transcript_languages: Vec<String>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            ollama: OllamaSettings::default(),
            openai: OpenAiSettings::default(),
            prompt: PromptConfig::default(),
            timeouts: TimeoutSettings::default(),
            transcript_languages: DEFAULT_LANGUAGES.iter().map(ToString::to_string).collect(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl RelayConfig {
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

    /// Check values that would make the relay unusable
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(message: &str) -> Result<(), ConfigError> {
            Err(ConfigError::ValidationError(message.to_string()))
        }

        if self.prompt.text_window == 0 || self.prompt.vision_window == 0 {
            return invalid("prompt windows must be greater than zero");
        }
        if self.prompt.vision_max_chars == 0 {
            return invalid("prompt.vision_max_chars must be greater than zero");
        }
        if self.ollama.endpoint.trim().is_empty() {
            return invalid("ollama.endpoint must not be empty");
        }
        if self.ollama.text_models.is_empty() {
            return invalid("ollama.text_models must list at least one model");
        }
        if self.ollama.vision_models.is_empty() && self.openai.api_key.is_none() {
            tracing::warn!("No vision models configured; image requests will be rejected");
        }
        if self.timeouts.text.is_zero()
            || self.timeouts.vision.is_zero()
            || self.timeouts.transcript.is_zero()
        {
            return invalid("timeouts must be greater than zero");
        }
        if self.transcript_languages.is_empty() {
            return invalid("transcript.languages must list at least one language");
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/convoscribe/relay.toml` or
/// `~/.config/convoscribe/relay.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("convoscribe").join("relay.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<RelayConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<RelayConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration from a specific path and an explicit environment lookup
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<RelayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Start with defaults
    let mut config = RelayConfig::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: RelayToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
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

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config, env);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut RelayConfig, toml: RelayToml) {
    // Server settings
    if let Some(bind) = toml.server.bind {
        config.server.bind_addr = bind;
    }
    if toml.server.static_dir.is_some() {
        config.server.static_dir = toml.server.static_dir;
    }

    // Ollama settings
    if let Some(endpoint) = toml.ollama.endpoint {
        config.ollama.endpoint = normalize_ollama_endpoint(&endpoint);
    }
    if let Some(models) = toml.ollama.text_models {
        config.ollama.text_models = models;
    }
    if let Some(models) = toml.ollama.vision_models {
        config.ollama.vision_models = models;
    }
    if let Some(model) = toml.ollama.summary_model {
        config.ollama.summary_model = model;
    }
    if let Some(model) = toml.ollama.explanation_model {
        config.ollama.explanation_model = model;
    }

    // OpenAI settings
    if let Some(key) = toml.openai.api_key.filter(|k| !k.trim().is_empty()) {
        config.openai.api_key = Some(key);
    }
    if let Some(base_url) = toml.openai.base_url {
        config.openai.base_url = base_url;
    }
    if let Some(model) = toml.openai.vision_model {
        config.openai.vision_model = model;
    }
    if let Some(model) = toml.openai.text_model {
        config.openai.text_model = model;
    }

    // Prompt settings
    if let Some(window) = toml.prompt.text_window {
        config.prompt.text_window = window;
    }
    if let Some(window) = toml.prompt.vision_window {
        config.prompt.vision_window = window;
    }
    if let Some(max_chars) = toml.prompt.vision_max_chars {
        config.prompt.vision_max_chars = max_chars;
    }
    if let Some(preamble) = toml.prompt.text_preamble {
        config.prompt.text_preamble = preamble;
    }
    if let Some(preamble) = toml.prompt.vision_preamble {
        config.prompt.vision_preamble = preamble;
    }

    // Timeouts
    if let Some(secs) = toml.timeouts.text_secs {
        config.timeouts.text = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.timeouts.vision_secs {
        config.timeouts.vision = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.timeouts.transcript_secs {
        config.timeouts.transcript = Duration::from_secs(secs);
    }

    // Transcript settings
    if let Some(languages) = toml.transcript.languages {
        config.transcript_languages = languages;
    }
}

/// Port Ollama listens on unless told otherwise
const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut RelayConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    // Ollama endpoint: full URL first, then host/port pair
    if let Some(url) = var("OLLAMA_API_URL") {
        config.ollama.endpoint = normalize_ollama_endpoint(&url);
        config.source = ConfigSource::Env;
    } else if var("OLLAMA_HOST").is_some() || var("OLLAMA_PORT").is_some() {
        let host = var("OLLAMA_HOST").unwrap_or_else(|| "localhost".to_string());
        let port: u16 = var("OLLAMA_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_OLLAMA_PORT);
        config.ollama.endpoint = ollama_endpoint_from_host(&host, port);
        config.source = ConfigSource::Env;
    }

    // OpenAI settings from environment
    if let Some(key) = var("OPENAI_API_KEY") {
        config.openai.api_key = Some(key);
        config.source = ConfigSource::Env;
    }
    if let Some(base_url) = var("OPENAI_BASE_URL") {
        config.openai.base_url = base_url;
        config.source = ConfigSource::Env;
    }

    // Server settings from environment
    if let Some(bind) = var("RELAY_BIND") {
        config.server.bind_addr = bind;
        config.source = ConfigSource::Env;
    }
    if let Some(dir) = var("RELAY_STATIC_DIR") {
        config.server.static_dir = Some(PathBuf::from(dir));
        config.source = ConfigSource::Env;
    }
}

/// Build an endpoint from `OLLAMA_HOST`; `port` is used only when the host has none
///
/// Accepts `host`, `host:port` and `scheme://host[:port][/path]`.
fn ollama_endpoint_from_host(host: &str, port: u16) -> String {
    let host = host.trim();
    let (scheme, rest) = host.split_once("://").unwrap_or(("http", host));
    let (authority, path) = rest.find('/').map_or((rest, ""), |i| rest.split_at(i));

    let has_port = authority
        .rsplit_once(':')
        .is_some_and(|(_, p)| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));

    let url = if has_port {
        format!("{scheme}://{authority}{path}")
    } else {
        format!("{scheme}://{authority}:{port}{path}")
    };
    normalize_ollama_endpoint(&url)
}

/// Accept either a base URL or a full `/api/generate` URL
fn normalize_ollama_endpoint(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix("/api/generate")
        .unwrap_or(url)
        .trim_end_matches('/')
        .to_string()
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Command-line overrides, applied last
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Listen address override
    pub bind_addr: Option<String>,

    /// Static directory override
    pub static_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set listen address override
    #[must_use]
    pub fn with_bind_addr(mut self, bind_addr: String) -> Self {
        self.bind_addr = Some(bind_addr);
        self
    }

    /// Set static directory override
    #[must_use]
    pub fn with_static_dir(mut self, dir: PathBuf) -> Self {
        self.static_dir = Some(dir);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut RelayConfig) {
        if self.bind_addr.is_some() || self.static_dir.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref bind_addr) = self.bind_addr {
            config.server.bind_addr = bind_addr.clone();
        }

        if let Some(ref dir) = self.static_dir {
            config.server.static_dir = Some(dir.clone());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Configuration management for chatcast-responder
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (`--api-url`, `--api-key`, `--port`)
//! 2. Environment variables (`CHATCAST_API_URL`, `CHATCAST_API_KEY`, `CHATCAST_PORT`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! Items 1 and 2 are merged by clap before reaching [`ResponderConfig::apply_overrides`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the TOML file
pub const CONFIG_ENV_VAR: &str = "CHATCAST_CONFIG";

/// Complete responder configuration, as stored in `chatcast.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponderConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Conversational backend connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Streaming chat endpoint, e.g. `http://localhost/v1/chat-messages`
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer credential
    #[serde(default)]
    pub api_key: String,

    /// Whole-stream deadline for one answer request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deadline for one audio resource download
    #[serde(default = "default_audio_fetch_timeout_secs")]
    pub audio_fetch_timeout_secs: u64,
}

/// Comment admission and answer generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Per-comment wall-clock budget covering request and audio fetch
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Warm-up window measured from the first comment; 0 disables
    #[serde(default = "default_cold_start_secs")]
    pub cold_start_secs: u64,

    /// Comments starting with any of these are never answered
    #[serde(default = "default_suppress_prefixes")]
    pub suppress_prefixes: Vec<String>,

    /// Request queue depth limit; 0 means unbounded
    #[serde(default)]
    pub max_pending_requests: usize,

    /// Carry the backend conversation id from one answer to the next
    #[serde(default)]
    pub keep_conversation: bool,

    /// Author name used when a comment has none
    #[serde(default = "default_author_name")]
    pub default_author_name: String,
}

/// Timing between playback units and chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_gap_before_unit_ms")]
    pub gap_before_unit_ms: u64,

    #[serde(default)]
    pub gap_between_chunks_ms: u64,

    #[serde(default = "default_gap_after_unit_ms")]
    pub gap_after_unit_ms: u64,
}

/// HTTP control API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Event bus capacity for SSE subscribers
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_api_url() -> String {
    "http://localhost/v1/chat-messages".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_audio_fetch_timeout_secs() -> u64 {
    60
}

fn default_task_timeout_secs() -> u64 {
    60
}

fn default_cold_start_secs() -> u64 {
    10
}

fn default_suppress_prefixes() -> Vec<String> {
    vec!["#".to_string(), "＃".to_string()]
}

fn default_author_name() -> String {
    "anonymous".to_string()
}

fn default_gap_before_unit_ms() -> u64 {
    1000
}

fn default_gap_after_unit_ms() -> u64 {
    2000
}

fn default_port() -> u16 {
    5780
}

fn default_event_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            audio_fetch_timeout_secs: default_audio_fetch_timeout_secs(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: default_task_timeout_secs(),
            cold_start_secs: default_cold_start_secs(),
            suppress_prefixes: default_suppress_prefixes(),
            max_pending_requests: 0,
            keep_conversation: false,
            default_author_name: default_author_name(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            gap_before_unit_ms: default_gap_before_unit_ms(),
            gap_between_chunks_ms: 0,
            gap_after_unit_ms: default_gap_after_unit_ms(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn audio_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.audio_fetch_timeout_secs)
    }

    /// Reject a blank credential or an endpoint that is not an absolute http(s) URL
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Configuration("backend.api_key is empty".to_string()));
        }

        let url = reqwest::Url::parse(self.api_url.trim()).map_err(|e| {
            Error::Configuration(format!("backend.api_url '{}' is invalid: {}", self.api_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(Error::Configuration(format!(
                "backend.api_url '{}' must be an absolute http(s) URL",
                self.api_url
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(Error::Configuration(
                "backend.request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl PipelineConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn cold_start(&self) -> Duration {
        Duration::from_secs(self.cold_start_secs)
    }
}

impl PlaybackConfig {
    pub fn gap_before_unit(&self) -> Duration {
        Duration::from_millis(self.gap_before_unit_ms)
    }

    pub fn gap_between_chunks(&self) -> Duration {
        Duration::from_millis(self.gap_between_chunks_ms)
    }

    pub fn gap_after_unit(&self) -> Duration {
        Duration::from_millis(self.gap_after_unit_ms)
    }
}

/// Values taken from the command line (or their `env =` fallbacks)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

impl ResponderConfig {
    /// Load the TOML file (missing file means defaults) and apply overrides
    pub fn load(path: &Path, overrides: &CliOverrides) -> Result<Self> {
        let mut config: ResponderConfig = chatcast_common::config::load_toml_or_default(path)?;
        config.apply_overrides(overrides);
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(url) = &overrides.api_url {
            self.backend.api_url = url.clone();
        }
        if let Some(key) = &overrides.api_key {
            self.backend.api_key = key.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Full validation, run once at startup
    pub fn validate(&self) -> Result<()> {
        self.backend.validate()?;

        if self.pipeline.task_timeout_secs == 0 {
            return Err(Error::Configuration(
                "pipeline.task_timeout_secs must be positive".to_string(),
            ));
        }
        if self.pipeline.suppress_prefixes.iter().any(|p| p.is_empty()) {
            return Err(Error::Configuration(
                "pipeline.suppress_prefixes must not contain empty strings".to_string(),
            ));
        }
        if self.server.event_capacity == 0 {
            return Err(Error::Configuration(
                "server.event_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

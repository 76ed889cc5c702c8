//! Configuration loading, validation, and management for StreamGate.
//!
//! Loads configuration from `~/.streamgate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use streamgate_core::UserPolicy;

/// The root configuration structure.
///
/// Maps directly to `~/.streamgate/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream inference server settings
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Gateway HTTP server settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Memory engine settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Stream pattern detector tunables
    #[serde(default)]
    pub detector: DetectorConfig,

    /// Turn orchestrator tunables
    #[serde(default)]
    pub agent: AgentConfig,

    /// MCP tool server settings
    #[serde(default)]
    pub mcp: McpConfig,

    /// Per-user policy overrides, keyed by the opaque user id
    #[serde(default)]
    pub users: HashMap<String, UserPolicy>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the OpenAI-compatible inference server.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token for the upstream server, if it requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// "standard" (chat/completions) or "stateful" (input + previous_response_id).
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Default model when a request names none.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Request timeout for non-streaming calls, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:1234".into()
}
fn default_mode() -> String {
    "standard".into()
}
fn default_model() -> String {
    "local-model".into()
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_token: None,
            mode: default_mode(),
            default_model: default_model(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl UpstreamConfig {
    /// Endpoint with a trailing `/` and a pasted `/v1` suffix removed, so
    /// path joining never doubles the version segment.
    pub fn normalized_endpoint(&self) -> String {
        normalize_endpoint(&self.endpoint)
    }

    /// Token with a pasted `Bearer ` prefix stripped. A masked placeholder
    /// (all `*`) counts as absent.
    pub fn effective_token(&self) -> Option<String> {
        self.api_token.as_deref().and_then(normalize_token)
    }

    pub fn is_stateful(&self) -> bool {
        self.mode == "stateful"
    }
}

/// Strip a trailing `/` and `/v1` suffix from a configured endpoint.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let mut e = endpoint.trim().trim_end_matches('/').to_string();
    if let Some(stripped) = e.strip_suffix("/v1") {
        e = stripped.to_string();
    }
    e
}

/// Strip a pasted `Bearer ` prefix; reject masked placeholders like `****`.
pub fn normalize_token(token: &str) -> Option<String> {
    let t = token.trim();
    let t = t.strip_prefix("Bearer ").unwrap_or(t).trim();
    if t.is_empty() || t.chars().all(|c| c == '*') {
        return None;
    }
    Some(t.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    3117
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Whether the memory engine runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root directory for per-user memory files. Defaults to
    /// `~/.streamgate/memory`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Delay before the background worker's first pass, in seconds.
    #[serde(default = "default_worker_initial_delay")]
    pub worker_initial_delay_secs: u64,

    /// Interval between worker passes, in seconds.
    #[serde(default = "default_worker_interval")]
    pub worker_interval_secs: u64,

    /// Consolidate a profile document once it grows past this many bytes.
    #[serde(default = "default_consolidation_threshold")]
    pub consolidation_threshold_bytes: u64,

    /// Characters of memory summary injected into the system prompt.
    #[serde(default = "default_preload_limit")]
    pub preload_char_limit: usize,
}

fn default_worker_initial_delay() -> u64 {
    10
}
fn default_worker_interval() -> u64 {
    180
}
fn default_consolidation_threshold() -> u64 {
    5000
}
fn default_preload_limit() -> usize {
    10_000
}
fn default_true() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: None,
            worker_initial_delay_secs: default_worker_initial_delay(),
            worker_interval_secs: default_worker_interval(),
            consolidation_threshold_bytes: default_consolidation_threshold(),
            preload_char_limit: default_preload_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Stop buffering a suspected tool call once this many chars accumulate.
    #[serde(default = "default_buffer_threshold")]
    pub buffer_threshold: usize,

    /// Where learned per-model patterns are persisted. Defaults to
    /// `~/.streamgate/learned_patterns.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns_path: Option<PathBuf>,
}

fn default_buffer_threshold() -> usize {
    8000
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            buffer_threshold: default_buffer_threshold(),
            patterns_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on model turns per client request.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Keep only this many trailing messages (plus a leading system message).
    #[serde(default = "default_history_keep")]
    pub history_keep: usize,
}

fn default_max_turns() -> usize {
    10
}
fn default_history_keep() -> usize {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            history_keep: default_history_keep(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Integration id advertised to the upstream server so it can call
    /// back into the gateway's tool endpoint.
    #[serde(default = "default_integration_id")]
    pub integration_id: String,
}

fn default_integration_id() -> String {
    "streamgate-tools".into()
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            integration_id: default_integration_id(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("upstream", &self.upstream)
            .field("gateway", &self.gateway)
            .field("memory", &self.memory)
            .field("detector", &self.detector)
            .field("agent", &self.agent)
            .field("mcp", &self.mcp)
            .field("users", &self.users.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("endpoint", &self.endpoint)
            .field("api_token", &redact(&self.api_token))
            .field("mode", &self.mode)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.streamgate/config.toml).
    ///
    /// Environment variable overrides:
    /// - `STREAMGATE_ENDPOINT`
    /// - `STREAMGATE_API_TOKEN`
    /// - `STREAMGATE_PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(endpoint) = std::env::var("STREAMGATE_ENDPOINT") {
            config.upstream.endpoint = endpoint;
        }
        if let Ok(token) = std::env::var("STREAMGATE_API_TOKEN") {
            config.upstream.api_token = Some(token);
        }
        if let Ok(port) = std::env::var("STREAMGATE_PORT") {
            config.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("STREAMGATE_PORT is not a port: {port}"))
            })?;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".streamgate")
    }

    /// Root directory for per-user memory files.
    pub fn memory_dir(&self) -> PathBuf {
        self.memory
            .data_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("memory"))
    }

    /// Path for the learned-pattern store.
    pub fn patterns_path(&self) -> PathBuf {
        self.detector
            .patterns_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("learned_patterns.json"))
    }

    /// Policy for a user, falling back to the defaults.
    pub fn policy_for(&self, user_id: &str) -> UserPolicy {
        self.users.get(user_id).cloned().unwrap_or(UserPolicy {
            memory_enabled: self.memory.enabled,
            ..Default::default()
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.upstream.mode.as_str() {
            "standard" | "stateful" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "upstream.mode must be \"standard\" or \"stateful\", got \"{other}\""
                )))
            }
        }
        if self.detector.buffer_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "detector.buffer_threshold must be > 0".into(),
            ));
        }
        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            gateway: GatewayConfig::default(),
            memory: MemoryConfig::default(),
            detector: DetectorConfig::default(),
            agent: AgentConfig::default(),
            mcp: McpConfig::default(),
            users: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

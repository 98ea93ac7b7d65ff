//! Configuration types for sentinel

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Knowledge store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite state file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Entity time-to-live in seconds (entities not updated within this
    /// window are pruned)
    #[serde(default = "default_entity_ttl")]
    pub entity_ttl_secs: u64,
    /// Prune after this many upserted entities
    #[serde(default = "default_prune_every_inserts")]
    pub prune_every_inserts: u64,
    /// Prune at least this often regardless of insert volume
    #[serde(default = "default_prune_every_secs")]
    pub prune_every_secs: u64,
}

fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sentinel")
        .join("state.db")
}

fn default_entity_ttl() -> u64 {
    3600
}

fn default_prune_every_inserts() -> u64 {
    1000
}

fn default_prune_every_secs() -> u64 {
    600
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            entity_ttl_secs: default_entity_ttl(),
            prune_every_inserts: default_prune_every_inserts(),
            prune_every_secs: default_prune_every_secs(),
        }
    }
}

/// Runtime selection and container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Name of the tools container probed for container mode
    #[serde(default = "default_container_name")]
    pub container_name: String,
    /// Output directory mounted inside the container
    #[serde(default = "default_container_output")]
    pub container_output_dir: PathBuf,
    /// Seconds the runtime probe result stays cached
    #[serde(default = "default_probe_ttl")]
    pub probe_ttl_secs: u64,
    /// Temp root for native-mode session logs and scratch files
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,
}

fn default_container_name() -> String {
    "sentinel-tools".to_string()
}

fn default_container_output() -> PathBuf {
    PathBuf::from("/app/output")
}

fn default_probe_ttl() -> u64 {
    60
}

fn default_temp_root() -> PathBuf {
    std::env::temp_dir().join("sentinel")
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            container_name: default_container_name(),
            container_output_dir: default_container_output(),
            probe_ttl_secs: default_probe_ttl(),
            temp_root: default_temp_root(),
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrently running tool invocations
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Per-invocation wall-clock timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Per-stream raw output cap in bytes; further bytes are truncated
    /// with a marker line
    #[serde(default = "default_output_cap")]
    pub output_cap_bytes: u64,
    /// Lines buffered per invocation for the UI forwarder before
    /// head-trimming
    #[serde(default = "default_line_buffer")]
    pub line_buffer: usize,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_timeout() -> u64 {
    600
}

fn default_output_cap() -> u64 {
    100 * 1024 * 1024
}

fn default_line_buffer() -> usize {
    10_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_timeout(),
            output_cap_bytes: default_output_cap(),
            line_buffer: default_line_buffer(),
        }
    }
}

/// Intent resolver provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_provider_url")]
    pub base_url: String,
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,
    /// API key; `${VAR}` is expanded from the environment
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_provider_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_model() -> String {
    "whiterabbitneo".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            model: default_model(),
            api_key: None,
        }
    }
}

/// Complete sentinel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl SentinelConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> crate::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from default locations with cascade:
    /// 1. ./sentinel.toml (local override)
    /// 2. ~/.sentinel/config.toml (global defaults)
    /// 3. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(config) = Self::from_file("sentinel.toml") {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let global_path = home.join(".sentinel").join("config.toml");
            if let Ok(config) = Self::from_file(&global_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Expand `${VAR}` environment references in secret fields
    pub fn expand_env_vars(&mut self) {
        if let Some(ref key) = self.provider.api_key {
            if key.starts_with("${") && key.ends_with('}') {
                let var_name = &key[2..key.len() - 1];
                if let Ok(value) = std::env::var(var_name) {
                    self.provider.api_key = Some(value);
                }
            }
        }
    }
}

//! Configuration loading, validation, and management for sqlsentry.
//!
//! Loads configuration from `~/.sqlsentry/config.toml` with environment
//! variable overrides. Validates all settings at startup — in particular the
//! iteration ceiling and the SQL complexity limits must be positive, since a
//! zero ceiling would make every turn terminate on the safety fallback and a
//! zero join limit would reject every joined query.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.sqlsentry/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// LLM backend configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Turn loop configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// SQL validator limits
    #[serde(default)]
    pub sql: SqlConfig,

    /// Base directory for transcripts and other data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Ollama backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the Ollama server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name (must be pulled locally, e.g. `ollama pull llama3.2`)
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "llama3.2".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Turn loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard ceiling on think-act-observe cycles per turn (including
    /// guard-forced regenerations)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Maximum conversation messages kept in the backend context window
    #[serde(default = "default_max_history")]
    pub max_history_messages: usize,
}

fn default_max_iterations() -> u32 {
    3
}
fn default_max_history() -> usize {
    50
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_history_messages: default_max_history(),
        }
    }
}

/// SQL validator limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlConfig {
    /// Maximum JOIN clauses per query
    #[serde(default = "default_max_joins")]
    pub max_joins: usize,

    /// Maximum nested SELECT subqueries per query
    #[serde(default = "default_max_subqueries")]
    pub max_subqueries: usize,
}

fn default_max_joins() -> usize {
    3
}
fn default_max_subqueries() -> usize {
    5
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            max_joins: default_max_joins(),
            max_subqueries: default_max_subqueries(),
        }
    }
}

impl Settings {
    /// Load configuration from the default path (~/.sqlsentry/config.toml).
    ///
    /// Environment variables override file values:
    /// - `SQLSENTRY_MODEL` — model name
    /// - `OLLAMA_BASE_URL` — backend URL
    /// - `SQLSENTRY_DATA_DIR` — data directory
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut settings = Self::load_from(&config_path)?;

        if let Ok(model) = std::env::var("SQLSENTRY_MODEL") {
            settings.model.model = model;
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            settings.model.base_url = url;
        }
        if let Ok(dir) = std::env::var("SQLSENTRY_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }

        settings.validate()?;
        Ok(settings)
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

        let settings: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sqlsentry")
    }

    /// Validate the configuration.
    ///
    /// The turn loop and the validator both require their limits to be
    /// positive integers; checking here keeps that responsibility out of the
    /// core (which simply trusts its inputs).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.max_history_messages == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_history_messages must be at least 1".into(),
            ));
        }

        if self.sql.max_joins == 0 {
            return Err(ConfigError::ValidationError(
                "sql.max_joins must be at least 1".into(),
            ));
        }

        if self.sql.max_subqueries == 0 {
            return Err(ConfigError::ValidationError(
                "sql.max_subqueries must be at least 1".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            agent: AgentConfig::default(),
            sql: SqlConfig::default(),
            data_dir: default_data_dir(),
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

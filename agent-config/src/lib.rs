//! Configuration for tool-calling agents.
//!
//! An [`AgentConfig`] names the backend (and, for hosted APIs, the provider)
//! plus the defaults applied to each run. It can be built in code, parsed
//! from TOML, and overridden from the environment.

#![warn(missing_docs, clippy::pedantic)]

use std::path::Path;
use std::time::Duration;
use std::{env, fs};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding [`AgentConfig::backend`].
pub const BACKEND_ENV: &str = "TOOL_AGENT_BACKEND";
/// Environment variable overriding [`AgentConfig::provider`].
pub const PROVIDER_ENV: &str = "TOOL_AGENT_PROVIDER";
/// Environment variable overriding [`AgentConfig::model`].
pub const MODEL_ENV: &str = "TOOL_AGENT_MODEL";

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {source}")]
    Io {
        /// Source I/O error.
        #[from]
        source: std::io::Error,
    },
    /// The configuration text is not valid TOML for [`AgentConfig`].
    #[error("failed to parse config: {source}")]
    Parse {
        /// Source TOML error.
        #[from]
        source: toml::de::Error,
    },
    /// A field holds a value outside its allowed range.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Recognised configuration options.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Backend name looked up in the dispatcher (`ollama`, `api`, ...).
    pub backend: String,
    /// Hosted provider; required when `backend` is `api`.
    pub provider: Option<String>,
    /// Chat model; backends fall back to their own default when absent.
    pub model: Option<String>,
    /// Overrides the backend's base URL.
    pub base_url: Option<String>,
    /// API key; otherwise read from the provider's environment variable.
    pub api_key: Option<String>,
    /// Sampling temperature sent with every completion request.
    pub temperature: f32,
    /// Optional cap on generated tokens.
    pub max_output_tokens: Option<u32>,
    /// Return the raw completion without parsing or executing calls.
    pub dry_run: bool,
    /// Hand each completion to the completion observer.
    pub show_completion: bool,
    /// Advertise at most this many tools, chosen by the ranker.
    pub num_tools: Option<usize>,
    /// Abort the completion request after this many seconds.
    pub completion_timeout_secs: Option<u64>,
    /// Embedding model used by embedding-based rankers.
    pub embedding_model: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".to_owned(),
            provider: None,
            model: None,
            base_url: None,
            api_key: None,
            temperature: 0.0,
            max_output_tokens: None,
            dry_run: false,
            show_completion: true,
            num_tools: None,
            completion_timeout_secs: None,
            embedding_model: None,
        }
    }
}

impl AgentConfig {
    /// Creates a default configuration for the named backend.
    #[must_use]
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            ..Self::default()
        }
    }

    /// Sets the hosted provider.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Parses configuration from TOML text and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise as
    /// [`AgentConfig::from_toml_str`].
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading agent config");
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Applies `TOOL_AGENT_*` environment overrides.
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|name| env::var(name).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(backend) = lookup(BACKEND_ENV) {
            self.backend = backend;
        }
        if let Some(provider) = lookup(PROVIDER_ENV) {
            self.provider = Some(provider);
        }
        if let Some(model) = lookup(MODEL_ENV) {
            self.model = Some(model);
        }
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty backend name, a negative
    /// or non-finite temperature, `num_tools = 0`, or a zero timeout.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.backend.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "backend",
                reason: "must not be empty".into(),
            });
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ConfigError::Invalid {
                field: "temperature",
                reason: format!("must be a non-negative number, got {}", self.temperature),
            });
        }
        if self.num_tools == Some(0) {
            return Err(ConfigError::Invalid {
                field: "num_tools",
                reason: "must be at least 1".into(),
            });
        }
        if self.completion_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "completion_timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Returns the completion timeout, if configured.
    #[must_use]
    pub fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout_secs.map(Duration::from_secs)
    }
}

//! Centralized server configuration.
//!
//! Loaded via the `config` crate from `WEAVER_`-prefixed environment
//! variables, with `__` separating nested keys
//! (e.g. `WEAVER_ENGINE__NODE_TIMEOUT_SECS=10`).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use weaver_ai::backend::OPENAI_BASE_URL;
use weaver_workflow::{EngineConfig, RetryPolicy};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub suggestions: SuggestionSettings,

    /// PostgreSQL URL for the database connector. Without it, database
    /// query nodes fail with a missing connector.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Base directory for file operation nodes.
    #[serde(default = "default_file_root")]
    pub file_root: PathBuf,
}

/// Run engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_node_timeout_secs")]
    pub node_timeout_secs: u64,

    /// Backoff for run store calls.
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Advisory suggestion settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestionSettings {
    /// API key for the completion endpoint. Suggestions fall back to the
    /// fixed list when unset.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_file_root() -> PathBuf {
    PathBuf::from("./data/files")
}

fn default_node_timeout_secs() -> u64 {
    30
}

fn default_base_url() -> String {
    OPENAI_BASE_URL.to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            node_timeout_secs: default_node_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineSettings {
    #[must_use]
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            node_timeout: Duration::from_secs(self.node_timeout_secs),
            retry: self.retry.clone(),
        }
    }
}

impl Default for SuggestionSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl SuggestionSettings {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            engine: EngineSettings::default(),
            suggestions: SuggestionSettings::default(),
            database_url: None,
            file_root: default_file_root(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("WEAVER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_any_source() {
        let config: ServerConfig = config::Config::builder()
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.engine.node_timeout_secs, 30);
        assert_eq!(config.suggestions.model, "gpt-3.5-turbo");
        assert!(config.suggestions.api_key.is_none());
        assert!(config.database_url.is_none());
    }

    #[test]
    fn nested_overrides_are_read() {
        let config: ServerConfig = config::Config::builder()
            .set_override("engine.node_timeout_secs", 5)
            .expect("override")
            .set_override("engine.retry.max_retries", 1)
            .expect("override")
            .set_override("suggestions.api_key", "sk-test")
            .expect("override")
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");
        assert_eq!(config.engine.node_timeout_secs, 5);
        assert_eq!(config.engine.retry.max_retries, 1);
        assert_eq!(config.engine.retry.initial_backoff_ms, 100);
        assert_eq!(config.suggestions.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn engine_settings_convert() {
        let engine = EngineSettings::default().to_engine_config();
        assert_eq!(engine.node_timeout, Duration::from_secs(30));
        assert_eq!(engine.retry.max_retries, 3);
        assert_eq!(engine.retry, RetryPolicy::default());
    }
}

//! Configuration management for evaluation runs
//!
//! Loads provider and runner settings from TOML files and provides runtime access.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::analysis::NullPolicy;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub runner: RunnerSettings,
}

/// Structured-output provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_name")]
    pub name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// HTTP request timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Runner and reporting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Per-unit bound on each model and judge call; unset means no bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout_ms: Option<u64>,
    #[serde(default = "default_num_shuffles")]
    pub num_shuffles: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Samples per question in self-consistency runs
    #[serde(default = "default_samples")]
    pub samples: usize,
    #[serde(default)]
    pub null_policy: NullPolicy,
}

// Default value functions
fn default_provider_name() -> String { "xai".to_string() }
fn default_base_url() -> String { "https://api.x.ai/v1".to_string() }
fn default_api_key_env() -> String { "XAI_API_KEY".to_string() }
fn default_model() -> String { "grok-beta".to_string() }
fn default_temperature() -> f32 { 0.2 }
fn default_top_p() -> f32 { 1.0 }
fn default_max_tokens() -> u32 { 4096 }
fn default_timeout_ms() -> u64 { 300_000 }
fn default_max_parallel() -> usize { 10 }
fn default_num_shuffles() -> usize { 5 }
fn default_seed() -> u64 { 7 }
fn default_samples() -> usize { 5 }

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            call_timeout_ms: None,
            num_shuffles: default_num_shuffles(),
            seed: default_seed(),
            samples: default_samples(),
            null_policy: NullPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from default config location or return defaults
    pub fn load_or_default() -> Self {
        let config_paths = ["config/eval.toml", "structured-eval/config/eval.toml"];

        for path in &config_paths {
            if let Ok(config) = Self::from_file(path) {
                tracing::info!("Loaded configuration from {}", path);
                return config;
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider.api_key_env, "XAI_API_KEY");
        assert_eq!(config.runner.max_parallel, 10);
        assert_eq!(config.runner.call_timeout_ms, None);
        assert_eq!(config.runner.null_policy, NullPolicy::Exclude);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
[provider]
model = "grok-2"
temperature = 0.0

[runner]
max_parallel = 4
call_timeout_ms = 30000
null_policy = "count-as-wrong"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.provider.model, "grok-2");
        assert_eq!(config.provider.base_url, "https://api.x.ai/v1");
        assert_eq!(config.runner.max_parallel, 4);
        assert_eq!(config.runner.call_timeout_ms, Some(30_000));
        assert_eq!(config.runner.num_shuffles, 5);
        assert_eq!(config.runner.samples, 5);
        assert_eq!(config.runner.null_policy, NullPolicy::CountAsWrong);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.toml");
        Config::default().save_toml(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.provider.model, "grok-beta");
        assert_eq!(reloaded.runner.seed, 7);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml("runner = [1, 2"),
            Err(ConfigError::Parse(_))
        ));
    }
}

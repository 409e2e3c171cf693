//! Configuration model and TOML loading.

use crate::errors::StagegenError;
use crate::llm::DEFAULT_ENDPOINT;
use crate::output::DEFAULT_ARTIFACT_FILE_NAME;
use crate::pipeline::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";

/// Default environment variable holding the API key.
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Configuration for one generator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Chat-completions endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature in `[0, 2]`.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// File holding the API key; wins over `api_key_env` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_file: Option<PathBuf>,
    /// File name each stage's artifact is written to.
    #[serde(default = "default_artifact_file_name")]
    pub artifact_file_name: String,
    /// Retry policy for transient service errors.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_artifact_file_name() -> String {
    DEFAULT_ARTIFACT_FILE_NAME.to_string()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            api_key_env: default_api_key_env(),
            api_key_file: None,
            artifact_file_name: default_artifact_file_name(),
            retry: RetryConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`StagegenError::Config`] if the document does not parse or
    /// fails [`validate`](Self::validate).
    pub fn from_toml_str(source: &str) -> Result<Self, StagegenError> {
        let config: Self = toml::from_str(source)
            .map_err(|e| StagegenError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`StagegenError::Config`] naming the path on read or parse
    /// failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StagegenError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            StagegenError::Config(format!("failed to read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&source).map_err(|e| match e {
            StagegenError::Config(msg) => {
                StagegenError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the maximum tokens per completion.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`StagegenError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), StagegenError> {
        if self.endpoint.trim().is_empty() {
            return Err(StagegenError::Config("endpoint must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(StagegenError::Config("model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(StagegenError::Config(format!(
                "temperature {} is outside [0, 2]",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(StagegenError::Config("max_tokens must be positive".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(StagegenError::Config(
                "request_timeout_secs must be positive".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(StagegenError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        let name = self.artifact_file_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(StagegenError::Config(format!(
                "artifact_file_name '{}' must be a plain file name",
                self.artifact_file_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BackoffStrategy;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = GeneratorConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.api_key_env, "OPENAI_API_KEY");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_defaults() {
        let config = GeneratorConfig::from_toml_str("").unwrap();
        assert_eq!(config, GeneratorConfig::default());
    }

    #[test]
    fn test_toml_overrides() {
        let config = GeneratorConfig::from_toml_str(
            r#"
            model = "gpt-4o"
            temperature = 0.2
            api_key_env = "MY_KEY"

            [retry]
            max_attempts = 5
            base_delay_ms = 250
            backoff_strategy = "linear"
            "#,
        )
        .unwrap();

        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.api_key_env, "MY_KEY");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 250);
        assert_eq!(config.retry.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(config.retry.max_delay_ms, 30_000);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(GeneratorConfig::from_toml_str("modle = \"typo\"").is_err());
    }

    #[test]
    fn test_validate_ranges() {
        assert!(GeneratorConfig::new().with_temperature(2.1).validate().is_err());
        assert!(GeneratorConfig::new().with_max_tokens(0).validate().is_err());
        assert!(GeneratorConfig::new()
            .with_retry(RetryConfig::new().with_max_attempts(0))
            .validate()
            .is_err());

        let config = GeneratorConfig {
            artifact_file_name: "../escape.txt".into(),
            ..GeneratorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_names_path_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"temperature = \"hot\"").unwrap();

        let err = GeneratorConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}

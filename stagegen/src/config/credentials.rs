//! Credential loading.

use super::GeneratorConfig;
use crate::errors::CompletionError;
use std::fmt;
use std::fs;

/// An API credential. Its `Debug` and `Display` output never show the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the secret for use in a request header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Replaces any occurrence of the secret in `text`.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        if self.0.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.0, "[REDACTED]")
        }
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Loads the credential from the process environment or the configured file.
///
/// # Errors
///
/// See [`load_credential_with`].
pub fn load_credential(config: &GeneratorConfig) -> Result<ApiKey, CompletionError> {
    load_credential_with(config, |name| std::env::var(name).ok())
}

/// Loads the credential using `lookup` for environment access.
///
/// `api_key_file` wins when configured; otherwise the variable named by
/// `api_key_env` is read. Surrounding whitespace is trimmed.
///
/// # Errors
///
/// Returns [`CompletionError::Authentication`] if the file cannot be read or
/// the resolved value is missing or empty.
pub fn load_credential_with<F>(config: &GeneratorConfig, lookup: F) -> Result<ApiKey, CompletionError>
where
    F: Fn(&str) -> Option<String>,
{
    let secret = if let Some(ref path) = config.api_key_file {
        fs::read_to_string(path).map_err(|e| {
            CompletionError::Authentication(format!(
                "failed to read API key file '{}': {}",
                path.display(),
                e
            ))
        })?
    } else {
        lookup(&config.api_key_env).ok_or_else(|| {
            CompletionError::Authentication(format!(
                "API key not found in environment variable '{}'",
                config.api_key_env
            ))
        })?
    };

    let secret = secret.trim();
    if secret.is_empty() {
        return Err(CompletionError::Authentication(
            "API key is empty".to_string(),
        ));
    }

    Ok(ApiKey::new(secret))
}

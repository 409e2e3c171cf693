//! HTTP client for OpenAI-compatible chat-completions endpoints.

use super::{Completion, CompletionClient, CompletionRequest};
use crate::config::{ApiKey, GeneratorConfig};
use crate::errors::CompletionError;
use crate::usage::UsageCounts;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default chat-completions endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Connect timeout applied to every request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Explicit client configuration. Nothing is read from global state.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    /// Bearer credential.
    pub api_key: ApiKey,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Creates a client configuration for `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            timeout: Duration::from_secs(300),
        }
    }

    /// Builds a client configuration from generator settings and a loaded key.
    #[must_use]
    pub fn from_generator(config: &GeneratorConfig, api_key: ApiKey) -> Self {
        Self::new(config.endpoint.clone(), api_key).with_timeout(config.request_timeout())
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Completion client for any OpenAI-compatible endpoint.
///
/// Cloning is cheap; clones share one connection pool, which is safe for
/// concurrent independent calls.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    http: Arc<Client>,
    config: ClientConfig,
}

impl OpenAiCompatibleClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::InvalidRequest`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: ClientConfig) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                CompletionError::InvalidRequest(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http: Arc::new(http),
            config,
        })
    }

    /// Returns the configured endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn redact(&self, text: &str) -> String {
        self.config.api_key.redact(text)
    }

    fn map_send_error(&self, err: &reqwest::Error) -> CompletionError {
        let detail = self.redact(&err.to_string());
        if err.is_timeout() {
            CompletionError::transient(format!(
                "request timed out after {}s: {}",
                self.config.timeout.as_secs(),
                detail
            ))
        } else if err.is_connect() {
            CompletionError::transient(format!("connection failed: {detail}"))
        } else {
            CompletionError::transient(format!("request failed: {detail}"))
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        request.validate()?;

        debug!(
            provider = self.provider(),
            model = %request.model,
            messages = request.messages.len(),
            prompt_chars = request.prompt_chars(),
            temperature = request.temperature,
            max_tokens = request.max_tokens,
            "Sending completion request"
        );

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.expose())
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        if !status.is_success() {
            let message = self.redact(&provider_message(&body).unwrap_or_else(|| body.clone()));
            let err = map_status(status, &message, retry_after);
            warn!(
                provider = self.provider(),
                status = status.as_u16(),
                retryable = err.is_retryable(),
                "Completion request failed"
            );
            return Err(err);
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            CompletionError::MalformedResponse(format!("response body is not valid JSON: {e}"))
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            CompletionError::MalformedResponse("response has no choices".to_string())
        })?;

        let completion = Completion {
            text: choice.message.content.unwrap_or_default(),
            usage: parsed.usage.unwrap_or_default(),
            model: parsed.model,
            finish_reason: choice.finish_reason,
        };
        if completion.text.trim().is_empty() {
            debug!(
                provider = self.provider(),
                prompt_tokens = completion.usage.prompt_tokens,
                completion_tokens = completion.usage.completion_tokens,
                total_tokens = completion.usage.total_tokens,
                "Discarding usage of empty completion"
            );
        }
        let completion = completion.ensure_non_empty()?;

        debug!(
            provider = self.provider(),
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            total_tokens = completion.usage.total_tokens,
            finish_reason = ?completion.finish_reason,
            "Completion received"
        );

        Ok(completion)
    }

    fn provider(&self) -> &str {
        "openai-compatible"
    }
}

/// Maps a non-success status to the error taxonomy.
fn map_status(status: StatusCode, message: &str, retry_after: Option<Duration>) -> CompletionError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CompletionError::Authentication(format!("{status}: {message}"))
        }
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => CompletionError::Transient {
            message: format!("{status}: {message}"),
            retry_after,
        },
        s if s.is_server_error() => CompletionError::Transient {
            message: format!("{status}: {message}"),
            retry_after,
        },
        s if s.is_client_error() => CompletionError::InvalidRequest(format!("{status}: {message}")),
        _ => CompletionError::MalformedResponse(format!("unexpected status {status}")),
    }
}

/// Reads a `Retry-After` header given in whole seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Extracts `error.message` from a provider error body.
fn provider_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let detail = parsed.error?;
    match (detail.message, detail.code) {
        (Some(message), Some(code)) => Some(format!("{message} ({code})")),
        (Some(message), None) => Some(message),
        (None, Some(code)) => Some(code),
        (None, None) => None,
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<UsageCounts>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

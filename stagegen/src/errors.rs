//! Error types for stagegen.
//!
//! Planning-time errors ([`MissingSubstitution`], [`InvalidStagePlan`]) abort a
//! run before any network call is made. [`CompletionError`] is what the
//! completion client surfaces per call; the orchestrator decides from its
//! variant whether to retry, halt, or abort. [`PersistenceError`] never
//! changes the outcome of a generated stage.

use crate::usage::UsageSummary;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The main error type for stagegen operations.
#[derive(Debug, Error)]
pub enum StagegenError {
    /// A template placeholder had no substitution value.
    #[error("{0}")]
    MissingSubstitution(#[from] MissingSubstitution),

    /// The stage plan failed validation.
    #[error("{0}")]
    InvalidStagePlan(#[from] InvalidStagePlan),

    /// A completion call failed.
    #[error("{0}")]
    Completion(#[from] CompletionError),

    /// An artifact could not be persisted.
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// A usage counter was negative.
    #[error("{0}")]
    InvalidUsage(#[from] InvalidUsageValue),

    /// Configuration could not be loaded or was invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A run stopped before every planned stage succeeded.
    #[error("Stage '{stage}' failed: {cause}")]
    RunFailed {
        /// The stage that failed (or the next stage, for cancelled runs).
        stage: String,
        /// The underlying cause.
        cause: ErrorInfo,
        /// Usage of the stages that did complete.
        usage: UsageSummary,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raised when a template placeholder has no matching substitution key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Missing substitution for placeholder '{{{name}}}'")]
pub struct MissingSubstitution {
    /// The placeholder name, without braces.
    pub name: String,
}

impl MissingSubstitution {
    /// Creates a new missing-substitution error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Raised when a stage plan violates its ordering or naming invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid stage plan: {message}")]
pub struct InvalidStagePlan {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
}

impl InvalidStagePlan {
    /// Creates a new plan validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// Failure modes of a single completion call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// Rate limiting, 5xx, or timeout. The caller may retry.
    #[error("Transient service error: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
        /// Delay the service asked for, if any.
        retry_after: Option<Duration>,
    },

    /// Invalid or missing credential. Never retried.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The request was rejected (context length, malformed messages, bad parameters).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The service answered without error but produced no text.
    #[error("Completion returned empty text")]
    EmptyCompletion,

    /// The response body did not have the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl CompletionError {
    /// Creates a transient error without a retry hint.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Returns true if the same request may succeed when retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns true if the whole run must stop, not just this stage.
    #[must_use]
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::TransientServiceError,
            Self::Authentication(_) => ErrorKind::AuthenticationError,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequestError,
            Self::EmptyCompletion => ErrorKind::EmptyCompletionError,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
        }
    }

    /// Returns the retry delay requested by the service, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Raised when an artifact cannot be written to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to persist artifact for stage '{stage}': {message}")]
pub struct PersistenceError {
    /// The stage whose artifact failed to persist.
    pub stage: String,
    /// Description of the failure.
    pub message: String,
}

impl PersistenceError {
    /// Creates a new persistence error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Raised when a usage counter is negative.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid usage value for '{field}': {value}")]
pub struct InvalidUsageValue {
    /// The offending counter name.
    pub field: &'static str,
    /// The offending value.
    pub value: i64,
}

/// Taxonomy of errors recorded on stage results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A placeholder had no value.
    MissingSubstitution,
    /// The plan failed validation.
    InvalidStagePlan,
    /// Retryable service failure.
    TransientServiceError,
    /// Credential failure.
    AuthenticationError,
    /// Request rejected by the service.
    InvalidRequestError,
    /// Empty completion text.
    EmptyCompletionError,
    /// Unexpected response shape.
    MalformedResponse,
    /// Artifact write failure.
    PersistenceError,
    /// Negative usage counter.
    InvalidUsageValue,
    /// Run cancelled between stages.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingSubstitution => "MissingSubstitution",
            Self::InvalidStagePlan => "InvalidStagePlan",
            Self::TransientServiceError => "TransientServiceError",
            Self::AuthenticationError => "AuthenticationError",
            Self::InvalidRequestError => "InvalidRequestError",
            Self::EmptyCompletionError => "EmptyCompletionError",
            Self::MalformedResponse => "MalformedResponse",
            Self::PersistenceError => "PersistenceError",
            Self::InvalidUsageValue => "InvalidUsageValue",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// Serializable snapshot of an error, stored on stage results and run reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// The error kind.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<&CompletionError> for ErrorInfo {
    fn from(err: &CompletionError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<&PersistenceError> for ErrorInfo {
    fn from(err: &PersistenceError) -> Self {
        Self::new(ErrorKind::PersistenceError, err.to_string())
    }
}

impl From<&InvalidUsageValue> for ErrorInfo {
    fn from(err: &InvalidUsageValue) -> Self {
        Self::new(ErrorKind::InvalidUsageValue, err.to_string())
    }
}

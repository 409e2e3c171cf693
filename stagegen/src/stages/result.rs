//! Stage result types.

use crate::errors::ErrorInfo;
use crate::output::Artifact;
use crate::usage::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final status of an executed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// The stage produced text.
    Succeeded,
    /// The stage produced no usable text.
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one stage execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub stage_name: String,
    /// Generated text; empty when the stage failed.
    pub generated_text: String,
    /// Token usage of the successful call.
    pub usage: TokenUsage,
    /// Stage status.
    pub status: StageStatus,
    /// Why the stage failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Completion calls made, retries included.
    pub attempts: u32,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
    /// Where the generated text was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    /// Why the generated text could not be written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<ErrorInfo>,
}

impl StageResult {
    /// Creates a succeeded result.
    #[must_use]
    pub fn succeeded(
        stage_name: impl Into<String>,
        generated_text: impl Into<String>,
        usage: TokenUsage,
        attempts: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            generated_text: generated_text.into(),
            usage,
            status: StageStatus::Succeeded,
            error: None,
            attempts,
            started_at,
            ended_at: Utc::now(),
            artifact: None,
            persistence_error: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(
        stage_name: impl Into<String>,
        error: ErrorInfo,
        attempts: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            generated_text: String::new(),
            usage: TokenUsage::default(),
            status: StageStatus::Failed,
            error: Some(error),
            attempts,
            started_at,
            ended_at: Utc::now(),
            artifact: None,
            persistence_error: None,
        }
    }

    /// Records where the text was written.
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Records a write failure. The status is unchanged.
    #[must_use]
    pub fn with_persistence_error(mut self, error: ErrorInfo) -> Self {
        self.persistence_error = Some(error);
        self
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, StageStatus::Succeeded)
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.status, StageStatus::Failed)
    }
}

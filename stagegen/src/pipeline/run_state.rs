//! Accumulated record of one run.

use crate::errors::{ErrorInfo, ErrorKind, InvalidUsageValue, StagegenError};
use crate::stages::{StagePlan, StageResult};
use crate::usage::{TokenUsage, UsageCounts, UsageSummary, UsageTracker};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Stages are still executing.
    Running,
    /// Every planned stage succeeded.
    Completed,
    /// A stage failed and later stages were not attempted.
    Halted {
        /// The failed stage.
        stage: String,
        /// Why it failed.
        error: ErrorInfo,
    },
    /// The credential was rejected; nothing further can succeed.
    Aborted {
        /// The stage whose call was rejected.
        stage: String,
        /// The rejection.
        error: ErrorInfo,
    },
    /// Cancellation was requested between stages.
    Cancelled {
        /// The stage that would have run next.
        next_stage: String,
        /// The cancellation reason.
        reason: String,
    },
}

impl RunOutcome {
    /// Returns true once the run has stopped, for whatever reason.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// The record of all stage outcomes and usage for one run.
///
/// Results are kept in execution order, one per stage name. Once the run
/// finishes the state is only read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    run_id: Uuid,
    plan_name: String,
    planned_stages: Vec<String>,
    results: Vec<StageResult>,
    usage: UsageTracker,
    current_stage: usize,
    started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
    outcome: RunOutcome,
}

impl RunState {
    /// Creates the state for a fresh run of `plan`.
    #[must_use]
    pub fn new(plan: &StagePlan) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            plan_name: plan.name().to_string(),
            planned_stages: plan.stage_names().into_iter().map(String::from).collect(),
            results: Vec::new(),
            usage: UsageTracker::new(),
            current_stage: 0,
            started_at: Utc::now(),
            finished_at: None,
            outcome: RunOutcome::Running,
        }
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the plan name.
    #[must_use]
    pub fn plan_name(&self) -> &str {
        &self.plan_name
    }

    /// Returns the planned stage names, in order.
    #[must_use]
    pub fn planned_stages(&self) -> &[String] {
        &self.planned_stages
    }

    /// Returns the stage results in execution order.
    #[must_use]
    pub fn results(&self) -> &[StageResult] {
        &self.results
    }

    /// Returns the result for a stage.
    #[must_use]
    pub fn result(&self, stage_name: &str) -> Option<&StageResult> {
        self.results.iter().find(|r| r.stage_name == stage_name)
    }

    /// Returns the generated text of a stage that succeeded.
    #[must_use]
    pub fn succeeded_text(&self, stage_name: &str) -> Option<&str> {
        self.result(stage_name)
            .filter(|r| r.is_success())
            .map(|r| r.generated_text.as_str())
    }

    /// Returns the index of the next stage to run.
    #[must_use]
    pub fn current_stage(&self) -> usize {
        self.current_stage
    }

    /// Returns the planned stages that have no result.
    #[must_use]
    pub fn not_attempted(&self) -> Vec<&str> {
        self.planned_stages
            .iter()
            .filter(|name| self.result(name).is_none())
            .map(String::as_str)
            .collect()
    }

    /// Returns the succeeded stages whose artifact could not be persisted.
    ///
    /// A completed run with unsaved stages generated everything but did not
    /// keep all of it; callers must check this alongside the outcome.
    #[must_use]
    pub fn unsaved_stages(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.is_success() && r.persistence_error.is_some())
            .map(|r| r.stage_name.as_str())
            .collect()
    }

    /// Returns the usage tracker.
    #[must_use]
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Returns the per-stage and total usage.
    #[must_use]
    pub fn summary(&self) -> UsageSummary {
        self.usage.summary()
    }

    /// Returns the total usage.
    #[must_use]
    pub fn total_usage(&self) -> TokenUsage {
        self.usage.total()
    }

    /// Returns when the run started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the run finished.
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns how the run ended.
    #[must_use]
    pub fn outcome(&self) -> &RunOutcome {
        &self.outcome
    }

    /// Returns true if every planned stage succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }

    /// Returns the stage that stopped the run and why.
    #[must_use]
    pub fn failure(&self) -> Option<(String, ErrorInfo)> {
        match &self.outcome {
            RunOutcome::Running | RunOutcome::Completed => None,
            RunOutcome::Halted { stage, error } | RunOutcome::Aborted { stage, error } => {
                Some((stage.clone(), error.clone()))
            }
            RunOutcome::Cancelled { next_stage, reason } => Some((
                next_stage.clone(),
                ErrorInfo::new(ErrorKind::Cancelled, reason.clone()),
            )),
        }
    }

    /// Converts a run that did not complete into [`StagegenError::RunFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`StagegenError::RunFailed`] carrying the stopping stage, its
    /// cause, and the usage of the stages that did run.
    pub fn into_result(self) -> Result<Self, StagegenError> {
        match self.failure() {
            None => Ok(self),
            Some((stage, cause)) => Err(StagegenError::RunFailed {
                stage,
                cause,
                usage: self.summary(),
            }),
        }
    }

    /// Serializes the state as a pretty JSON report.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Validates and records usage for a stage.
    pub(crate) fn record_usage(
        &mut self,
        stage_name: &str,
        counts: UsageCounts,
    ) -> Result<TokenUsage, InvalidUsageValue> {
        self.usage.record(stage_name, counts)
    }

    /// Stores a stage result, replacing any earlier result for the same stage.
    pub(crate) fn push_result(&mut self, result: StageResult) {
        if let Some(pos) = self
            .results
            .iter()
            .position(|r| r.stage_name == result.stage_name)
        {
            self.results.remove(pos);
        }
        self.results.push(result);
    }

    pub(crate) fn advance(&mut self) {
        self.current_stage += 1;
    }

    pub(crate) fn finish(&mut self, outcome: RunOutcome) {
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::Stage;
    use pretty_assertions::assert_eq;

    fn plan() -> StagePlan {
        StagePlan::builder("p")
            .stage(Stage::new("a", "A"))
            .stage(Stage::new("b", "B").with_dependency("a"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_state() {
        let state = RunState::new(&plan());
        assert_eq!(state.plan_name(), "p");
        assert_eq!(state.planned_stages(), ["a", "b"]);
        assert_eq!(state.outcome(), &RunOutcome::Running);
        assert_eq!(state.not_attempted(), vec!["a", "b"]);
        assert!(state.failure().is_none());
    }

    #[test]
    fn test_rerun_supersedes_result() {
        let mut state = RunState::new(&plan());
        state.push_result(StageResult::succeeded("a", "old", TokenUsage::default(), 1, Utc::now()));
        state.push_result(StageResult::succeeded("b", "b", TokenUsage::default(), 1, Utc::now()));
        state.push_result(StageResult::succeeded("a", "new", TokenUsage::default(), 1, Utc::now()));

        assert_eq!(state.results().len(), 2);
        assert_eq!(state.succeeded_text("a"), Some("new"));
    }

    #[test]
    fn test_unsaved_stages() {
        let mut state = RunState::new(&plan());
        let persist = ErrorInfo::new(ErrorKind::PersistenceError, "disk full");
        state.push_result(StageResult::succeeded("a", "A", TokenUsage::default(), 1, Utc::now()));
        state.push_result(
            StageResult::succeeded("b", "B", TokenUsage::default(), 1, Utc::now())
                .with_persistence_error(persist),
        );

        assert_eq!(state.unsaved_stages(), vec!["b"]);
        // Generated text stays available as context.
        assert_eq!(state.succeeded_text("b"), Some("B"));
    }

    #[test]
    fn test_succeeded_text_ignores_failed() {
        let mut state = RunState::new(&plan());
        let error = ErrorInfo::new(ErrorKind::EmptyCompletionError, "empty");
        state.push_result(StageResult::failed("a", error, 1, Utc::now()));

        assert_eq!(state.succeeded_text("a"), None);
    }

    #[test]
    fn test_into_result_for_halted_run() {
        let mut state = RunState::new(&plan());
        state.record_usage("a", UsageCounts::new(3, 4, 7)).unwrap();
        let error = ErrorInfo::new(ErrorKind::InvalidRequestError, "too long");
        state.finish(RunOutcome::Halted {
            stage: "b".into(),
            error: error.clone(),
        });

        match state.into_result() {
            Err(StagegenError::RunFailed { stage, cause, usage }) => {
                assert_eq!(stage, "b");
                assert_eq!(cause, error);
                assert_eq!(usage.total, TokenUsage::new(3, 4, 7));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_failure_names_next_stage() {
        let mut state = RunState::new(&plan());
        state.finish(RunOutcome::Cancelled {
            next_stage: "b".into(),
            reason: "interrupt".into(),
        });

        let (stage, cause) = state.failure().unwrap();
        assert_eq!(stage, "b");
        assert_eq!(cause.kind, ErrorKind::Cancelled);
        assert!(state.finished_at().is_some());
    }

    #[test]
    fn test_json_report() {
        let mut state = RunState::new(&plan());
        state.finish(RunOutcome::Completed);

        let json: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();
        assert_eq!(json["plan_name"], "p");
        assert_eq!(json["outcome"]["status"], "completed");

        let back: RunState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}

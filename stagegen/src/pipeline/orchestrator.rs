//! Sequential stage execution.
//!
//! The orchestrator runs a [`StagePlan`] one stage at a time. Each stage's
//! messages are built fresh from the run's succeeded results, the completion
//! call is retried on transient errors, usage is recorded, and the text is
//! handed to the output writer before the next stage starts.

use super::retry::{should_retry, RetryDecision};
use super::run_state::{RunOutcome, RunState};
use crate::cancellation::CancellationToken;
use crate::config::GeneratorConfig;
use crate::errors::{CompletionError, ErrorInfo, ErrorKind, InvalidStagePlan, StagegenError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::llm::{Completion, CompletionClient, CompletionRequest, Message};
use crate::output::OutputWriter;
use crate::prompt::{ResolvedPrompt, Substitutions};
use crate::stages::{Stage, StagePlan, StageResult, StageRole};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A stage whose instruction has been resolved for this run.
#[derive(Debug, Clone)]
pub struct PreparedStage<'a> {
    /// The stage definition.
    pub stage: &'a Stage,
    /// Its resolved instruction.
    pub instruction: ResolvedPrompt,
}

/// A plan with every template resolved against the run's substitutions.
#[derive(Debug, Clone)]
pub struct PreparedPlan<'a> {
    /// The plan being run.
    pub plan: &'a StagePlan,
    /// The resolved system prompt, if the plan has one.
    pub system_prompt: Option<ResolvedPrompt>,
    /// The stages in execution order.
    pub stages: Vec<PreparedStage<'a>>,
}

/// Builds the conversation for one stage.
///
/// The order is: the system prompt (for system-role stages), one labeled
/// user message per dependency in declared order, then the instruction.
///
/// # Errors
///
/// Returns [`InvalidStagePlan`] if a dependency has no succeeded result in
/// `state`.
pub fn build_messages(
    system_prompt: Option<&ResolvedPrompt>,
    stage: &Stage,
    instruction: &ResolvedPrompt,
    state: &RunState,
) -> Result<Vec<Message>, InvalidStagePlan> {
    let mut messages = Vec::with_capacity(stage.depends_on.len() + 2);

    if stage.role == StageRole::System {
        if let Some(system) = system_prompt {
            messages.push(Message::system(system.as_str()));
        }
    }

    for dep in &stage.depends_on {
        let text = state.succeeded_text(dep).ok_or_else(|| {
            InvalidStagePlan::new(format!(
                "Stage '{}' needs output of stage '{}', which has not succeeded in this run",
                stage.name, dep
            ))
            .with_stages(vec![stage.name.clone(), dep.clone()])
        })?;
        messages.push(Message::user(context_message(dep, text)));
    }

    messages.push(Message::user(instruction.as_str()));
    Ok(messages)
}

fn context_message(stage_name: &str, text: &str) -> String {
    format!("## Output of stage '{stage_name}'\n\n{text}")
}

/// How the completion loop for one stage ended.
enum StageAttempt {
    Completed(Completion, u32),
    Failed(CompletionError, u32),
    Cancelled(String),
}

/// Drives a stage plan against a completion client.
pub struct Orchestrator {
    client: Arc<dyn CompletionClient>,
    writer: Arc<dyn OutputWriter>,
    events: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
    config: GeneratorConfig,
    substitutions: Substitutions,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.client.provider())
            .field("model", &self.config.model)
            .field("substitutions", &self.substitutions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with no substitutions, no event sink and a
    /// fresh cancellation token.
    #[must_use]
    pub fn new(
        client: Arc<dyn CompletionClient>,
        writer: Arc<dyn OutputWriter>,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            client,
            writer,
            events: Arc::new(NoOpEventSink),
            cancel: Arc::new(CancellationToken::new()),
            config,
            substitutions: Substitutions::new(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replaces the substitutions.
    #[must_use]
    pub fn with_substitutions(mut self, substitutions: Substitutions) -> Self {
        self.substitutions = substitutions;
        self
    }

    /// Adds one substitution.
    #[must_use]
    pub fn with_substitution(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.substitutions.insert(key.into(), value.into());
        self
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Resolves every template of `plan` without touching the network.
    ///
    /// # Errors
    ///
    /// Returns [`StagegenError::MissingSubstitution`] for the first
    /// placeholder with no value.
    pub fn prepare<'a>(&self, plan: &'a StagePlan) -> Result<PreparedPlan<'a>, StagegenError> {
        let system_prompt = plan
            .system_prompt()
            .map(|t| t.resolve(&self.substitutions))
            .transpose()?;

        let stages = plan
            .stages()
            .iter()
            .map(|stage| -> Result<PreparedStage<'a>, StagegenError> {
                Ok(PreparedStage {
                    stage,
                    instruction: stage.instruction.resolve(&self.substitutions)?,
                })
            })
            .collect::<Result<Vec<_>, StagegenError>>()?;

        for key in self.substitutions.keys() {
            let used = plan
                .stages()
                .iter()
                .any(|s| s.instruction.placeholders().contains(&key.as_str()))
                || plan
                    .system_prompt()
                    .is_some_and(|t| t.placeholders().contains(&key.as_str()));
            if !used {
                debug!(key = %key, "Substitution not used by any template");
            }
        }

        Ok(PreparedPlan {
            plan,
            system_prompt,
            stages,
        })
    }

    /// Runs every stage of `plan` in order.
    ///
    /// Stage failures do not make this return an error: the returned
    /// [`RunState`] records which stages succeeded, which one stopped the
    /// run, and why. Use [`RunState::into_result`] to turn an incomplete run
    /// into an error.
    ///
    /// # Errors
    ///
    /// Returns an error before any completion call is made if the
    /// configuration is invalid or a template has a missing substitution.
    pub async fn run(&self, plan: &StagePlan) -> Result<RunState, StagegenError> {
        self.config.validate()?;
        let prepared = self.prepare(plan)?;
        let mut state = RunState::new(plan);

        info!(
            run_id = %state.run_id(),
            plan = plan.name(),
            stages = plan.len(),
            model = %self.config.model,
            provider = self.client.provider(),
            "Starting run"
        );
        self.emit(
            events::RUN_STARTED,
            json!({
                "run_id": state.run_id(),
                "plan": plan.name(),
                "stages": plan.stage_names(),
            }),
        )
        .await;

        let mut outcome = RunOutcome::Completed;
        for prepared_stage in &prepared.stages {
            let stage = prepared_stage.stage;

            if self.cancel.is_cancelled() {
                outcome = self.cancelled_outcome(stage);
                break;
            }

            match self.run_stage(&prepared, prepared_stage, &mut state).await {
                None => state.advance(),
                Some(stop) => {
                    outcome = stop;
                    break;
                }
            }
        }

        state.finish(outcome);
        self.log_finish(&state);
        self.emit(
            events::RUN_FINISHED,
            json!({
                "run_id": state.run_id(),
                "outcome": state.outcome(),
                "total_tokens": state.total_usage().total_tokens,
            }),
        )
        .await;

        Ok(state)
    }

    /// Runs one stage. Returns the outcome that stops the run, if any.
    async fn run_stage(
        &self,
        prepared: &PreparedPlan<'_>,
        prepared_stage: &PreparedStage<'_>,
        state: &mut RunState,
    ) -> Option<RunOutcome> {
        let stage = prepared_stage.stage;
        let started_at = Utc::now();

        let messages = match build_messages(
            prepared.system_prompt.as_ref(),
            stage,
            &prepared_stage.instruction,
            state,
        ) {
            Ok(messages) => messages,
            Err(err) => {
                let info = ErrorInfo::new(ErrorKind::InvalidStagePlan, err.to_string());
                return Some(self.fail_stage(state, stage, info, 0, started_at).await);
            }
        };

        let request = CompletionRequest::new(
            self.config.model.clone(),
            messages,
            self.config.temperature,
            self.config.max_tokens,
        );

        info!(
            stage = %stage.name,
            messages = request.messages.len(),
            prompt_chars = request.prompt_chars(),
            "Starting stage"
        );
        self.emit(
            events::STAGE_STARTED,
            json!({
                "run_id": state.run_id(),
                "stage": stage.name,
                "index": state.current_stage(),
            }),
        )
        .await;

        let (completion, attempts) = match self.complete_with_retry(stage, &request, state).await {
            StageAttempt::Completed(completion, attempts) => (completion, attempts),
            StageAttempt::Cancelled(reason) => {
                return Some(RunOutcome::Cancelled {
                    next_stage: stage.name.clone(),
                    reason,
                });
            }
            StageAttempt::Failed(err, attempts) => {
                let info = ErrorInfo::from(&err);
                let stop = self.fail_stage(state, stage, info.clone(), attempts, started_at).await;
                return Some(if err.is_fatal_to_run() {
                    RunOutcome::Aborted {
                        stage: stage.name.clone(),
                        error: info,
                    }
                } else {
                    stop
                });
            }
        };

        let usage = match state.record_usage(&stage.name, completion.usage) {
            Ok(usage) => usage,
            Err(err) => {
                let info = ErrorInfo::from(&err);
                return Some(self.fail_stage(state, stage, info, attempts, started_at).await);
            }
        };

        let mut result = StageResult::succeeded(
            stage.name.clone(),
            completion.text,
            usage,
            attempts,
            started_at,
        );

        match self.writer.write(&stage.name, &result.generated_text).await {
            Ok(artifact) => {
                result = result.with_artifact(artifact);
            }
            Err(err) => {
                warn!(stage = %stage.name, error = %err, "Failed to persist artifact");
                self.emit(
                    events::ARTIFACT_PERSIST_FAILED,
                    json!({
                        "run_id": state.run_id(),
                        "stage": stage.name,
                        "error": err.message,
                    }),
                )
                .await;
                result = result.with_persistence_error(ErrorInfo::from(&err));
            }
        }

        info!(
            stage = %stage.name,
            attempts,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "Stage succeeded"
        );
        self.emit(
            events::STAGE_SUCCEEDED,
            json!({
                "run_id": state.run_id(),
                "stage": stage.name,
                "attempts": attempts,
                "usage": usage,
                "artifact": result.artifact.as_ref().map(|a| a.location.clone()),
            }),
        )
        .await;

        state.push_result(result);
        None
    }

    /// Calls the client until it succeeds, fails permanently, runs out of
    /// attempts, or the run is cancelled while waiting to retry.
    async fn complete_with_retry(
        &self,
        stage: &Stage,
        request: &CompletionRequest,
        state: &RunState,
    ) -> StageAttempt {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.client.complete(request).await {
                Ok(completion) => {
                    let usage = completion.usage;
                    match completion.ensure_non_empty() {
                        Ok(completion) => return StageAttempt::Completed(completion, attempt),
                        Err(err) => {
                            debug!(
                                stage = %stage.name,
                                attempt,
                                prompt_tokens = usage.prompt_tokens,
                                completion_tokens = usage.completion_tokens,
                                total_tokens = usage.total_tokens,
                                "Discarding usage of empty completion"
                            );
                            err
                        }
                    }
                }
                Err(err) => err,
            };

            match should_retry(&self.config.retry, attempt, &err) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        stage = %stage.name,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Transient error, retrying"
                    );
                    self.emit(
                        events::STAGE_RETRYING,
                        json!({
                            "run_id": state.run_id(),
                            "stage": stage.name,
                            "attempt": attempt,
                            "delay_ms": u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "error": err.to_string(),
                        }),
                    )
                    .await;

                    if let Some(reason) = self.wait_or_cancel(delay).await {
                        return StageAttempt::Cancelled(reason);
                    }
                }
                RetryDecision::GiveUp | RetryDecision::NotRetryable => {
                    return StageAttempt::Failed(err, attempt);
                }
            }
        }
    }

    /// Sleeps for `delay`. Returns the cancellation reason if the run was
    /// cancelled before or during the wait.
    async fn wait_or_cancel(&self, delay: Duration) -> Option<String> {
        if self.cancel.is_cancelled() {
            return Some(self.cancel_reason());
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => None,
            () = self.cancel.cancelled() => Some(self.cancel_reason()),
        }
    }

    async fn fail_stage(
        &self,
        state: &mut RunState,
        stage: &Stage,
        info: ErrorInfo,
        attempts: u32,
        started_at: chrono::DateTime<Utc>,
    ) -> RunOutcome {
        error!(stage = %stage.name, attempts, error = %info, "Stage failed");
        self.emit(
            events::STAGE_FAILED,
            json!({
                "run_id": state.run_id(),
                "stage": stage.name,
                "attempts": attempts,
                "error": info,
            }),
        )
        .await;

        state.push_result(StageResult::failed(
            stage.name.clone(),
            info.clone(),
            attempts,
            started_at,
        ));
        RunOutcome::Halted {
            stage: stage.name.clone(),
            error: info,
        }
    }

    fn cancelled_outcome(&self, next: &Stage) -> RunOutcome {
        RunOutcome::Cancelled {
            next_stage: next.name.clone(),
            reason: self.cancel_reason(),
        }
    }

    fn cancel_reason(&self) -> String {
        self.cancel
            .reason()
            .unwrap_or_else(|| "cancelled".to_string())
    }

    fn log_finish(&self, state: &RunState) {
        let total = state.total_usage();
        match state.outcome() {
            RunOutcome::Completed => info!(
                run_id = %state.run_id(),
                total_tokens = total.total_tokens,
                "Run completed"
            ),
            RunOutcome::Cancelled { next_stage, reason } => warn!(
                run_id = %state.run_id(),
                next_stage = %next_stage,
                reason = %reason,
                "Run cancelled"
            ),
            RunOutcome::Halted { stage, error } | RunOutcome::Aborted { stage, error } => error!(
                run_id = %state.run_id(),
                stage = %stage,
                error = %error,
                not_attempted = ?state.not_attempted(),
                "Run stopped"
            ),
            RunOutcome::Running => {}
        }
    }

    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.events.emit(event_type, data).await;
    }
}

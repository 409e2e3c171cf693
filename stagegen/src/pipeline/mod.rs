//! Run execution.
//!
//! This module provides:
//! - The [`Orchestrator`] that runs a stage plan against a completion client
//! - [`RunState`], the record a run returns
//! - The retry policy for transient completion errors

mod integration_tests;
mod orchestrator;
mod retry;
mod run_state;

pub use orchestrator::{build_messages, Orchestrator, PreparedPlan, PreparedStage};
pub use retry::{should_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision};
pub use run_state::{RunOutcome, RunState};

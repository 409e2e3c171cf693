//! Assertions over run states.

use crate::errors::ErrorKind;
use crate::pipeline::RunState;
use crate::stages::StageResult;

/// Asserts that `stage` succeeded and returns its result.
#[track_caller]
pub fn assert_stage_succeeded<'a>(state: &'a RunState, stage: &str) -> &'a StageResult {
    let result = state
        .result(stage)
        .unwrap_or_else(|| panic!("Expected a result for stage '{stage}', found none"));
    assert!(
        result.is_success(),
        "Expected stage '{}' to succeed, got {:?}",
        stage,
        result.error
    );
    result
}

/// Asserts that `stage` failed with an error of `kind`.
#[track_caller]
pub fn assert_stage_failed<'a>(state: &'a RunState, stage: &str, kind: ErrorKind) -> &'a StageResult {
    let result = state
        .result(stage)
        .unwrap_or_else(|| panic!("Expected a result for stage '{stage}', found none"));
    assert!(result.is_failure(), "Expected stage '{stage}' to fail, but it succeeded");
    let actual = result.error.as_ref().map(|e| e.kind);
    assert_eq!(
        actual,
        Some(kind),
        "Expected stage '{stage}' to fail with {kind}, got {actual:?}"
    );
    result
}

/// Asserts that `stage` has no result at all.
#[track_caller]
pub fn assert_not_attempted(state: &RunState, stage: &str) {
    assert!(
        state.result(stage).is_none(),
        "Expected stage '{stage}' not to run, but it has a result"
    );
}

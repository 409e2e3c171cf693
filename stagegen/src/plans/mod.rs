//! Built-in and file-based stage plans.

mod builtin;
mod file;

pub use builtin::{single, staged, DEFAULT_SYSTEM_PROMPT, SINGLE, STAGED};
pub use file::{load_plan, plan_from_toml_str};

use crate::errors::StagegenError;
use crate::stages::StagePlan;

/// Names of the built-in plans.
pub const BUILTIN_PLANS: [&str; 2] = [STAGED, SINGLE];

/// Returns a built-in plan by name.
///
/// # Errors
///
/// Returns [`StagegenError::InvalidStagePlan`] if a built-in plan fails
/// validation.
pub fn builtin(name: &str) -> Result<Option<StagePlan>, StagegenError> {
    let plan = match name {
        STAGED => staged()?,
        SINGLE => single()?,
        _ => return Ok(None),
    };
    Ok(Some(plan))
}

/// Resolves a plan identifier: a built-in plan name, or a TOML file path.
///
/// # Errors
///
/// Returns [`StagegenError::Config`] if the identifier is neither a built-in
/// name nor a readable plan file.
pub fn resolve_plan(identifier: &str) -> Result<StagePlan, StagegenError> {
    if let Some(plan) = builtin(identifier)? {
        return Ok(plan);
    }
    if std::path::Path::new(identifier).is_file() {
        return load_plan(identifier);
    }
    Err(StagegenError::Config(format!(
        "unknown plan '{}': expected one of {} or a path to a plan file",
        identifier,
        BUILTIN_PLANS.join(", ")
    )))
}

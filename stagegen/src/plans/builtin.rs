//! Plans that ship with the crate.

use crate::errors::InvalidStagePlan;
use crate::stages::{Stage, StagePlan};

/// System prompt shared by the built-in plans.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert full-stack developer.";

/// Name of the four-stage plan.
pub const STAGED: &str = "staged";

/// Name of the one-stage plan.
pub const SINGLE: &str = "single";

const STAGED_FOCUS: [(&str, &str); 4] = [
    (
        "frontend_components",
        "Generate only the frontend components described above, with complete \
         typed implementations of every view and component.",
    ),
    (
        "backend_api",
        "Generate the backend service with all API endpoints, controllers, and \
         services the frontend needs.",
    ),
    (
        "configuration_setup",
        "Generate all configuration files: package manifests, compiler settings, \
         an example environment file, a Dockerfile, and a compose file.",
    ),
    (
        "tests_documentation",
        "Generate a comprehensive test suite and complete documentation, \
         including a README and API reference.",
    ),
];

fn focused_instruction(focus: &str) -> String {
    format!(
        "{{base_prompt}}\n\n## Current Focus\n{focus}\n\nGenerate only this part with complete implementation."
    )
}

/// The four-stage plan: frontend, backend, configuration, then tests and
/// documentation. Each stage sees the output of every stage before it.
///
/// # Errors
///
/// Never fails in practice; the result type keeps construction validated.
pub fn staged() -> Result<StagePlan, InvalidStagePlan> {
    let mut builder = StagePlan::builder(STAGED).system_prompt(DEFAULT_SYSTEM_PROMPT);
    let mut earlier: Vec<&str> = Vec::new();

    for (name, focus) in STAGED_FOCUS {
        builder = builder.stage(
            Stage::new(name, focused_instruction(focus)).with_dependencies(earlier.iter().copied()),
        );
        earlier.push(name);
    }

    builder.build()
}

/// The one-shot plan: the whole prompt in a single request.
///
/// # Errors
///
/// Never fails in practice; the result type keeps construction validated.
pub fn single() -> Result<StagePlan, InvalidStagePlan> {
    StagePlan::builder(SINGLE)
        .system_prompt(DEFAULT_SYSTEM_PROMPT)
        .stage(Stage::new("complete", "{base_prompt}"))
        .build()
}

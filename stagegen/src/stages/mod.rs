//! Generation stages and stage plans.
//!
//! A [`Stage`] is one completion step. A [`StagePlan`] is an ordered list of
//! stages in which every stage only consumes the output of stages before it.

mod planner;
mod result;

pub use planner::{StagePlan, StagePlanBuilder};
pub use result::{StageResult, StageStatus};

use crate::prompt::PromptTemplate;
use serde::{Deserialize, Serialize};

/// How a stage's conversation begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageRole {
    /// The conversation starts with the plan's system prompt.
    #[default]
    System,
    /// The conversation holds user messages only.
    User,
}

impl std::fmt::Display for StageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
        }
    }
}

/// One generation step within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stage {
    /// Unique name within the plan.
    pub name: String,
    /// Instruction sent as the final user message.
    pub instruction: PromptTemplate,
    /// Earlier stages whose output is carried in as context, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Whether the stage starts with the system prompt.
    #[serde(default)]
    pub role: StageRole,
}

impl Stage {
    /// Creates a stage with no dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>, instruction: impl Into<PromptTemplate>) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            depends_on: Vec::new(),
            role: StageRole::default(),
        }
    }

    /// Adds a context dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.push(dep.into());
        self
    }

    /// Adds several context dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Sets the role.
    #[must_use]
    pub fn with_role(mut self, role: StageRole) -> Self {
        self.role = role;
        self
    }
}

//! Stage plan construction and validation.

use super::Stage;
use crate::errors::InvalidStagePlan;
use crate::output::slug;
use crate::prompt::PromptTemplate;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A validated, ordered list of stages.
///
/// Every `depends_on` entry names a stage that appears earlier in the plan,
/// so executing stages in order always has their context available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePlan {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_prompt: Option<PromptTemplate>,
    stages: Vec<Stage>,
}

impl StagePlan {
    /// Creates a validated plan.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStagePlan`] if the stages violate ordering or naming
    /// rules.
    pub fn new(
        name: impl Into<String>,
        system_prompt: Option<PromptTemplate>,
        stages: Vec<Stage>,
    ) -> Result<Self, InvalidStagePlan> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(InvalidStagePlan::new("Plan name must not be empty"));
        }
        validate_stages(&stages)?;
        Ok(Self {
            name,
            system_prompt,
            stages,
        })
    }

    /// Starts building a plan.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> StagePlanBuilder {
        StagePlanBuilder::new(name)
    }

    /// Returns the plan name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the system prompt, if any.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&PromptTemplate> {
        self.system_prompt.as_ref()
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a validated plan.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns the stage names in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns a plan holding only the named stages, in plan order.
    ///
    /// The subset is validated again, so a selected stage that depends on an
    /// unselected one is rejected rather than run without its context.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStagePlan`] for unknown names, an empty selection, or
    /// a dependency on an unselected stage.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, InvalidStagePlan> {
        let wanted: HashSet<&str> = names.iter().map(AsRef::as_ref).collect();

        let unknown: Vec<String> = wanted
            .iter()
            .filter(|n| self.stage(n).is_none())
            .map(|n| (*n).to_string())
            .collect();
        if !unknown.is_empty() {
            let mut unknown = unknown;
            unknown.sort();
            return Err(InvalidStagePlan::new(format!(
                "Plan '{}' has no stage named {}",
                self.name,
                unknown
                    .iter()
                    .map(|n| format!("'{n}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
            .with_stages(unknown));
        }

        let stages: Vec<Stage> = self
            .stages
            .iter()
            .filter(|s| wanted.contains(s.name.as_str()))
            .cloned()
            .collect();

        Self::new(self.name.clone(), self.system_prompt.clone(), stages)
    }
}

/// Builder for [`StagePlan`].
#[derive(Debug, Clone, Default)]
pub struct StagePlanBuilder {
    name: String,
    system_prompt: Option<PromptTemplate>,
    stages: Vec<Stage>,
}

impl StagePlanBuilder {
    /// Creates a builder for a plan with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<PromptTemplate>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validates and builds the plan.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStagePlan`] if validation fails.
    pub fn build(self) -> Result<StagePlan, InvalidStagePlan> {
        StagePlan::new(self.name, self.system_prompt, self.stages)
    }
}

/// Checks the ordering and naming rules of a stage list.
///
/// # Errors
///
/// Returns [`InvalidStagePlan`] describing the first violation found.
pub fn validate_stages(stages: &[Stage]) -> Result<(), InvalidStagePlan> {
    if stages.is_empty() {
        return Err(InvalidStagePlan::new("Plan has no stages"));
    }

    let all_names: HashSet<&str> = stages.iter().map(|s| s.name.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut artifact_dirs: HashMap<String, &str> = HashMap::new();

    for stage in stages {
        let name = stage.name.as_str();
        if name.trim().is_empty() {
            return Err(InvalidStagePlan::new("Stage name must not be empty"));
        }
        if seen.contains(name) {
            return Err(
                InvalidStagePlan::new(format!("Duplicate stage name '{name}'"))
                    .with_stages(vec![name.to_string()]),
            );
        }

        // Distinct names must not share an artifact directory.
        if let Some(other) = artifact_dirs.insert(slug(name), name) {
            return Err(InvalidStagePlan::new(format!(
                "Stages '{other}' and '{name}' would write to the same artifact directory '{}'",
                slug(name)
            ))
            .with_stages(vec![other.to_string(), name.to_string()]));
        }

        let mut deps: HashSet<&str> = HashSet::new();
        for dep in &stage.depends_on {
            let dep = dep.as_str();
            if dep == name {
                return Err(
                    InvalidStagePlan::new(format!("Stage '{name}' cannot depend on itself"))
                        .with_stages(vec![name.to_string()]),
                );
            }
            if !deps.insert(dep) {
                return Err(InvalidStagePlan::new(format!(
                    "Stage '{name}' lists dependency '{dep}' more than once"
                ))
                .with_stages(vec![name.to_string(), dep.to_string()]));
            }
            if !seen.contains(dep) {
                let message = if all_names.contains(dep) {
                    format!("Stage '{name}' depends on later stage '{dep}'")
                } else {
                    format!("Stage '{name}' depends on unknown stage '{dep}'")
                };
                return Err(InvalidStagePlan::new(message)
                    .with_stages(vec![name.to_string(), dep.to_string()]));
            }
        }

        seen.insert(name);
    }

    Ok(())
}

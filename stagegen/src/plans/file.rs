//! Stage plans defined in TOML files.
//!
//! ```toml
//! name = "api"
//! system_prompt = "You are an expert backend developer."
//!
//! [[stages]]
//! name = "schema"
//! instruction = "{base_prompt}\n\nDesign the data model."
//!
//! [[stages]]
//! name = "code"
//! instruction = "Implement the service."
//! depends_on = ["schema"]
//! role = "user"
//! ```

use crate::errors::StagegenError;
use crate::prompt::PromptTemplate;
use crate::stages::{Stage, StagePlan};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanFile {
    name: String,
    #[serde(default)]
    system_prompt: Option<PromptTemplate>,
    #[serde(default)]
    stages: Vec<Stage>,
}

/// Parses and validates a TOML plan.
///
/// # Errors
///
/// Returns [`StagegenError::Config`] if the document does not parse, or
/// [`StagegenError::InvalidStagePlan`] if the stages are invalid.
pub fn plan_from_toml_str(source: &str) -> Result<StagePlan, StagegenError> {
    let file: PlanFile = toml::from_str(source)
        .map_err(|e| StagegenError::Config(format!("invalid plan file: {e}")))?;
    Ok(StagePlan::new(file.name, file.system_prompt, file.stages)?)
}

/// Loads and validates a TOML plan file.
///
/// # Errors
///
/// Returns [`StagegenError::Config`] naming the path if the file cannot be
/// read or parsed, or [`StagegenError::InvalidStagePlan`].
pub fn load_plan(path: impl AsRef<Path>) -> Result<StagePlan, StagegenError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|e| {
        StagegenError::Config(format!("failed to read plan '{}': {}", path.display(), e))
    })?;
    plan_from_toml_str(&source).map_err(|e| match e {
        StagegenError::Config(msg) => StagegenError::Config(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::StageRole;
    use pretty_assertions::assert_eq;

    const PLAN: &str = r#"
        name = "api"
        system_prompt = "You are an expert backend developer."

        [[stages]]
        name = "schema"
        instruction = "Design {thing}."

        [[stages]]
        name = "code"
        instruction = "Implement it."
        depends_on = ["schema"]
        role = "user"
    "#;

    #[test]
    fn test_parse_plan() {
        let plan = plan_from_toml_str(PLAN).unwrap();

        assert_eq!(plan.name(), "api");
        assert_eq!(plan.stage_names(), vec!["schema", "code"]);
        assert_eq!(plan.stages()[0].role, StageRole::System);
        assert_eq!(plan.stages()[1].role, StageRole::User);
        assert_eq!(plan.stages()[1].depends_on, vec!["schema"]);
    }

    #[test]
    fn test_invalid_order_is_plan_error() {
        let source = r#"
            name = "bad"

            [[stages]]
            name = "code"
            instruction = "x"
            depends_on = ["schema"]

            [[stages]]
            name = "schema"
            instruction = "y"
        "#;

        assert!(matches!(
            plan_from_toml_str(source),
            Err(StagegenError::InvalidStagePlan(_))
        ));
    }

    #[test]
    fn test_no_stages_is_plan_error() {
        assert!(matches!(
            plan_from_toml_str("name = \"empty\""),
            Err(StagegenError::InvalidStagePlan(_))
        ));
    }

    #[test]
    fn test_load_plan_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"name = 3").unwrap();

        let err = load_plan(file.path()).unwrap_err();
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}

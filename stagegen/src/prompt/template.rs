//! Single-pass `{placeholder}` substitution.

use crate::errors::MissingSubstitution;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_.\-]*)\}")
            .unwrap_or_else(|e| unreachable!("placeholder pattern is valid: {e}"))
    })
}

/// Immutable prompt text with zero or more `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    /// Creates a template from its source text.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Returns the raw template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns the distinct placeholder names in first-occurrence order.
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for caps in token_pattern().captures_iter(&self.source) {
            if let Some(name) = caps.get(1) {
                if !names.contains(&name.as_str()) {
                    names.push(name.as_str());
                }
            }
        }
        names
    }

    /// Resolves every placeholder from `substitutions`.
    ///
    /// Resolution is one left-to-right pass: substituted values are inserted
    /// verbatim and never scanned for placeholders themselves.
    ///
    /// # Errors
    ///
    /// Returns [`MissingSubstitution`] naming the first placeholder that has
    /// no entry in `substitutions`.
    pub fn resolve(
        &self,
        substitutions: &HashMap<String, String>,
    ) -> Result<ResolvedPrompt, MissingSubstitution> {
        let mut missing: Option<String> = None;

        let rendered = token_pattern().replace_all(&self.source, |caps: &Captures<'_>| {
            match caps.get(1) {
                Some(name) => match substitutions.get(name.as_str()) {
                    Some(value) => value.clone(),
                    None => {
                        if missing.is_none() {
                            missing = Some(name.as_str().to_string());
                        }
                        String::new()
                    }
                },
                None if &caps[0] == "{{" => "{".to_string(),
                None => "}".to_string(),
            }
        });

        if let Some(name) = missing {
            return Err(MissingSubstitution::new(name));
        }

        Ok(ResolvedPrompt(rendered.into_owned()))
    }
}

impl From<&str> for PromptTemplate {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for PromptTemplate {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

/// Resolves `template` against `substitutions`.
///
/// # Errors
///
/// Returns [`MissingSubstitution`] if a placeholder has no value.
pub fn resolve(
    template: &PromptTemplate,
    substitutions: &HashMap<String, String>,
) -> Result<ResolvedPrompt, MissingSubstitution> {
    template.resolve(substitutions)
}

/// Prompt text with every placeholder substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedPrompt(String);

impl ResolvedPrompt {
    /// Returns the prompt text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the prompt and returns its text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResolvedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Loading template sources and substitution values.

use super::PromptTemplate;
use crate::errors::StagegenError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Placeholder name to replacement value.
pub type Substitutions = HashMap<String, String>;

/// Reads a template file.
///
/// # Errors
///
/// Returns [`StagegenError::Config`] naming the path if it cannot be read.
pub fn load_template(path: impl AsRef<Path>) -> Result<PromptTemplate, StagegenError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|e| {
        StagegenError::Config(format!(
            "failed to read prompt template '{}': {}",
            path.display(),
            e
        ))
    })?;
    tracing::debug!(path = %path.display(), chars = source.len(), "Loaded prompt template");
    Ok(PromptTemplate::new(source))
}

/// Parses a `KEY=VALUE` pair. Only the first `=` splits.
///
/// # Errors
///
/// Returns [`StagegenError::Config`] if there is no `=` or the key is empty.
pub fn parse_substitution(pair: &str) -> Result<(String, String), StagegenError> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(StagegenError::Config(format!(
            "invalid substitution '{pair}': expected KEY=VALUE"
        ))),
    }
}

/// Builds substitutions from `KEY=VALUE` pairs; later pairs win.
///
/// # Errors
///
/// Returns the first malformed pair.
pub fn substitutions_from_pairs<I, S>(pairs: I) -> Result<Substitutions, StagegenError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    pairs
        .into_iter()
        .map(|pair| parse_substitution(pair.as_ref()))
        .collect()
}

//! Persistence of generated stage text.
//!
//! Writers are keyed by stage name: writing the same stage twice leaves one
//! artifact holding the second text.

mod fs;
mod memory;

pub use fs::{atomic_write, FsOutputWriter};
pub use memory::InMemoryOutputWriter;

use crate::errors::PersistenceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File name each stage's text is written to by default.
pub const DEFAULT_ARTIFACT_FILE_NAME: &str = "code.txt";

/// A persisted stage output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// The stage that produced the text.
    pub stage_name: String,
    /// Path or key the text was written to.
    pub location: String,
    /// Number of bytes written.
    pub bytes: u64,
    /// When the write completed.
    pub written_at: DateTime<Utc>,
}

impl Artifact {
    /// Creates an artifact stamped with the current time.
    #[must_use]
    pub fn new(stage_name: impl Into<String>, location: impl Into<String>, bytes: u64) -> Self {
        Self {
            stage_name: stage_name.into(),
            location: location.into(),
            bytes,
            written_at: Utc::now(),
        }
    }
}

/// Destination for generated stage text.
#[async_trait]
pub trait OutputWriter: Send + Sync {
    /// Writes `text` as the artifact of `stage_name`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the text could not be stored. A failed
    /// write never leaves a partially written artifact behind.
    async fn write(&self, stage_name: &str, text: &str) -> Result<Artifact, PersistenceError>;

    /// Reads back the artifact of `stage_name`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the artifact exists but cannot be read.
    async fn read(&self, stage_name: &str) -> Result<Option<String>, PersistenceError>;
}

#[async_trait]
impl<T: OutputWriter + ?Sized> OutputWriter for std::sync::Arc<T> {
    async fn write(&self, stage_name: &str, text: &str) -> Result<Artifact, PersistenceError> {
        (**self).write(stage_name, text).await
    }

    async fn read(&self, stage_name: &str) -> Result<Option<String>, PersistenceError> {
        (**self).read(stage_name).await
    }
}

/// Turns a stage name into a directory name: lowercase, with every run of
/// non-alphanumeric characters collapsed to one `_`.
///
/// The mapping is not one-to-one, so plan validation rejects stages whose
/// names share a slug.
#[must_use]
pub fn slug(stage_name: &str) -> String {
    let mut out = String::with_capacity(stage_name.len());
    let mut pending_sep = false;

    for ch in stage_name.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }

    if out.is_empty() {
        out.push_str("stage");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("Frontend Components"), "frontend_components");
        assert_eq!(slug("Configuration & Setup"), "configuration_setup");
        assert_eq!(slug("backend_api"), "backend_api");
        assert_eq!(slug("../etc"), "etc");
        assert_eq!(slug("???"), "stage");
    }

    #[test]
    fn test_artifact_new() {
        let artifact = Artifact::new("schema", "out/schema/code.txt", 5);
        assert_eq!(artifact.stage_name, "schema");
        assert_eq!(artifact.bytes, 5);
    }
}

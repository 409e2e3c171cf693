//! In-memory output writer.

use super::{Artifact, OutputWriter};
use crate::errors::PersistenceError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Keeps stage text in a map. Useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryOutputWriter {
    artifacts: RwLock<HashMap<String, String>>,
}

impl InMemoryOutputWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }

    /// Returns the stored text for a stage.
    #[must_use]
    pub fn get(&self, stage_name: &str) -> Option<String> {
        self.artifacts.read().get(stage_name).cloned()
    }
}

#[async_trait]
impl OutputWriter for InMemoryOutputWriter {
    async fn write(&self, stage_name: &str, text: &str) -> Result<Artifact, PersistenceError> {
        self.artifacts
            .write()
            .insert(stage_name.to_string(), text.to_string());
        Ok(Artifact::new(
            stage_name,
            format!("memory://{stage_name}"),
            text.len() as u64,
        ))
    }

    async fn read(&self, stage_name: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.get(stage_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_is_idempotent_per_stage() {
        let writer = InMemoryOutputWriter::new();
        writer.write("a", "one").await.unwrap();
        writer.write("a", "two").await.unwrap();

        assert_eq!(writer.len(), 1);
        assert_eq!(writer.read("a").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_read_missing() {
        let writer = InMemoryOutputWriter::new();
        assert!(writer.is_empty());
        assert_eq!(writer.read("a").await.unwrap(), None);
    }
}

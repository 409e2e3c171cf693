//! Filesystem output writer.
//!
//! Each stage gets its own directory under the output root:
//! `<root>/<slug(stage)>/<file_name>`. Writes go to a temporary file in the
//! same directory, are synced, then renamed over the target, so a crash
//! leaves either the old artifact or the new one and never a truncated file.

use super::{slug, Artifact, OutputWriter, DEFAULT_ARTIFACT_FILE_NAME};
use crate::errors::PersistenceError;
use async_trait::async_trait;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes stage text to files under a root directory.
#[derive(Debug, Clone)]
pub struct FsOutputWriter {
    root: PathBuf,
    file_name: String,
}

impl FsOutputWriter {
    /// Creates a writer rooted at `root` using the default file name.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            file_name: DEFAULT_ARTIFACT_FILE_NAME.to_string(),
        }
    }

    /// Sets the per-stage file name.
    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Returns the output root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path a stage's artifact is written to.
    #[must_use]
    pub fn path_for(&self, stage_name: &str) -> PathBuf {
        self.root.join(slug(stage_name)).join(&self.file_name)
    }
}

#[async_trait]
impl OutputWriter for FsOutputWriter {
    async fn write(&self, stage_name: &str, text: &str) -> Result<Artifact, PersistenceError> {
        let path = self.path_for(stage_name);
        let content = text.as_bytes().to_vec();
        let target = path.clone();

        tokio::task::spawn_blocking(move || atomic_write(&target, &content))
            .await
            .map_err(|e| PersistenceError::new(stage_name, format!("write task failed: {e}")))?
            .map_err(|e| {
                PersistenceError::new(stage_name, format!("{}: {}", path.display(), e))
            })?;

        debug!(stage = stage_name, path = %path.display(), bytes = text.len(), "Wrote artifact");

        Ok(Artifact::new(
            stage_name,
            path.display().to_string(),
            text.len() as u64,
        ))
    }

    async fn read(&self, stage_name: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(stage_name);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::new(
                stage_name,
                format!("{}: {}", path.display(), e),
            )),
        }
    }
}

/// Writes `content` to `path` by way of a synced temporary sibling file.
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns the underlying I/O error. The temporary file is removed on
/// failure.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid file path"))?;
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    let result = write_and_sync(&temp_path, content).and_then(|()| fs::rename(&temp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_and_sync(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}

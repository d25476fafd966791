//! Local persistence of captured artifacts.

use anyhow::{Context, Result};
use std::path::Path;

/// Destination for captured artifacts.
pub trait ArtifactSink {
    /// Create a directory and any missing parents. Idempotent.
    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Write a text artifact, replacing any existing file.
    fn write_file(&self, path: &Path, contents: &str) -> Result<()>;
}

/// Sink that writes straight to the local filesystem.
pub struct FsSink;

impl ArtifactSink for FsSink {
    fn create_dir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

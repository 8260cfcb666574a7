//! Calendar artifact writer used on the finalize path.

use std::fs;
use std::path::PathBuf;

use crate::core::errors::CollaboratorError;

pub trait ArtifactWriter {
    /// Persist `contents` as `file_name`; returns the written path.
    fn write_artifact(&self, file_name: &str, contents: &str) -> Result<String, CollaboratorError>;
}

/// Writes artifacts into a directory, creating it on demand.
#[derive(Debug, Clone)]
pub struct DirArtifactWriter {
    dir: PathBuf,
}

impl DirArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ArtifactWriter for DirArtifactWriter {
    fn write_artifact(&self, file_name: &str, contents: &str) -> Result<String, CollaboratorError> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            CollaboratorError::Resource(format!("create {}: {err}", self.dir.display()))
        })?;
        let path = self.dir.join(file_name);
        fs::write(&path, contents)
            .map_err(|err| CollaboratorError::Resource(format!("write {}: {err}", path.display())))?;
        Ok(path.display().to_string())
    }
}

//! Project persistence collaborator
//!
//! The engine never decides when bytes hit the disk; it hands the updated
//! state to a [`ProjectStore`] after every mutation and before invalidating
//! the affected previews.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::state::ProjectState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid project file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Receives project state after each mutation
pub trait ProjectStore: Send + Sync {
    fn persist(&self, state: &ProjectState) -> Result<(), StoreError>;
}

/// `project.json` next to the template document
#[derive(Debug, Clone)]
pub struct JsonProjectStore {
    path: PathBuf,
}

impl JsonProjectStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the project file (and usually the template)
    pub fn project_dir(&self) -> PathBuf {
        self.path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Read the project file; missing keys fall back to defaults
    pub fn load(&self) -> Result<ProjectState, StoreError> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl ProjectStore for JsonProjectStore {
    fn persist(&self, state: &ProjectState) -> Result<(), StoreError> {
        let dir = self.project_dir();
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(state)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

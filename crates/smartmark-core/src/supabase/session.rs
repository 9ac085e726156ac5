//! Session persistence
//!
//! The signed-in session is kept as JSON at `{data_dir}/session.json`.
//! Writes go to a temp file first and are renamed into place so the file is
//! never left half-written.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::Session;

/// On-disk session store
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the stored session
    ///
    /// Returns `None` if no session has been saved.
    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session from {:?}", self.path))?;
        let session = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session from {:?}", self.path))?;
        Ok(Some(session))
    }

    /// Save the session using an atomic write
    pub fn save(&self, session: &Session) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(session).context("Failed to serialize session")?;
        atomic_write(&self.path, &bytes)
            .with_context(|| format!("Failed to save session to {:?}", self.path))
    }

    /// Remove the stored session, if any
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove session {:?}", self.path))?;
        }
        Ok(())
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;
    file.write_all(data)
        .with_context(|| format!("Failed to write to temp file {:?}", temp_path))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync temp file {:?}", temp_path))?;

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;
    Ok(())
}

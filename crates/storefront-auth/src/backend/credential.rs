//! On-disk copy of the backend session cookie.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A session cookie saved between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCredential {
    pub cookie_name: String,
    pub value: String,
    pub saved_at: DateTime<Utc>,
}

/// JSON file holding at most one [`PersistedCredential`].
#[derive(Debug, Clone)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Credential file inside a state directory.
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved credential. A missing file is not an error.
    pub fn load(&self) -> Result<Option<PersistedCredential>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let credential = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(Some(credential))
    }

    /// Save a credential, replacing any previous one.
    pub fn save(&self, cookie_name: &str, value: &str) -> Result<PersistedCredential> {
        let credential = PersistedCredential {
            cookie_name: cookie_name.to_string(),
            value: value.to_string(),
            saved_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content =
            serde_json::to_string_pretty(&credential).context("serializing session credential")?;
        fs::write(&self.path, content)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(credential)
    }

    /// Delete the saved credential. Returns whether a file was removed.
    pub fn remove(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("removing {}", self.path.display())),
        }
    }
}

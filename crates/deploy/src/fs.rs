//! File system utils.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};

/// Name of the sentinel file marking a deployment root created by this tool.
pub const MARKER_FILENAME: &str = ".created_by_script";

pub struct FsHandler;

impl FsHandler {
    /// Create a directory (and its parents) if it doesn't exist.
    pub fn create_dir(path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| DeployError::io(path, e))?;
        tracing::debug!("Created directory: {}", path.display());
        Ok(())
    }

    /// Mark a file as executable (`0755`).
    pub fn set_executable(path: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(
                |source| DeployError::Permission {
                    path: path.to_path_buf(),
                    source,
                },
            )?;
        }

        #[cfg(not(unix))]
        {
            std::fs::metadata(path).map_err(|source| DeployError::Permission {
                path: path.to_path_buf(),
                source,
            })?;
        }

        tracing::trace!(path = %path.display(), "Marked as executable");
        Ok(())
    }

    /// Returns true if `path` is a regular file that can be opened for reading.
    pub fn is_readable_file(path: &Path) -> bool {
        path.is_file() && std::fs::File::open(path).is_ok()
    }

    /// Remove a directory and everything below it.
    pub fn remove_dir_all(path: &Path) -> Result<()> {
        std::fs::remove_dir_all(path).map_err(|e| DeployError::io(path, e))?;
        tracing::debug!("Removed directory: {}", path.display());
        Ok(())
    }
}

/// Sentinel recording that the deployment root was created by this tool.
///
/// Saved to `{root}/.created_by_script` right after the root is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentMarker {
    /// RFC 3339 timestamp of the root creation.
    pub created_at: String,
    /// Version of the tool that created the root.
    pub tool_version: String,
}

impl DeploymentMarker {
    pub fn new() -> Self {
        Self {
            created_at: chrono::Utc::now().to_rfc3339(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn path(root: &Path) -> PathBuf {
        root.join(MARKER_FILENAME)
    }

    /// Returns true if the root carries a marker.
    pub fn exists(root: &Path) -> bool {
        Self::path(root).is_file()
    }

    /// Write the marker into the root.
    pub fn save(&self, root: &Path) -> Result<()> {
        let path = Self::path(root);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DeployError::io(&path, std::io::Error::other(e)))?;
        std::fs::write(&path, json).map_err(|e| DeployError::io(&path, e))?;
        Ok(())
    }

    /// Load the marker of a root, if any.
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = Self::path(root);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| DeployError::io(&path, e))?;
        let marker = serde_json::from_str(&content)
            .map_err(|e| DeployError::io(&path, std::io::Error::other(e)))?;
        Ok(Some(marker))
    }
}

impl Default for DeploymentMarker {
    fn default() -> Self {
        Self::new()
    }
}

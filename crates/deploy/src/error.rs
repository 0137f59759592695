//! Error taxonomy for the deployment pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::plan::StackKind;

/// Boxed error used where the underlying failure comes from different backends
/// (HTTP client, local filesystem, Docker daemon).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the deployment components.
///
/// Every variant except [`DeployError::InvalidSelection`] is fatal: it unwinds to the
/// lifecycle controller, which triggers the rollback and exits with code 1.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Operator input outside the enumerated choices. Recovered by re-prompting.
    #[error("Invalid {choice} selection: {input:?}")]
    InvalidSelection { choice: &'static str, input: String },

    /// A choice is required but there is no interactive terminal to ask on.
    #[error("No interactive terminal to select the {choice}; pass {flag}")]
    NonInteractive {
        choice: &'static str,
        flag: &'static str,
    },

    /// An artifact could not be fetched from the content source.
    #[error("Failed to fetch {path} for stack {stack}")]
    ArtifactFetch {
        stack: String,
        path: String,
        #[source]
        source: BoxError,
    },

    /// An entrypoint could not be marked executable.
    #[error("Failed to set permissions on {}", path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file could not be written.
    #[error("Failed to write {key} to {}", path.display())]
    ConfigWrite {
        path: PathBuf,
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// A required value is empty or malformed.
    #[error("{0}")]
    Validation(String),

    /// A required artifact is missing or unreadable after provisioning.
    #[error("Stack {stack} is missing required artifact {}", path.display())]
    MissingArtifact { stack: StackKind, path: PathBuf },

    /// The shared volume could not be created.
    #[error("Failed to create shared volume {name}")]
    ResourceCreation {
        name: String,
        #[source]
        source: BoxError,
    },

    /// Filesystem failure outside of configuration writes.
    #[error("Filesystem operation failed on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The operator prompt could not be read.
    #[error("Failed to read operator input")]
    Prompt(#[source] std::io::Error),
}

impl DeployError {
    /// Returns true when the error must abort the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DeployError::InvalidSelection { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeployError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config_write(
        path: impl Into<PathBuf>,
        key: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        DeployError::ConfigWrite {
            path: path.into(),
            key: key.into(),
            source,
        }
    }
}

/// Result alias for the deployment components.
pub type Result<T, E = DeployError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_selection_is_not_fatal() {
        let err = DeployError::InvalidSelection {
            choice: "DA layer",
            input: "avail".to_string(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Invalid DA layer selection: \"avail\"");
    }

    #[test]
    fn test_missing_artifact_names_stack_and_path() {
        let err = DeployError::MissingArtifact {
            stack: StackKind::SingleSequencer,
            path: PathBuf::from("/tmp/root/stacks/single-sequencer/.env"),
        };
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Stack single-sequencer is missing required artifact /tmp/root/stacks/single-sequencer/.env"
        );
    }
}

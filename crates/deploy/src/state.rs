//! Detection of an existing deployment and ownership of the shared volume.

use std::path::Path;

use strum::IntoEnumIterator;

use crate::{
    docker::ContainerRuntime,
    error::{DeployError, Result},
    plan::StackKind,
    prompt::Prompter,
    provision::StackDirectory,
};

/// Volume used to hand the DA node authentication token to its consumers.
pub const SHARED_VOLUME_NAME: &str = "celestia-node-export";

/// Substrings identifying the containers of a stack.
///
/// Matching is by substring, so unrelated containers may be reported too.
pub fn container_patterns(kind: StackKind) -> &'static [&'static str] {
    match kind {
        StackKind::DaCelestia => &["celestia-app", "celestia-node", "da-celestia"],
        StackKind::SingleSequencer => &[
            "single-sequencer",
            "ev-node-evm-single",
            "ev-reth-sequencer",
        ],
        StackKind::Fullnode => &["fullnode", "ev-node-evm-full", "ev-reth-fullnode"],
    }
}

/// What an earlier deployment left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingState {
    /// The deployment root exists.
    pub directory_present: bool,
    /// Stacks with a directory under the deployment root.
    pub stacks_found: Vec<StackKind>,
    /// Running containers matching a stack pattern.
    pub containers_running: Vec<String>,
}

impl ExistingState {
    pub fn is_empty(&self) -> bool {
        !self.directory_present
            && self.stacks_found.is_empty()
            && self.containers_running.is_empty()
    }
}

/// Inspect the deployment root and the running containers.
///
/// An unreachable container engine is reported as a warning and treated as having no
/// running containers.
pub async fn detect_existing<R: ContainerRuntime>(root: &Path, runtime: &R) -> ExistingState {
    let directory_present = root.exists();

    let stacks_found = StackKind::iter()
        .filter(|kind| StackDirectory::new(root, *kind).path.is_dir())
        .collect();

    let containers_running = match runtime.running_containers().await {
        Ok(names) => names
            .into_iter()
            .filter(|name| {
                StackKind::iter().any(|kind| {
                    container_patterns(kind)
                        .iter()
                        .any(|pattern| name.contains(pattern))
                })
            })
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Could not list running containers, assuming none");
            Vec::new()
        }
    };

    let state = ExistingState {
        directory_present,
        stacks_found,
        containers_running,
    };

    tracing::debug!(?state, root = %root.display(), "Existing deployment state");

    state
}

/// Ask the operator whether to continue over an existing deployment.
///
/// `force` answers yes without asking. A headless run without `force` declines.
pub async fn confirm_overwrite(
    state: &ExistingState,
    root: &Path,
    prompter: &mut Prompter,
    force: bool,
) -> Result<bool> {
    if state.is_empty() {
        return Ok(true);
    }

    if state.directory_present {
        tracing::warn!(root = %root.display(), "Deployment directory already exists");
    }
    for kind in &state.stacks_found {
        tracing::warn!(stack = %kind, "Existing stack found");
    }
    for container in &state.containers_running {
        tracing::warn!(container, "Running container found");
    }

    if force {
        tracing::info!("Forced install, continuing over the existing deployment");
        return Ok(true);
    }

    match prompter
        .confirm("An existing deployment was found. Files will be overwritten. Continue?")
        .await?
    {
        Some(answer) => Ok(answer),
        None => {
            tracing::warn!("No interactive terminal to confirm, pass --force-install to overwrite");
            Ok(false)
        }
    }
}

/// Create the shared volume unless it already exists.
///
/// The existence check is not atomic with the creation; a single operator per host is
/// assumed.
pub async fn create_shared_volume_if_absent<R: ContainerRuntime>(
    runtime: &R,
    name: &str,
) -> Result<bool> {
    let exists = runtime
        .volume_exists(name)
        .await
        .map_err(|source| DeployError::ResourceCreation {
            name: name.to_string(),
            source,
        })?;

    if exists {
        tracing::info!(volume = name, "Shared volume already exists");
        return Ok(false);
    }

    runtime
        .create_volume(name)
        .await
        .map_err(|source| DeployError::ResourceCreation {
            name: name.to_string(),
            source,
        })?;

    tracing::info!(volume = name, "✓ Shared volume created");
    Ok(true)
}

//! Pre-flight validation of the provisioned stacks.

use crate::{
    error::{DeployError, Result},
    fs::FsHandler,
    manifest::StackManifest,
    plan::DeploymentPlan,
    provision::StackDirectory,
};

/// Check that every manifest artifact exists and is readable, stack by stack in plan order.
///
/// Read-only: runs after configuration and before any external resource is created.
/// Fails on the first missing artifact.
pub fn validate(plan: &DeploymentPlan, directories: &[StackDirectory]) -> Result<()> {
    for kind in plan.stacks() {
        let directory = directories
            .iter()
            .find(|directory| directory.kind == kind)
            .ok_or_else(|| DeployError::Validation(format!("Stack {kind} was not provisioned")))?;
        let manifest = StackManifest::for_stack(kind, plan);

        for (_, name) in manifest.targets()? {
            let path = directory.path.join(name);
            if !FsHandler::is_readable_file(&path) {
                return Err(DeployError::MissingArtifact { stack: kind, path });
            }
        }

        tracing::debug!(stack = %kind, "Stack artifacts validated");
    }

    tracing::info!("✓ All stack artifacts are in place");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempdir::TempDir;

    use super::*;
    use crate::plan::{DaLayer, SequencerTopology, StackKind};

    fn provision_stub(root: &Path, plan: &DeploymentPlan) -> Vec<StackDirectory> {
        plan.stacks()
            .into_iter()
            .map(|kind| {
                let directory = StackDirectory::new(root, kind);
                std::fs::create_dir_all(&directory.path).unwrap();
                for (_, name) in StackManifest::for_stack(kind, plan).targets().unwrap() {
                    std::fs::write(directory.path.join(name), "x").unwrap();
                }
                directory
            })
            .collect()
    }

    #[test]
    fn test_complete_stacks_validate() {
        let dir = TempDir::new("evstack-validate").unwrap();
        let plan = DeploymentPlan::new(
            Some(DaLayer::Celestia),
            SequencerTopology::SingleSequencer,
            true,
        );
        let directories = provision_stub(dir.path(), &plan);

        validate(&plan, &directories).unwrap();
    }

    #[test]
    fn test_first_missing_artifact_in_plan_order() {
        let dir = TempDir::new("evstack-validate").unwrap();
        let plan = DeploymentPlan::new(
            Some(DaLayer::Celestia),
            SequencerTopology::SingleSequencer,
            true,
        );
        let directories = provision_stub(dir.path(), &plan);

        let sequencer = StackDirectory::new(dir.path(), StackKind::SingleSequencer);
        let fullnode = StackDirectory::new(dir.path(), StackKind::Fullnode);
        std::fs::remove_file(fullnode.env_path()).unwrap();
        std::fs::remove_file(sequencer.path.join("genesis.json")).unwrap();

        match validate(&plan, &directories).unwrap_err() {
            DeployError::MissingArtifact { stack, path } => {
                assert_eq!(stack, StackKind::SingleSequencer);
                assert_eq!(path, sequencer.path.join("genesis.json"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_directory_in_place_of_file_is_missing() {
        let dir = TempDir::new("evstack-validate").unwrap();
        let plan = DeploymentPlan::new(None, SequencerTopology::SingleSequencer, false);
        let directories = provision_stub(dir.path(), &plan);

        let sequencer = &directories[0];
        std::fs::remove_file(sequencer.compose_path()).unwrap();
        std::fs::create_dir(sequencer.compose_path()).unwrap();

        assert!(matches!(
            validate(&plan, &directories),
            Err(DeployError::MissingArtifact { .. })
        ));
    }
}

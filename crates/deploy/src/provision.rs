//! Stack provisioning: fetching every manifest artifact into its stack directory.

use std::path::{Path, PathBuf};

use crate::{
    error::{DeployError, Result},
    fs::FsHandler,
    manifest::{COMPOSE_FILENAME, ENV_FILENAME, SHARED_LIB_DIR, StackManifest},
    plan::{DeploymentPlan, StackKind},
    source::ContentSource,
};

/// Directory holding every stack directory inside the deployment root.
pub const STACKS_DIR: &str = "stacks";

/// The directory owned by one stack: `{root}/stacks/{stack}/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDirectory {
    pub kind: StackKind,
    pub path: PathBuf,
}

impl StackDirectory {
    pub fn new(root: &Path, kind: StackKind) -> Self {
        Self {
            kind,
            path: root.join(STACKS_DIR).join(kind.dir_name()),
        }
    }

    /// Path of the stack's environment file.
    pub fn env_path(&self) -> PathBuf {
        self.path.join(ENV_FILENAME)
    }

    /// Path of the stack's compose descriptor.
    pub fn compose_path(&self) -> PathBuf {
        self.path.join(COMPOSE_FILENAME)
    }
}

/// Fetches stack artifacts from a [`ContentSource`] into the deployment root.
pub struct Provisioner<'a> {
    source: &'a ContentSource,
    root: &'a Path,
}

impl<'a> Provisioner<'a> {
    pub fn new(source: &'a ContentSource, root: &'a Path) -> Self {
        Self { source, root }
    }

    /// Provision the shared scripts and every stack of the plan, in plan order.
    ///
    /// Any fetch failure aborts the whole run: a partially provisioned stack would pass
    /// later steps incorrectly.
    pub async fn provision(&self, plan: &DeploymentPlan) -> Result<Vec<StackDirectory>> {
        self.fetch_into(&StackManifest::shared(), &self.root.join(SHARED_LIB_DIR))
            .await?;

        let mut directories = Vec::new();
        for kind in plan.stacks() {
            let directory = StackDirectory::new(self.root, kind);
            let manifest = StackManifest::for_stack(kind, plan);

            tracing::info!(
                stack = %kind,
                path = %directory.path.display(),
                source = %self.source,
                "Provisioning stack..."
            );

            self.fetch_into(&manifest, &directory.path).await?;
            directories.push(directory);
        }

        Ok(directories)
    }

    async fn fetch_into(&self, manifest: &StackManifest, dest: &Path) -> Result<()> {
        let targets = manifest.targets()?;
        FsHandler::create_dir(dest)?;

        for (artifact, name) in targets {
            let target = dest.join(name);

            // Operator values and generated secrets live in the environment file.
            if name == ENV_FILENAME && target.exists() {
                tracing::debug!(
                    path = %target.display(),
                    "Keeping existing environment file"
                );
                continue;
            }

            let content = self
                .source
                .fetch(&artifact.source_path)
                .await
                .map_err(|source| DeployError::ArtifactFetch {
                    stack: manifest.label.clone(),
                    path: artifact.source_path.clone(),
                    source,
                })?;

            tokio::fs::write(&target, content)
                .await
                .map_err(|e| DeployError::io(&target, e))?;

            tracing::debug!(
                stack = %manifest.label,
                from = %artifact.source_path,
                to = %target.display(),
                "Artifact fetched"
            );
        }

        for entrypoint in manifest.entrypoints() {
            FsHandler::set_executable(&dest.join(entrypoint))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;
    use crate::plan::{DaLayer, SequencerTopology};

    fn write(root: &Path, path: &str, content: &str) {
        let path = root.join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn mirror() -> TempDir {
        let dir = TempDir::new("evstack-mirror").unwrap();
        let root = dir.path();
        write(root, "lib/logging.sh", "log() { echo \"$@\"; }\n");
        write(root, "stacks/single-sequencer/docker-compose.yml", "standalone\n");
        write(
            root,
            "stacks/single-sequencer/docker-compose.da.celestia.yml",
            "with-da\n",
        );
        write(root, "stacks/single-sequencer/.env", "CHAIN_ID=\n");
        write(root, "stacks/single-sequencer/genesis.json", "{}\n");
        write(
            root,
            "stacks/single-sequencer/entrypoint.sequencer.sh",
            "#!/bin/sh\n",
        );
        dir
    }

    fn sequencer_only() -> DeploymentPlan {
        DeploymentPlan::new(None, SequencerTopology::SingleSequencer, false)
    }

    #[tokio::test]
    async fn test_provision_flattens_and_marks_entrypoints() {
        let mirror = mirror();
        let deploy = TempDir::new("evstack-root").unwrap();
        let source = ContentSource::Local {
            root: mirror.path().to_path_buf(),
        };

        let dirs = Provisioner::new(&source, deploy.path())
            .provision(&sequencer_only())
            .await
            .unwrap();

        assert_eq!(dirs.len(), 1);
        let sequencer = &dirs[0];
        assert_eq!(
            sequencer.path,
            deploy.path().join("stacks/single-sequencer")
        );
        assert_eq!(
            std::fs::read_to_string(sequencer.compose_path()).unwrap(),
            "standalone\n"
        );
        assert!(deploy.path().join("lib/logging.sh").is_file());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(sequencer.path.join("entrypoint.sequencer.sh"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[tokio::test]
    async fn test_missing_artifact_aborts_with_fetch_error() {
        let mirror = mirror();
        let deploy = TempDir::new("evstack-root").unwrap();
        let source = ContentSource::Local {
            root: mirror.path().to_path_buf(),
        };
        let plan = DeploymentPlan::new(
            Some(DaLayer::Celestia),
            SequencerTopology::SingleSequencer,
            false,
        );

        let err = Provisioner::new(&source, deploy.path())
            .provision(&plan)
            .await
            .unwrap_err();

        match err {
            DeployError::ArtifactFetch { stack, path, .. } => {
                assert_eq!(stack, "da-celestia");
                assert_eq!(path, "stacks/da-celestia/docker-compose.yml");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_existing_env_file_is_kept() {
        let mirror = mirror();
        let deploy = TempDir::new("evstack-root").unwrap();
        let source = ContentSource::Local {
            root: mirror.path().to_path_buf(),
        };
        let provisioner = Provisioner::new(&source, deploy.path());

        let dirs = provisioner.provision(&sequencer_only()).await.unwrap();
        std::fs::write(dirs[0].env_path(), "CHAIN_ID=\"mychain\"\n").unwrap();
        std::fs::write(dirs[0].compose_path(), "edited\n").unwrap();

        provisioner.provision(&sequencer_only()).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dirs[0].env_path()).unwrap(),
            "CHAIN_ID=\"mychain\"\n"
        );
        assert_eq!(
            std::fs::read_to_string(dirs[0].compose_path()).unwrap(),
            "standalone\n"
        );
    }
}

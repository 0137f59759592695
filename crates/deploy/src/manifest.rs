//! Static artifact manifests, one per stack kind.

use std::path::{Component, Path};

use crate::{
    error::{DeployError, Result},
    plan::{DeploymentPlan, StackKind},
};

/// Canonical compose descriptor file name inside a stack directory.
pub const COMPOSE_FILENAME: &str = "docker-compose.yml";
/// Environment file name inside a stack directory.
pub const ENV_FILENAME: &str = ".env";
/// Compose descriptor variant used when the DA layer is deployed alongside.
pub const DA_COMPOSE_DESCRIPTOR: &str = "docker-compose.da.celestia.yml";
/// Directory holding the scripts shared by every stack.
pub const SHARED_LIB_DIR: &str = "lib";

/// A file fetched from the content source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Path relative to the artifact base.
    pub source_path: String,
    /// File name to write, when it differs from the source file name.
    pub rename: Option<&'static str>,
    /// Whether the file is an entrypoint that must be executable.
    pub entrypoint: bool,
}

impl Artifact {
    fn file(source_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            rename: None,
            entrypoint: false,
        }
    }

    fn entrypoint(source_path: impl Into<String>) -> Self {
        Self {
            entrypoint: true,
            ..Self::file(source_path)
        }
    }

    fn renamed(source_path: impl Into<String>, rename: &'static str) -> Self {
        Self {
            rename: Some(rename),
            ..Self::file(source_path)
        }
    }

    /// The file name written inside the destination directory.
    ///
    /// The manifest directory structure is flattened: only the last component is kept.
    /// Returns `None` for paths that could escape the destination directory.
    pub fn target_name(&self) -> Option<&str> {
        let path = Path::new(&self.source_path);
        let well_formed = path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !well_formed {
            return None;
        }

        match self.rename {
            Some(rename) => Some(rename),
            None => path.file_name().and_then(|name| name.to_str()),
        }
    }
}

/// The required artifacts of one stack (or of the shared library directory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackManifest {
    /// Label used in logs and errors.
    pub label: String,
    pub artifacts: Vec<Artifact>,
}

impl StackManifest {
    /// Scripts shared by every stack, written to `lib/`.
    pub fn shared() -> Self {
        Self {
            label: SHARED_LIB_DIR.to_string(),
            artifacts: vec![Artifact::file(format!("{SHARED_LIB_DIR}/logging.sh"))],
        }
    }

    /// The manifest of a stack for the given plan.
    ///
    /// The compose descriptor of the sequencer and full-node stacks depends on whether the
    /// DA layer is part of the plan; either way it is written as [`COMPOSE_FILENAME`].
    pub fn for_stack(kind: StackKind, plan: &DeploymentPlan) -> Self {
        let dir = format!("stacks/{}", kind.dir_name());
        let compose = if kind.depends_on_da() && plan.has_da() {
            Artifact::renamed(format!("{dir}/{DA_COMPOSE_DESCRIPTOR}"), COMPOSE_FILENAME)
        } else {
            Artifact::file(format!("{dir}/{COMPOSE_FILENAME}"))
        };

        let mut artifacts = vec![compose, Artifact::file(format!("{dir}/{ENV_FILENAME}"))];

        match kind {
            StackKind::DaCelestia => {
                artifacts.push(Artifact::entrypoint(format!("{dir}/entrypoint.appd.sh")));
                artifacts.push(Artifact::entrypoint(format!("{dir}/entrypoint.da.sh")));
            }
            StackKind::SingleSequencer => {
                artifacts.push(Artifact::file(format!("{dir}/genesis.json")));
                artifacts.push(Artifact::entrypoint(format!(
                    "{dir}/entrypoint.sequencer.sh"
                )));
            }
            StackKind::Fullnode => {
                artifacts.push(Artifact::file(format!("{dir}/genesis.json")));
                artifacts.push(Artifact::entrypoint(format!("{dir}/entrypoint.fullnode.sh")));
            }
        }

        Self {
            label: kind.to_string(),
            artifacts,
        }
    }

    /// Pair every artifact with its flattened file name.
    ///
    /// Fails if an artifact would resolve outside the destination directory or if two
    /// artifacts flatten to the same name.
    pub fn targets(&self) -> Result<Vec<(&Artifact, &str)>> {
        let mut targets: Vec<(&Artifact, &str)> = Vec::with_capacity(self.artifacts.len());

        for artifact in &self.artifacts {
            let name = artifact.target_name().ok_or_else(|| {
                DeployError::Validation(format!(
                    "Manifest entry {} of {} escapes its stack directory",
                    artifact.source_path, self.label
                ))
            })?;

            if targets.iter().any(|(_, existing)| *existing == name) {
                return Err(DeployError::Validation(format!(
                    "Manifest of {} writes {} twice",
                    self.label, name
                )));
            }

            targets.push((artifact, name));
        }

        Ok(targets)
    }

    /// Flattened names of the entrypoints.
    pub fn entrypoints(&self) -> impl Iterator<Item = &str> {
        self.artifacts
            .iter()
            .filter(|artifact| artifact.entrypoint)
            .filter_map(Artifact::target_name)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::plan::{DaLayer, SequencerTopology};

    fn plan(da: bool) -> DeploymentPlan {
        DeploymentPlan::new(
            da.then_some(DaLayer::Celestia),
            SequencerTopology::SingleSequencer,
            true,
        )
    }

    #[test]
    fn test_every_manifest_flattens_inside_its_directory() {
        for da in [true, false] {
            for kind in StackKind::iter() {
                let manifest = StackManifest::for_stack(kind, &plan(da));
                let targets = manifest.targets().unwrap();
                assert_eq!(targets.len(), manifest.artifacts.len());
                for (artifact, name) in targets {
                    assert!(!name.contains('/'), "{name} is not flat");
                    assert!(artifact.source_path.starts_with("stacks/"));
                }
            }
        }
        assert!(StackManifest::shared().targets().is_ok());
    }

    #[test]
    fn test_compose_descriptor_follows_da_selection() {
        let with_da = StackManifest::for_stack(StackKind::SingleSequencer, &plan(true));
        assert_eq!(
            with_da.artifacts[0].source_path,
            "stacks/single-sequencer/docker-compose.da.celestia.yml"
        );
        assert_eq!(with_da.artifacts[0].target_name(), Some(COMPOSE_FILENAME));

        let standalone = StackManifest::for_stack(StackKind::Fullnode, &plan(false));
        assert_eq!(
            standalone.artifacts[0].source_path,
            "stacks/fullnode/docker-compose.yml"
        );
        assert_eq!(standalone.artifacts[0].target_name(), Some(COMPOSE_FILENAME));

        // The DA stack always uses its own descriptor.
        let da = StackManifest::for_stack(StackKind::DaCelestia, &plan(true));
        assert_eq!(da.artifacts[0].source_path, "stacks/da-celestia/docker-compose.yml");
    }

    #[test]
    fn test_entrypoints() {
        let da = StackManifest::for_stack(StackKind::DaCelestia, &plan(true));
        assert_eq!(
            da.entrypoints().collect::<Vec<_>>(),
            vec!["entrypoint.appd.sh", "entrypoint.da.sh"]
        );
    }

    #[test]
    fn test_escaping_paths_are_rejected() {
        let manifest = StackManifest {
            label: "bad".to_string(),
            artifacts: vec![Artifact::file("stacks/../../etc/passwd")],
        };
        assert!(matches!(
            manifest.targets(),
            Err(DeployError::Validation(_))
        ));

        let absolute = Artifact::file("/etc/passwd");
        assert_eq!(absolute.target_name(), None);
    }

    #[test]
    fn test_duplicate_targets_are_rejected() {
        let manifest = StackManifest {
            label: "dup".to_string(),
            artifacts: vec![
                Artifact::file("stacks/a/docker-compose.yml"),
                Artifact::renamed("stacks/a/docker-compose.da.celestia.yml", COMPOSE_FILENAME),
            ],
        };
        assert!(manifest.targets().is_err());
    }
}

//! Final status report of a successful run.

use std::path::{Path, PathBuf};

use comfy_table::{Table, presets::UTF8_FULL};

use crate::provision::StackDirectory;

/// State of the shared volume at the end of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum VolumeStatus {
    #[strum(serialize = "created")]
    Created,
    #[strum(serialize = "already present")]
    Existing,
    #[strum(serialize = "skipped (dry run)")]
    SkippedDryRun,
    #[strum(serialize = "not required")]
    NotRequired,
}

/// What a successful run left on disk and how to start it.
#[derive(Debug, Clone)]
pub struct DeploymentReport {
    pub root: PathBuf,
    pub directories: Vec<StackDirectory>,
    pub dry_run: bool,
    pub shared_volume: String,
    pub volume: VolumeStatus,
}

impl DeploymentReport {
    /// Command starting a stack from its directory.
    pub fn start_command(directory: &Path) -> String {
        format!("cd {} && docker compose up -d", directory.display())
    }

    /// Stacks with their directory and start command, in start order.
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Stack", "Directory", "Start command"]);

        for directory in &self.directories {
            table.add_row(vec![
                directory.kind.to_string(),
                directory.path.display().to_string(),
                Self::start_command(&directory.path),
            ]);
        }

        table
    }

    /// Log the report.
    pub fn log(&self) {
        tracing::info!(root = %self.root.display(), "✓ Deployment prepared");
        if self.dry_run {
            tracing::info!("Dry run: no volume was created and no container was touched");
        }
        tracing::info!(
            volume = %self.shared_volume,
            status = %self.volume,
            "Shared volume"
        );
        tracing::info!("Start the stacks in this order:\n{}", self.table());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::StackKind;

    #[test]
    fn test_table_lists_stacks_in_order() {
        let root = Path::new("/srv/evstack");
        let report = DeploymentReport {
            root: root.to_path_buf(),
            directories: vec![
                StackDirectory::new(root, StackKind::DaCelestia),
                StackDirectory::new(root, StackKind::SingleSequencer),
            ],
            dry_run: false,
            shared_volume: "celestia-node-export".to_string(),
            volume: VolumeStatus::Created,
        };

        let rendered = report.table().to_string();
        let da = rendered.find("da-celestia").unwrap();
        let sequencer = rendered.find("single-sequencer").unwrap();
        assert!(da < sequencer);
        assert!(rendered.contains("cd /srv/evstack/stacks/da-celestia && docker compose up -d"));
    }

    #[test]
    fn test_volume_status_display() {
        assert_eq!(VolumeStatus::SkippedDryRun.to_string(), "skipped (dry run)");
        assert_eq!(VolumeStatus::Existing.to_string(), "already present");
    }
}

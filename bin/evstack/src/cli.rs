use std::path::PathBuf;

use clap::{ArgAction, Parser};
use evstack_deploy::{DaLayer, DeployConfig, DeployConfigBuilder, SequencerTopology};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "evstack")]
#[command(
    author,
    version,
    about = "Provision and configure the Docker Compose stacks of an evstack chain"
)]
pub struct Cli {
    /// Enable debug output.
    #[arg(short, long, env = "EVSTACK_VERBOSE")]
    pub verbose: bool,

    /// Also append logs to this file.
    #[arg(long, env = "EVSTACK_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Path to a TOML configuration file.
    ///
    /// Values from the file are overridden by `EVSTACK_*` environment variables and by
    /// the flags below.
    #[arg(long, alias = "conf", env = "EVSTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// The deployment root directory.
    ///
    /// If not provided, the stacks are deployed under $HOME/evstack.
    #[arg(long, alias = "deploy-root", env = "EVSTACK_DEPLOY_DIR")]
    pub deploy_dir: Option<PathBuf>,

    /// Run the file pipeline only: no volume is created and no container is touched.
    #[arg(long, env = "EVSTACK_DRY_RUN")]
    pub dry_run: bool,

    /// Continue over an existing deployment without asking.
    #[arg(long, env = "EVSTACK_FORCE_INSTALL")]
    pub force_install: bool,

    /// Leave the deployment in place when the run fails or is interrupted.
    #[arg(long, env = "EVSTACK_NO_CLEANUP")]
    pub no_cleanup: bool,

    /// Base URL of the stack artifacts, or a local directory mirroring them.
    #[arg(long, env = "EVSTACK_ARTIFACT_BASE")]
    pub artifact_base: Option<String>,

    /// Timeout of a single artifact download, in seconds.
    #[arg(long, env = "EVSTACK_FETCH_TIMEOUT")]
    pub fetch_timeout: Option<u64>,

    /// Rollup chain id. Asked for when missing from the environment files.
    #[arg(long, env = "EVSTACK_CHAIN_ID")]
    pub chain_id: Option<String>,

    /// Namespace written to the DA stack and propagated to the other stacks.
    #[arg(long, env = "EVSTACK_DA_NAMESPACE")]
    pub da_namespace: Option<String>,

    /// Stack selection. Anything not given here is asked for interactively.
    #[clap(flatten)]
    pub selection: SelectionArgs,
}

/// Non-interactive answers for the stack selection.
#[derive(Debug, Clone, Parser)]
pub struct SelectionArgs {
    /// The DA layer to deploy.
    #[arg(long, env = "EVSTACK_DA", conflicts_with = "no_da")]
    pub da: Option<DaLayer>,

    /// Deploy without a DA layer.
    #[arg(long, env = "EVSTACK_NO_DA")]
    pub no_da: bool,

    /// The sequencer topology.
    #[arg(long, env = "EVSTACK_TOPOLOGY")]
    pub topology: Option<SequencerTopology>,

    /// Deploy a full node.
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "no_fullnode")]
    pub fullnode: bool,

    /// Do not deploy a full node.
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_fullnode: bool,
}

impl SelectionArgs {
    fn fullnode(&self) -> Option<bool> {
        match (self.fullnode, self.no_fullnode) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

impl Cli {
    pub fn level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }

    /// Load the layered configuration and apply the explicit flags on top.
    pub fn deploy_config(&self) -> anyhow::Result<DeployConfig> {
        let loaded = DeployConfig::load(self.config.as_deref())?;

        // Boolean flags only ever switch a loaded setting on.
        let dry_run = loaded.dry_run || self.dry_run;
        let force_install = loaded.force_install || self.force_install;
        let no_cleanup = loaded.no_cleanup || self.no_cleanup;

        let mut builder = DeployConfigBuilder::from(loaded)
            .dry_run(dry_run)
            .force_install(force_install)
            .no_cleanup(no_cleanup)
            .fullnode(self.selection.fullnode());

        if let Some(root) = &self.deploy_dir {
            builder = builder.deployment_root(root);
        }
        if let Some(base) = &self.artifact_base {
            builder = builder.artifact_base(base);
        }
        if let Some(timeout) = self.fetch_timeout {
            builder = builder.fetch_timeout_secs(timeout);
        }
        if let Some(chain_id) = &self.chain_id {
            builder = builder.chain_id(chain_id);
        }
        if let Some(namespace) = &self.da_namespace {
            builder = builder.da_namespace(namespace);
        }
        if self.selection.no_da {
            builder = builder.no_da();
        } else if let Some(da) = self.selection.da {
            builder = builder.da(da);
        }
        if let Some(topology) = self.selection.topology {
            builder = builder.topology(topology);
        }

        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fullnode_flags() {
        let cli = Cli::parse_from(["evstack", "--no-fullnode", "--no-da"]);
        assert_eq!(cli.selection.fullnode(), Some(false));
        assert!(cli.selection.no_da);

        let cli = Cli::parse_from(["evstack", "--fullnode", "--da", "celestia"]);
        assert_eq!(cli.selection.fullnode(), Some(true));
        assert_eq!(cli.selection.da, Some(DaLayer::Celestia));

        assert!(Cli::try_parse_from(["evstack", "--fullnode", "--no-fullnode"]).is_err());
    }
}

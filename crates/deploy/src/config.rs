//! Run configuration.
//!
//! A [`DeployConfig`] is built once per run and handed to the [`crate::Orchestrator`]. It is
//! layered from built-in defaults, an optional TOML file and `EVSTACK_*` environment
//! variables; the command line applies its flags on top through [`DeployConfigBuilder`].

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
    plan::{DaLayer, PlanArgs, SequencerTopology},
    source::DEFAULT_ARTIFACT_BASE,
    state::SHARED_VOLUME_NAME,
};

/// Name of the default deployment root under the home directory.
pub const DEFAULT_ROOT_DIRNAME: &str = "evstack";

/// Default timeout of a single artifact fetch.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Prefix of the environment variables read by [`DeployConfig::load`].
pub const ENV_PREFIX: &str = "EVSTACK_";

/// Default deployment root: `$HOME/evstack`.
pub fn default_deployment_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(DEFAULT_ROOT_DIRNAME)
}

/// Immutable configuration of one deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Directory holding the marker, the shared scripts and the stacks.
    pub deployment_root: PathBuf,
    /// Base URL (or local mirror directory) the stack artifacts are fetched from.
    pub artifact_base: String,
    /// Run the file pipeline but skip volume creation and container actions.
    pub dry_run: bool,
    /// Continue over an existing deployment without asking.
    pub force_install: bool,
    /// Leave the deployment root and containers in place when the run fails.
    pub no_cleanup: bool,
    /// Timeout of a single artifact fetch, in seconds.
    pub fetch_timeout_secs: u64,
    /// Name of the volume shared between the DA stack and its consumers.
    pub shared_volume: String,
    /// Rollup chain id. Asked for when unset and absent from the environment files.
    pub chain_id: Option<String>,
    /// Namespace written to the DA stack.
    pub da_namespace: Option<String>,
    /// Non-interactive answers for the stack selection.
    #[serde(default)]
    pub selection: PlanArgs,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            deployment_root: default_deployment_root(),
            artifact_base: DEFAULT_ARTIFACT_BASE.to_string(),
            dry_run: false,
            force_install: false,
            no_cleanup: false,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            shared_volume: SHARED_VOLUME_NAME.to_string(),
            chain_id: None,
            da_namespace: None,
            selection: PlanArgs::default(),
        }
    }
}

impl DeployConfig {
    /// Load the configuration: defaults, then the TOML file (if any), then `EVSTACK_*`
    /// environment variables. Nested keys use `__`, e.g. `EVSTACK_SELECTION__FULLNODE`.
    ///
    /// Chain id and namespace are left to the command line layer, since numeric-looking
    /// environment values would not be read back as strings.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.is_file() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        let config: Self = figment
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .split("__")
                    .ignore(&["chain_id", "da_namespace"]),
            )
            .extract()
            .context("Failed to load the deployment configuration")?;

        tracing::debug!(?config, "Configuration loaded");
        Ok(config)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Returns true if a failed run should be rolled back.
    pub fn cleanup_on_error(&self) -> bool {
        !self.no_cleanup
    }
}

/// Builder for a [`DeployConfig`], used to apply explicit overrides on top of a loaded
/// configuration.
///
/// ```
/// use evstack_deploy::{DeployConfig, DeployConfigBuilder};
///
/// let config = DeployConfigBuilder::from(DeployConfig::default())
///     .deployment_root("/srv/evstack")
///     .dry_run(true)
///     .fullnode(Some(false))
///     .build();
/// assert!(config.dry_run);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeployConfigBuilder {
    config: DeployConfig,
}

impl From<DeployConfig> for DeployConfigBuilder {
    fn from(config: DeployConfig) -> Self {
        Self { config }
    }
}

impl DeployConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deployment_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.deployment_root = root.into();
        self
    }

    pub fn artifact_base(mut self, base: impl Into<String>) -> Self {
        self.config.artifact_base = base.into();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn force_install(mut self, force: bool) -> Self {
        self.config.force_install = force;
        self
    }

    pub fn no_cleanup(mut self, no_cleanup: bool) -> Self {
        self.config.no_cleanup = no_cleanup;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn shared_volume(mut self, name: impl Into<String>) -> Self {
        self.config.shared_volume = name.into();
        self
    }

    pub fn chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.config.chain_id = Some(chain_id.into());
        self
    }

    pub fn da_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.da_namespace = Some(namespace.into());
        self
    }

    /// Deploy this DA layer without asking.
    pub fn da(mut self, da: DaLayer) -> Self {
        self.config.selection.da = Some(da);
        self.config.selection.no_da = false;
        self
    }

    /// Deploy without a DA layer.
    pub fn no_da(mut self) -> Self {
        self.config.selection.da = None;
        self.config.selection.no_da = true;
        self
    }

    pub fn topology(mut self, topology: SequencerTopology) -> Self {
        self.config.selection.topology = Some(topology);
        self
    }

    /// Answer the full node question. `None` leaves it to the prompt.
    pub fn fullnode(mut self, fullnode: Option<bool>) -> Self {
        if fullnode.is_some() {
            self.config.selection.fullnode = fullnode;
        }
        self
    }

    pub fn build(self) -> DeployConfig {
        self.config
    }
}

//! evstack-deploy - Deployment library for evstack chains.
//!
//! This crate provisions and configures the Docker Compose stacks of an evstack chain
//! (sequencer, optional full node and optional Celestia DA node) on a single host.

mod config;
pub use config::{
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_ROOT_DIRNAME, DeployConfig, DeployConfigBuilder,
    ENV_PREFIX, default_deployment_root,
};

mod configure;
pub use configure::{
    CHAIN_ID_KEY, ConfigPatcher, DA_NAMESPACE_KEY, DA_TRUSTED_HASH_KEY, DA_TRUSTED_HEIGHT_KEY,
    SIGNER_PASSPHRASE_KEY, TX_WORKER_ACCOUNTS_KEY, generate_passphrase,
};

mod docker;
pub use docker::{ContainerRuntime, DockerRuntime};

mod env_file;
pub use env_file::EnvFile;

mod error;
pub use error::{BoxError, DeployError, Result};

mod fs;
pub use fs::{DeploymentMarker, FsHandler, MARKER_FILENAME};

mod lifecycle;
pub use lifecycle::{
    Orchestrator, RollbackGuard, RunStatus, ShutdownSignal, Stage, shutdown_signal,
};

mod manifest;
pub use manifest::{COMPOSE_FILENAME, ENV_FILENAME, StackManifest};

mod node_config;
pub use node_config::NodeConfigDocument;

mod plan;
pub use plan::{DaLayer, DeploymentPlan, PlanArgs, SequencerTopology, StackKind, select_plan};

mod prompt;
pub use prompt::Prompter;

mod provision;
pub use provision::{Provisioner, STACKS_DIR, StackDirectory};

mod report;
pub use report::{DeploymentReport, VolumeStatus};

mod source;
pub use source::{ContentSource, DEFAULT_ARTIFACT_BASE};

mod state;
pub use state::{ExistingState, SHARED_VOLUME_NAME, detect_existing};

mod validate;
pub use validate::validate;

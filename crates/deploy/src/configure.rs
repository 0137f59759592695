//! Configuration patching of provisioned stacks.
//!
//! Every rule is idempotent: patching a stack twice yields the same files as patching it
//! once. Stacks are patched in plan order so that values produced by the DA stack are in
//! place before they are propagated to the stacks consuming them.

use std::path::{Path, PathBuf};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

use crate::{
    env_file::EnvFile,
    error::{DeployError, Result},
    node_config::{NodeConfigDocument, toml_string},
    plan::{DeploymentPlan, StackKind},
    prompt::Prompter,
    provision::StackDirectory,
};

/// Passphrase of the sequencer signer key.
pub const SIGNER_PASSPHRASE_KEY: &str = "EVM_SIGNER_PASSPHRASE";
/// Chain id of the rollup.
pub const CHAIN_ID_KEY: &str = "CHAIN_ID";
/// Namespace the rollup publishes to and reads from on the DA layer.
pub const DA_NAMESPACE_KEY: &str = "DA_NAMESPACE";
/// Trusted checkpoint hash of the DA network.
pub const DA_TRUSTED_HASH_KEY: &str = "DA_TRUSTED_HASH";
/// Trusted checkpoint height of the DA network.
pub const DA_TRUSTED_HEIGHT_KEY: &str = "DA_TRUSTED_HEIGHT";
/// Number of parallel transaction worker accounts of the DA light node.
pub const TX_WORKER_ACCOUNTS_KEY: &str = "TX_WORKER_ACCOUNTS";

/// Keys produced by the DA stack and propagated to dependent stacks.
pub const DA_DERIVED_KEYS: &[&str] = &[DA_NAMESPACE_KEY];

/// Node configuration of the DA light node.
pub const DA_NODE_CONFIG: &str = "config.toml";
/// Application configuration of the DA app node.
pub const DA_APP_CONFIG: &str = "app.toml";
/// gRPC port of the DA app node.
pub const DA_APP_GRPC_PORT: u16 = 9090;

/// Random bytes in a generated passphrase.
const PASSPHRASE_BYTES: usize = 32;

/// Generate a signer passphrase: 32 bytes from a CSPRNG, URL-safe base64 without padding.
pub fn generate_passphrase() -> String {
    let mut bytes = [0u8; PASSPHRASE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Applies the configuration rules to the stacks of a plan.
pub struct ConfigPatcher<'a> {
    root: PathBuf,
    plan: &'a DeploymentPlan,
    prompter: &'a mut Prompter,
    /// Chain id given by the operator up front.
    explicit_chain_id: Option<String>,
    /// Chain id found or entered earlier in this run.
    resolved_chain_id: Option<String>,
    /// Namespace given by the operator up front, written to the DA stack.
    da_namespace: Option<String>,
}

impl<'a> ConfigPatcher<'a> {
    pub fn new(root: &Path, plan: &'a DeploymentPlan, prompter: &'a mut Prompter) -> Self {
        Self {
            root: root.to_path_buf(),
            plan,
            prompter,
            explicit_chain_id: None,
            resolved_chain_id: None,
            da_namespace: None,
        }
    }

    /// Use this chain id instead of the one in the environment files.
    pub fn chain_id(mut self, chain_id: Option<String>) -> Self {
        self.explicit_chain_id = chain_id;
        self
    }

    /// Write this namespace to the DA stack before propagating it.
    pub fn da_namespace(mut self, namespace: Option<String>) -> Self {
        self.da_namespace = namespace;
        self
    }

    /// Patch every stack directory, in the order given (the plan order).
    pub async fn patch_all(&mut self, directories: &[StackDirectory]) -> Result<()> {
        for directory in directories {
            self.patch(directory).await?;
        }
        Ok(())
    }

    /// Patch one stack directory in place.
    pub async fn patch(&mut self, directory: &StackDirectory) -> Result<()> {
        tracing::info!(stack = %directory.kind, "Configuring stack...");

        match directory.kind {
            StackKind::DaCelestia => self.patch_da(directory),
            StackKind::SingleSequencer => {
                let mut env = EnvFile::load(&directory.env_path())?;
                ensure_passphrase(&mut env);
                self.ensure_chain_id(&mut env).await?;
                self.propagate_da_values(&mut env)?;
                env.save()?;
                Ok(())
            }
            StackKind::Fullnode => {
                let mut env = EnvFile::load(&directory.env_path())?;
                self.ensure_chain_id(&mut env).await?;
                self.propagate_da_values(&mut env)?;
                env.save()?;
                Ok(())
            }
        }
    }

    async fn ensure_chain_id(&mut self, env: &mut EnvFile) -> Result<()> {
        if let Some(chain_id) = self.explicit_chain_id.clone() {
            let chain_id = validate_chain_id(&chain_id)?;
            env.set(CHAIN_ID_KEY, &chain_id);
            return Ok(());
        }

        if let Some(existing) = env.get(CHAIN_ID_KEY).filter(|value| !value.is_empty()) {
            match &self.resolved_chain_id {
                Some(resolved) if *resolved != existing => tracing::warn!(
                    path = %env.path().display(),
                    existing,
                    resolved,
                    "Chain id differs between stacks, keeping the existing value"
                ),
                Some(_) => {}
                None => self.resolved_chain_id = Some(existing),
            }
            return Ok(());
        }

        let chain_id = match self.resolved_chain_id.clone() {
            Some(chain_id) => chain_id,
            None => {
                let Some(answer) = self.prompter.ask("Enter the chain id:").await? else {
                    return Err(DeployError::Validation(
                        "Chain id is not set and there is no terminal to ask for it, pass --chain-id"
                            .to_string(),
                    ));
                };
                let chain_id = validate_chain_id(&answer)?;
                self.resolved_chain_id = Some(chain_id.clone());
                chain_id
            }
        };

        env.set(CHAIN_ID_KEY, &chain_id);
        tracing::info!(path = %env.path().display(), chain_id, "Chain id set");
        Ok(())
    }

    /// Copy DA-produced values into a dependent stack, or strip them without a DA layer.
    fn propagate_da_values(&self, env: &mut EnvFile) -> Result<()> {
        if !self.plan.has_da() {
            for key in DA_DERIVED_KEYS {
                if env.remove(key) {
                    tracing::debug!(key, path = %env.path().display(), "Removed DA value");
                }
            }
            return Ok(());
        }

        let da_stack = StackDirectory::new(&self.root, StackKind::DaCelestia);
        let da_env = EnvFile::load(&da_stack.env_path())?;
        for key in DA_DERIVED_KEYS {
            let value = da_env.get(key).unwrap_or_default();
            if value.is_empty() {
                tracing::warn!(
                    key,
                    path = %env.path().display(),
                    "DA value is empty, the stack will start without it"
                );
            }
            env.set(key, &value);
        }

        Ok(())
    }

    fn patch_da(&self, directory: &StackDirectory) -> Result<()> {
        let mut env = EnvFile::load(&directory.env_path())?;
        if let Some(namespace) = &self.da_namespace {
            env.set(DA_NAMESPACE_KEY, namespace);
        }
        env.save()?;

        let node_config = directory.path.join(DA_NODE_CONFIG);
        if node_config.is_file() {
            patch_da_node_config(&node_config, &env)?;
        } else {
            tracing::debug!(
                path = %node_config.display(),
                skipped = "State.TxWorkerAccounts, Header.TrustedHash, DASer.SampleFrom",
                "No DA node configuration to patch"
            );
        }

        let app_config = directory.path.join(DA_APP_CONFIG);
        if app_config.is_file() {
            patch_da_app_config(&app_config)?;
        } else {
            tracing::debug!(
                path = %app_config.display(),
                skipped = "grpc.enable, grpc.address",
                "No DA app configuration to patch"
            );
        }

        Ok(())
    }
}

/// Generate the signer passphrase unless a non-empty one exists. Returns true if generated.
fn ensure_passphrase(env: &mut EnvFile) -> bool {
    if env.has_value(SIGNER_PASSPHRASE_KEY) {
        return false;
    }

    env.set(SIGNER_PASSPHRASE_KEY, &generate_passphrase());
    tracing::info!(path = %env.path().display(), "Generated signer passphrase");
    true
}

fn validate_chain_id(chain_id: &str) -> Result<String> {
    let chain_id = chain_id.trim();
    if chain_id.is_empty() {
        return Err(DeployError::Validation("Chain id must not be empty".to_string()));
    }
    if chain_id.chars().any(|c| c.is_control() || c == '"') {
        return Err(DeployError::Validation(format!(
            "Chain id {chain_id:?} contains invalid characters"
        )));
    }
    Ok(chain_id.to_string())
}

fn numeric_value(env: &EnvFile, key: &str) -> Result<Option<String>> {
    match env.get(key).filter(|value| !value.is_empty()) {
        Some(value) if value.bytes().all(|b| b.is_ascii_digit()) => Ok(Some(value)),
        Some(value) => Err(DeployError::Validation(format!(
            "{key} must be a number, got {value:?}"
        ))),
        None => Ok(None),
    }
}

/// Patch the DA light node configuration from the DA environment file.
pub fn patch_da_node_config(path: &Path, env: &EnvFile) -> Result<()> {
    let mut doc = NodeConfigDocument::load(path)?;

    if let Some(hash) = env.get(DA_TRUSTED_HASH_KEY).filter(|value| !value.is_empty()) {
        doc.set_in_section("Header", "TrustedHash", &toml_string(&hash));
    }
    if let Some(height) = numeric_value(env, DA_TRUSTED_HEIGHT_KEY)? {
        doc.set_in_section("DASer", "SampleFrom", &height);
    }
    let workers = numeric_value(env, TX_WORKER_ACCOUNTS_KEY)?.unwrap_or_else(|| "0".to_string());
    doc.set_in_section("State", "TxWorkerAccounts", &workers);

    doc.save()?;
    Ok(())
}

/// Enable the DA app gRPC server and expose it beyond the container network.
pub fn patch_da_app_config(path: &Path) -> Result<()> {
    let mut doc = NodeConfigDocument::load(path)?;
    doc.set_in_section("grpc", "enable", "true");
    doc.rebind_loopback(DA_APP_GRPC_PORT);
    doc.save()?;
    Ok(())
}

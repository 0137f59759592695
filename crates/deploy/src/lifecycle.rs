//! Lifecycle controller: runs the deployment pipeline, rolls back on failure or signal
//! and maps the outcome to an exit status.

use std::{
    error::Error,
    future::Future,
    path::{Path, PathBuf},
};

use strum::IntoEnumIterator;

use crate::{
    config::DeployConfig,
    configure::ConfigPatcher,
    docker::ContainerRuntime,
    error::Result,
    fs::{DeploymentMarker, FsHandler},
    plan::{StackKind, select_plan},
    prompt::Prompter,
    provision::{Provisioner, StackDirectory},
    report::{DeploymentReport, VolumeStatus},
    source::ContentSource,
    state::{confirm_overwrite, create_shared_volume_if_absent, detect_existing},
    validate::validate,
};

/// Steps of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Stage {
    Init,
    DetectExisting,
    SelectPlan,
    Provision,
    Configure,
    Validate,
    PrepareResources,
    Report,
    Done,
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum RunStatus {
    /// Every stage ran.
    Completed,
    /// The operator declined to continue over an existing deployment.
    Declined,
    /// A fatal error aborted the run.
    Failed,
    /// SIGINT received.
    Interrupted,
    /// SIGTERM received.
    Terminated,
}

impl RunStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Completed | RunStatus::Declined => 0,
            RunStatus::Failed => 1,
            RunStatus::Interrupted => 130,
            RunStatus::Terminated => 143,
        }
    }
}

/// Process signals that stop a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ShutdownSignal {
    #[strum(serialize = "SIGINT")]
    Interrupt,
    #[strum(serialize = "SIGTERM")]
    Terminate,
}

impl From<ShutdownSignal> for RunStatus {
    fn from(signal: ShutdownSignal) -> Self {
        match signal {
            ShutdownSignal::Interrupt => RunStatus::Interrupted,
            ShutdownSignal::Terminate => RunStatus::Terminated,
        }
    }
}

/// Wait for SIGINT or SIGTERM.
pub async fn shutdown_signal() -> ShutdownSignal {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    signal = interrupt() => signal,
                    _ = sigterm.recv() => ShutdownSignal::Terminate,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGTERM handler");
                interrupt().await
            }
        }
    }

    #[cfg(not(unix))]
    {
        interrupt().await
    }
}

async fn interrupt() -> ShutdownSignal {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for SIGINT");
        std::future::pending::<()>().await;
    }
    ShutdownSignal::Interrupt
}

/// Scoped rollback of a failed run.
///
/// Armed once the operator agreed to proceed, disarmed when the run reaches
/// [`Stage::Done`]. Fires at most once: it stops every stack that has a compose
/// descriptor, then removes the deployment root if this run created it and the
/// deployment marker is present.
#[derive(Debug)]
pub struct RollbackGuard {
    root: PathBuf,
    enabled: bool,
    dry_run: bool,
    armed: bool,
    root_created: bool,
    fired: bool,
}

impl RollbackGuard {
    pub fn new(config: &DeployConfig) -> Self {
        Self {
            root: config.deployment_root.clone(),
            enabled: config.cleanup_on_error(),
            dry_run: config.dry_run,
            armed: false,
            root_created: false,
            fired: false,
        }
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    /// Disarm permanently: a successful run is never rolled back.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.fired = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed && !self.fired
    }

    /// Record that the deployment root did not exist before this run.
    pub fn record_root_created(&mut self) {
        self.root_created = true;
    }

    /// Run the rollback. Every step is best effort: failures are logged, never raised.
    pub async fn fire<R: ContainerRuntime>(&mut self, runtime: &R) {
        if !self.is_armed() {
            return;
        }
        self.fired = true;

        if !self.enabled {
            tracing::warn!(
                root = %self.root.display(),
                "Cleanup disabled, leaving the deployment in place"
            );
            return;
        }

        tracing::info!("Rolling back...");

        // Dependents first, the DA stack last.
        for kind in StackKind::iter().rev() {
            let compose_file = StackDirectory::new(&self.root, kind).compose_path();
            if !compose_file.is_file() {
                continue;
            }
            if self.dry_run {
                tracing::info!(stack = %kind, "Dry run, not stopping stack");
                continue;
            }
            match runtime.compose_down(&compose_file).await {
                Ok(()) => tracing::info!(stack = %kind, "Stack stopped"),
                Err(e) => tracing::warn!(stack = %kind, error = %e, "Failed to stop stack"),
            }
        }

        if !self.root_created {
            tracing::info!(
                root = %self.root.display(),
                "Deployment root existed before this run, leaving it in place"
            );
            return;
        }
        match DeploymentMarker::load(&self.root) {
            Ok(Some(marker)) => tracing::debug!(
                created_at = %marker.created_at,
                tool_version = %marker.tool_version,
                "Deployment marker found"
            ),
            Ok(None) => {
                tracing::warn!(
                    root = %self.root.display(),
                    "Deployment marker missing, leaving the deployment root in place"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    root = %self.root.display(),
                    error = %error_chain(&e),
                    "Deployment marker unreadable, leaving the deployment root in place"
                );
                return;
            }
        }

        match FsHandler::remove_dir_all(&self.root) {
            Ok(()) => tracing::info!(root = %self.root.display(), "Deployment root removed"),
            Err(e) => tracing::warn!(
                root = %self.root.display(),
                error = %error_chain(&e),
                "Failed to remove deployment root"
            ),
        }
    }
}

enum Completion {
    Done,
    Declined,
}

enum Outcome {
    Finished(Result<Completion>),
    Signalled(ShutdownSignal),
}

/// Drives one deployment run from detection to the final report.
pub struct Orchestrator<R> {
    config: DeployConfig,
    runtime: R,
    source: ContentSource,
    prompter: Prompter,
}

impl<R: ContainerRuntime> Orchestrator<R> {
    pub fn new(
        config: DeployConfig,
        runtime: R,
        source: ContentSource,
        prompter: Prompter,
    ) -> Self {
        Self {
            config,
            runtime,
            source,
            prompter,
        }
    }

    /// Run until completion, failure, SIGINT or SIGTERM.
    pub async fn run(self) -> RunStatus {
        self.run_until(shutdown_signal()).await
    }

    /// Run until completion, failure or until `shutdown` resolves.
    ///
    /// A shutdown cancels the pipeline at its next await point; an operation already in
    /// flight is not interrupted midway.
    pub async fn run_until<F>(mut self, shutdown: F) -> RunStatus
    where
        F: Future<Output = ShutdownSignal>,
    {
        let mut guard = RollbackGuard::new(&self.config);
        let mut stage = Stage::Init;

        let outcome = {
            let execute = self.execute(&mut guard, &mut stage);
            tokio::pin!(execute);
            tokio::select! {
                result = &mut execute => Outcome::Finished(result),
                signal = shutdown => Outcome::Signalled(signal),
            }
        };

        match outcome {
            Outcome::Finished(Ok(Completion::Done)) => RunStatus::Completed,
            Outcome::Finished(Ok(Completion::Declined)) => {
                tracing::info!("Deployment aborted, nothing was changed");
                RunStatus::Declined
            }
            Outcome::Finished(Err(e)) => {
                tracing::error!(stage = %stage, "✗ {}", error_chain(&e));
                guard.fire(&self.runtime).await;
                RunStatus::Failed
            }
            Outcome::Signalled(signal) => {
                tracing::warn!(stage = %stage, %signal, "Received signal, stopping");
                guard.fire(&self.runtime).await;
                signal.into()
            }
        }
    }

    async fn execute(
        &mut self,
        guard: &mut RollbackGuard,
        stage: &mut Stage,
    ) -> Result<Completion> {
        let root = self.config.deployment_root.clone();

        *stage = Stage::DetectExisting;
        let existing = detect_existing(&root, &self.runtime).await;
        if !confirm_overwrite(
            &existing,
            &root,
            &mut self.prompter,
            self.config.force_install,
        )
        .await?
        {
            return Ok(Completion::Declined);
        }
        guard.arm();

        *stage = Stage::SelectPlan;
        let plan = select_plan(&self.config.selection, &mut self.prompter).await?;

        *stage = Stage::Provision;
        prepare_root(&root, guard)?;
        let directories = Provisioner::new(&self.source, &root)
            .provision(&plan)
            .await?;

        *stage = Stage::Configure;
        ConfigPatcher::new(&root, &plan, &mut self.prompter)
            .chain_id(self.config.chain_id.clone())
            .da_namespace(self.config.da_namespace.clone())
            .patch_all(&directories)
            .await?;

        *stage = Stage::Validate;
        validate(&plan, &directories)?;

        *stage = Stage::PrepareResources;
        let volume = if !plan.has_da() {
            VolumeStatus::NotRequired
        } else if self.config.dry_run {
            tracing::info!(volume = %self.config.shared_volume, "Dry run, not creating shared volume");
            VolumeStatus::SkippedDryRun
        } else if create_shared_volume_if_absent(&self.runtime, &self.config.shared_volume).await? {
            VolumeStatus::Created
        } else {
            VolumeStatus::Existing
        };

        *stage = Stage::Report;
        DeploymentReport {
            root,
            directories,
            dry_run: self.config.dry_run,
            shared_volume: self.config.shared_volume.clone(),
            volume,
        }
        .log();

        *stage = Stage::Done;
        guard.disarm();
        Ok(Completion::Done)
    }
}

/// Create the deployment root and its marker if the root does not exist yet.
///
/// A pre-existing root keeps whatever marker state it had, so a directory this tool did
/// not create is never claimed.
fn prepare_root(root: &Path, guard: &mut RollbackGuard) -> Result<()> {
    if root.exists() {
        tracing::debug!(root = %root.display(), "Using existing deployment root");
        return Ok(());
    }

    FsHandler::create_dir(root)?;
    guard.record_root_created();
    DeploymentMarker::new().save(root)?;

    tracing::info!(root = %root.display(), "✓ Deployment root created");
    Ok(())
}

/// Render an error with its sources, outermost first.
fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

//! Container runtime used by the deployment: running containers, the shared volume
//! and stopping compose stacks.

use std::{future::Future, path::Path, process::Stdio, time::Duration};

use bollard::{
    Docker, container::ListContainersOptions, errors::Error as BollardError,
    volume::CreateVolumeOptions,
};
use derive_more::Deref;
use tokio::time::timeout;

use crate::error::BoxError;

/// Timeout for stopping a compose stack during rollback.
const COMPOSE_DOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Operations the deployment needs from the container engine.
pub trait ContainerRuntime {
    /// Names of the running containers (without the leading `/`).
    fn running_containers(&self) -> impl Future<Output = Result<Vec<String>, BoxError>> + Send;

    /// Returns true if a volume with this name exists.
    fn volume_exists(&self, name: &str) -> impl Future<Output = Result<bool, BoxError>> + Send;

    /// Create a named volume.
    fn create_volume(&self, name: &str) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Stop and remove the containers described by a compose file.
    fn compose_down(&self, compose_file: &Path)
    -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Docker engine client, with `docker compose` driven through the CLI.
#[derive(Deref, Clone)]
pub struct DockerRuntime {
    #[deref]
    docker: Docker,
}

impl DockerRuntime {
    /// Create a client for the local Docker daemon.
    pub fn connect() -> Result<Self, BoxError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn running_containers(&self) -> Result<Vec<String>, BoxError> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;

        Ok(containers
            .into_iter()
            .flat_map(|container| container.names.unwrap_or_default())
            .map(|name| name.trim_start_matches('/').to_string())
            .collect())
    }

    async fn volume_exists(&self, name: &str) -> Result<bool, BoxError> {
        match self.docker.inspect_volume(name).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_volume(&self, name: &str) -> Result<(), BoxError> {
        let volume = self
            .docker
            .create_volume(CreateVolumeOptions {
                name: name.to_string(),
                ..Default::default()
            })
            .await?;
        tracing::trace!(volume = %volume.name, "Docker volume created");
        Ok(())
    }

    async fn compose_down(&self, compose_file: &Path) -> Result<(), BoxError> {
        let workdir = compose_file
            .parent()
            .ok_or("compose file has no parent directory")?;

        tracing::debug!(compose_file = %compose_file.display(), "Stopping compose stack");

        let status = timeout(
            COMPOSE_DOWN_TIMEOUT,
            tokio::process::Command::new("docker")
                .arg("compose")
                .arg("-f")
                .arg(compose_file)
                .arg("down")
                .current_dir(workdir)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .status(),
        )
        .await
        .map_err(|_| format!("docker compose down timed out after {COMPOSE_DOWN_TIMEOUT:?}"))??;

        if !status.success() {
            return Err(format!("docker compose down exited with {status}").into());
        }

        Ok(())
    }
}

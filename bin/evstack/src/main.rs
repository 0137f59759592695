//! evstack is a CLI tool to provision and configure the Docker Compose stacks of an evstack chain.

mod cli;

use std::{fs::OpenOptions, sync::Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;
use evstack_deploy::{ContentSource, DockerRuntime, Orchestrator, Prompter};

/// Initialize the logger, with an optional ANSI-free copy of the output in a log file.
fn init_tracing(cli: &Cli) -> Result<()> {
    let level = cli.level();

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(level),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(level))
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli)?;

    let config = cli.deploy_config()?;

    tracing::info!(
        deployment_root = %config.deployment_root.display(),
        artifact_base = %config.artifact_base,
        dry_run = config.dry_run,
        "Starting evstack deployment..."
    );

    let source = ContentSource::from_location(&config.artifact_base, config.fetch_timeout())?;
    let runtime = DockerRuntime::connect()
        .map_err(|e| anyhow::anyhow!("Failed to create the Docker client: {e}"))?;
    match runtime.ping().await {
        Ok(_) => tracing::debug!("Docker daemon reachable"),
        Err(e) => tracing::warn!(error = %e, "Docker daemon is not reachable"),
    }

    let status = Orchestrator::new(config, runtime, source, Prompter::detect())
        .run()
        .await;

    tracing::debug!(%status, exit_code = status.exit_code(), "Run finished");

    // A prompt may still be blocked on stdin, so the runtime is not waited for.
    std::process::exit(status.exit_code())
}

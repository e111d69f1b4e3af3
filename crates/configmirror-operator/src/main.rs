//! ConfigMirror Operator - label-driven ConfigMap replication across namespaces

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::CustomResourceExt;

use configmirror_common::crd::ConfigMirror;
use configmirror_common::kube_utils::create_client;
use configmirror_common::telemetry::{init_telemetry, TelemetryConfig};
use configmirror_operator::controller_runner::build_mirror_controller;
use configmirror_operator::startup::{ensure_crds_installed, init_persistence};
use configmirror_store::{OsEnvConfig, ReplicaStore};

/// ConfigMirror - replicate ConfigMaps across namespaces by label
#[derive(Parser, Debug)]
#[command(name = "configmirror", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Path to a kubeconfig file (defaults to in-cluster or KUBECONFIG)
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches ConfigMirror resources and every ConfigMap, replicating
    /// matching ConfigMaps into each target namespace.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&ConfigMirror::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let telemetry = init_telemetry(TelemetryConfig::default())?;

    let result = match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.kubeconfig).await,
    };

    telemetry.shutdown();
    result
}

async fn run_controller(kubeconfig: Option<PathBuf>) -> anyhow::Result<()> {
    let client = create_client(kubeconfig.as_deref()).await?;

    ensure_crds_installed(&client).await?;

    let store = init_persistence(&OsEnvConfig).await?;
    let replica_store = store
        .clone()
        .map(|s| Arc::new(s) as Arc<dyn ReplicaStore>);

    tracing::info!("Starting ConfigMirror controllers:");
    build_mirror_controller(client, replica_store).await;
    tracing::info!("Controller stopped");

    if let Some(store) = store {
        store.close().await;
    }
    Ok(())
}

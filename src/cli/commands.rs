use crate::cli::Commands;
use crate::config::AgentConfig;
use crate::inputs::InputRegistry;
use crate::io::{Feeder, StdoutFeeder};
use crate::k8s::K8sClient;
use crate::kubernetes::{collector_kinds, default_collectors, KubernetesInput, Runner};
use crate::metrics::{render_metrics, FeedMetrics, MeteredFeeder};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run { config } => handle_run(&config).await,
        Commands::Collect {
            config,
            kind,
            stats,
        } => handle_collect(&config, kind, stats).await,
        Commands::Inputs => {
            handle_inputs();
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<AgentConfig> {
    AgentConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

async fn handle_run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let feeder: Arc<dyn Feeder> = Arc::new(StdoutFeeder::new());
    let cancel = CancellationToken::new();

    let input = KubernetesInput::start(
        &config,
        feeder,
        InputRegistry::with_defaults(),
        cancel.clone(),
    )
    .await
    .context("Failed to start kubernetes input")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Interrupted, shutting down");

    input.shutdown().await;
    Ok(())
}

async fn handle_collect(config_path: &Path, kinds: Vec<String>, stats: bool) -> Result<()> {
    let known = collector_kinds();
    if let Some(unknown) = kinds
        .iter()
        .find(|k| !known.iter().any(|n| *n == k.as_str()))
    {
        bail!(
            "Unknown collector kind '{}' (known: {})",
            unknown,
            known.join(", ")
        );
    }

    let config = load_config(config_path)?;
    let credentials = config.kubernetes.credentials()?;
    let client = Arc::new(
        K8sClient::connect(&credentials)
            .await
            .context("Failed to connect to the API server")?,
    );

    let feeder = Arc::new(MeteredFeeder::new(
        Arc::new(StdoutFeeder::new()),
        FeedMetrics::new()?,
    ));
    let mut runner = Runner::new(client, feeder.clone(), default_collectors())
        .with_tags(config.merged_tags());
    if !kinds.is_empty() {
        runner = runner.only_kinds(&kinds);
    }

    let report = runner.tick().await;
    info!(
        records = report.total(),
        cost = ?report.collect_cost,
        "Collection finished"
    );
    if let Some(error) = &report.last_error {
        warn!(%error, "Some collectors failed");
    }

    if stats {
        print!("{}", render_metrics(feeder.metrics().registry())?);
    }
    Ok(())
}

fn handle_inputs() {
    for name in InputRegistry::with_defaults().names() {
        println!("{}", name);
    }
}

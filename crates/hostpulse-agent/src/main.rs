use anyhow::{Context, Result};
use hostpulse_agent::agent::Agent;
use hostpulse_agent::config::AgentConfig;
use hostpulse_agent::registration::FileHostIdStore;
use hostpulse_api::http::HttpApiClient;
use hostpulse_collector::default_collectors;
use hostpulse_collector::spec::SystemHostSpec;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Turns every SIGINT/SIGTERM into one termination signal.
#[cfg(unix)]
async fn forward_signals(tx: mpsc::Sender<()>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    loop {
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };
        tracing::info!(signal = name, "Received signal");
        if tx.send(()).await.is_err() {
            return Ok(());
        }
    }
}

#[cfg(not(unix))]
async fn forward_signals(tx: mpsc::Sender<()>) -> Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl-C");
        if tx.send(()).await.is_err() {
            return Ok(());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hostpulse=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());
    let config = AgentConfig::load(&config_path)?;
    tracing::info!(apibase = %config.apibase, root = %config.root.display(), "hostpulse-agent starting");

    let api = Arc::new(
        HttpApiClient::new(&config.apibase, &config.apikey, config.verbose)
            .context("failed to build API client")?,
    );
    let spec_source = Arc::new(SystemHostSpec::new(
        config.roles.clone(),
        config.display_name.clone(),
        config.check_names(),
    ));
    let collectors = default_collectors(config.filesystem_ignore()?);
    let checkers = config.checkers();
    let store = Box::new(FileHostIdStore::new(config.host_id_path()));

    let agent = Agent::prepare(config, api, spec_source, collectors, checkers, store).await?;
    tracing::info!(host_id = %agent.host().id, "Host ready");

    let (term_tx, term_rx) = mpsc::channel(4);
    tokio::spawn(async move {
        if let Err(e) = forward_signals(term_tx).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    });

    agent.run(term_rx).await?;
    Ok(())
}

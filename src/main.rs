//! # botfleet
//!
//! Launches every configured bot, serves their live status and chat over
//! HTTP, and stops them all cleanly on SIGINT/SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use botfleet_hub::{BroadcastHub, HubConfig};
use botfleet_runtime::transport::TcpLineConnector;
use botfleet_runtime::{Connector, Fleet};
use botfleet_server::{GatewayServer, InstanceDirectory, ServerConfig};
use botfleet_settings::{FleetSettings, LogFormat, load_settings_from_path};
use clap::Parser;
use tracing::{debug, info};

const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Bot fleet launcher.
#[derive(Parser, Debug)]
#[command(name = "botfleet", about = "Run a fleet of bots behind an HTTP event gateway")]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, short, env = "BOTFLEET_CONFIG", default_value = "./config.json")]
    config: PathBuf,

    /// Gateway bind host (overrides the config file).
    #[arg(long)]
    host: Option<String>,

    /// Gateway bind port (overrides the config file; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Log level (overrides the config file).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

impl Cli {
    fn apply(&self, settings: &mut FleetSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.format = LogFormat::Json;
        }
    }
}

fn hub_config(settings: &FleetSettings) -> HubConfig {
    HubConfig {
        subscriber_queue: settings.server.subscriber_queue,
        max_subscriber_drops: settings.server.max_subscriber_drops,
        ..HubConfig::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings_from_path(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;
    cli.apply(&mut settings);
    let _ = botfleet_logging::init_logging(&settings.logging);
    info!(config = %cli.config.display(), bots = settings.bots.len(), "settings loaded");

    let hub = Arc::new(BroadcastHub::new(hub_config(&settings)));
    let connector: Arc<dyn Connector> = Arc::new(TcpLineConnector::new());
    let fleet = Fleet::launch(&settings.bots, &hub, &connector)
        .await
        .context("Failed to register instances")?;

    let directory = Arc::new(InstanceDirectory::from_fleet(&fleet));
    debug!(senders = directory.len(), "send directory ready");
    let server = GatewayServer::new(ServerConfig::from(&settings.server), Arc::clone(&hub), directory);
    let handle = match server.start().await {
        Ok(handle) => handle,
        Err(e) => {
            let _ = fleet.shutdown().await;
            return Err(e).context("Failed to bind gateway");
        }
    };
    info!(port = handle.port(), instances = hub.instance_count(), "botfleet running");

    wait_for_signal().await?;

    info!("shutting down");
    let failures = fleet.shutdown().await;
    let drained = handle.stop(Some(SERVER_DRAIN_TIMEOUT)).await;
    info!(failures, drained, "shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
        _ = terminate.recv() => info!("received SIGTERM"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")
}

//! Earthcoin Prometheus Exporter CLI
//!
//! Polls a node's JSON-RPC endpoint and serves the collected metrics on
//! `/metrics`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use earthcoin_exporter::{app, shutdown, ConfigError, ExporterConfig};
use tokio::sync::watch;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Prometheus exporter for Earthcoin node metrics.
#[derive(Parser, Debug)]
#[command(name = "earthcoin-exporter")]
#[command(about = "Export Earthcoin node metrics for Prometheus")]
#[command(version)]
struct Args {
    /// Path to configuration file (TOML format).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address of the JSON-RPC endpoint to connect to [default: 127.0.0.1:8332]
    #[arg(long)]
    address: Option<String>,

    /// The username to use when connecting to the endpoint
    #[arg(long)]
    username: Option<String>,

    /// The password to use when connecting to the endpoint
    #[arg(long, env = "COIN_EXPORTER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Address to serve the collected metrics on [default: 127.0.0.1:9099]
    #[arg(long)]
    listen: Option<String>,

    /// Seconds between poll cycles [default: 60]
    #[arg(long)]
    interval_secs: Option<u64>,
}

impl Args {
    /// Merges flags over the config file (if any) over defaults.
    fn into_config(self) -> Result<ExporterConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ExporterConfig::from_file(path)?,
            None => ExporterConfig::default(),
        };

        if let Some(address) = self.address {
            config.rpc.address = address;
        }
        if let Some(username) = self.username {
            config.rpc.username = username;
        }
        if let Some(password) = self.password {
            config.rpc.password = password;
        }
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if let Some(interval_secs) = self.interval_secs {
            config.collector.interval_secs = interval_secs;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Flips the shutdown flag for every task still watching it.
fn notify_shutdown(tx: &watch::Sender<bool>) {
    if tx.send(true).is_err() {
        debug!("Shutdown requested after the exporter already stopped");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = earthcoin_exporter::VERSION,
        node = %config.rpc.address,
        listen = %config.server.listen,
        interval_secs = config.collector.interval_secs,
        "Starting Earthcoin exporter"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown::shutdown_signal().await;
        info!("Shutdown signal received");
        notify_shutdown(&shutdown_tx);
    });

    match app::run(&config, shutdown_rx).await {
        Ok(()) => {
            info!("Exporter stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Exporter failed");
            ExitCode::FAILURE
        }
    }
}

//! statewire broker – entry point.
//!
//! Accepts WebSocket connections from one master (an instrumented
//! application) and any number of monitors, pairs them through the login
//! RPC, and routes relay messages between them verbatim.
//!
//! # Usage
//!
//! ```text
//! statewire-broker [OPTIONS]
//!
//! Options:
//!   --port <PORT>     WebSocket listener port [default: 8000]
//!   --bind <ADDR>     IP address to bind [default: 0.0.0.0]
//!   --config <PATH>   Optional TOML config file
//! ```
//!
//! CLI flags override the config file; both fall back to the defaults.
//! Environment variables `STATEWIRE_PORT` and `STATEWIRE_BIND` act as CLI
//! defaults. Log output is controlled by `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use statewire_broker::domain::{load_config, BrokerConfig, BrokerFileConfig};
use statewire_broker::infrastructure::run_server;

/// statewire pub/sub broker.
#[derive(Debug, Parser)]
#[command(
    name = "statewire-broker",
    about = "Pub/sub broker pairing one statewire master with its monitors",
    version
)]
struct Cli {
    /// TCP port for the WebSocket listener.
    #[arg(long, env = "STATEWIRE_PORT")]
    port: Option<u16>,

    /// IP address to bind. `0.0.0.0` accepts connections from any
    /// interface; `127.0.0.1` restricts to local clients.
    #[arg(long, env = "STATEWIRE_BIND")]
    bind: Option<String>,

    /// Optional TOML config file (missing file means defaults).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Resolves the CLI arguments and optional config file into the runtime
    /// configuration. Flags win over the file.
    fn into_broker_config(self) -> anyhow::Result<BrokerConfig> {
        let mut file = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => BrokerFileConfig::default(),
        };
        if let Some(bind) = self.bind {
            file.bind_address = bind;
        }
        if let Some(port) = self.port {
            file.port = port;
        }
        file.into_broker_config().context("invalid broker configuration")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_broker_config()?;
    info!("statewire broker starting on {}", config.bind_addr);

    // Ctrl+C clears the flag; the accept loop checks it every 200 ms.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C – initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C: {e}"),
        }
    });

    run_server(config, running).await?;
    info!("statewire broker stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_resolve_to_8000_on_all_interfaces() {
        let cli = Cli::parse_from(["statewire-broker"]);
        let config = cli.into_broker_config().unwrap();
        assert_eq!(config.bind_addr.port(), 8000);
        assert_eq!(config.bind_addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli::parse_from(["statewire-broker", "--port", "9100"]);
        let config = cli.into_broker_config().unwrap();
        assert_eq!(config.bind_addr.port(), 9100);
    }

    #[test]
    fn test_cli_bind_override() {
        let cli = Cli::parse_from(["statewire-broker", "--bind", "127.0.0.1"]);
        let config = cli.into_broker_config().unwrap();
        assert_eq!(config.bind_addr.ip().to_string(), "127.0.0.1");
    }

    #[test]
    fn test_cli_invalid_bind_is_rejected() {
        let cli = Cli::parse_from(["statewire-broker", "--bind", "not.an.ip"]);
        assert!(cli.into_broker_config().is_err());
    }

    #[test]
    fn test_missing_config_file_falls_back_to_defaults() {
        let cli = Cli::parse_from([
            "statewire-broker",
            "--config",
            "/nonexistent/statewire/broker.toml",
        ]);
        let config = cli.into_broker_config().unwrap();
        assert_eq!(config.bind_addr.port(), 8000);
    }
}

//! load-router: a load-aware HTTP router.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ forwarder ──▶ selector (least load) ──▶ Backend
//!                         │               │                                     │
//!                         │               └──── outcome reporter ◀──────────────┘
//!                         │                      (load tracker + circuit guard)
//!                         ▼
//!                     registry ◀── admin API / config reload / health monitor
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use load_router::config::validation::validate_config;
use load_router::config::watcher::ConfigWatcher;
use load_router::config::{load_config, BackendConfig, ConfigError, RouterConfig};
use load_router::lifecycle::{spawn_signal_handler, Shutdown};
use load_router::observability::{logging, metrics};
use load_router::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "load-router")]
#[command(about = "Routes HTTP requests to the least-loaded backend", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration.
    #[arg(short, long)]
    bind: Option<String>,

    /// Backend as `[id=]url`; repeatable. Replaces configured backends.
    #[arg(long = "backend", value_name = "[ID=]URL")]
    backends: Vec<String>,

    /// Reload the backend set when the configuration file changes.
    #[arg(short, long, requires = "config")]
    watch: bool,
}

fn parse_backend_arg(index: usize, raw: &str) -> BackendConfig {
    match raw.split_once('=') {
        Some((id, address)) => BackendConfig {
            id: id.to_string(),
            address: address.to_string(),
        },
        None => BackendConfig {
            id: format!("backend-{}", index + 1),
            address: raw.to_string(),
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    if !cli.backends.is_empty() {
        config.backends = cli
            .backends
            .iter()
            .enumerate()
            .map(|(i, raw)| parse_backend_arg(i, raw))
            .collect();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "load-router starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        max_retries = config.retries.max_retries,
        failure_threshold = config.circuit.failure_threshold,
        "Configuration loaded"
    );
    if config.backends.is_empty() {
        tracing::warn!("No backends configured; requests will be rejected until one is added");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    // The watcher stops when dropped, so it lives until main returns.
    let (_watcher, config_updates) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, rx) = ConfigWatcher::new(path, &config);
            (Some(watcher.run()?), rx)
        }
        _ => {
            let (_, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    let server = HttpServer::new(config);
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_arg() {
        let named = parse_backend_arg(0, "a=http://127.0.0.1:8081");
        assert_eq!(named.id, "a");
        assert_eq!(named.address, "http://127.0.0.1:8081");

        let anonymous = parse_backend_arg(2, "127.0.0.1:8083");
        assert_eq!(anonymous.id, "backend-3");
        assert_eq!(anonymous.address, "127.0.0.1:8083");
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "load-router",
            "--bind",
            "127.0.0.1:9000",
            "--backend",
            "a=localhost:8081",
            "--backend",
            "localhost:8082",
        ])
        .unwrap();
        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(cli.backends.len(), 2);
        assert!(!cli.watch);

        assert!(Cli::try_parse_from(["load-router", "--watch"]).is_err());
    }
}

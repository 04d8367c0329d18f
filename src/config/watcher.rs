//! Configuration file watcher for backend hot reload.
//!
//! Watches the directory containing the config file so that editors which
//! replace the file (write to temp + rename) are still observed. Only
//! configurations whose backend list actually changed are forwarded.

use std::path::{Path, PathBuf};
use std::time::Duration;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use crate::config::loader::load_config;
use crate::config::schema::{BackendConfig, RouterConfig};

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    initial_backends: Vec<BackendConfig>,
    update_tx: mpsc::UnboundedSender<RouterConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// `current` is the configuration the server started with; reloads that
    /// leave its backend list untouched are not forwarded.
    pub fn new(path: &Path, current: &RouterConfig) -> (Self, mpsc::UnboundedReceiver<RouterConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (Self {
            path: path.to_path_buf(),
            initial_backends: current.backends.clone(),
            update_tx,
        }, update_rx)
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let mut last_backends = self.initial_backends;

        let mut watcher = RecommendedWatcher::new(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(error = %e, "Config watch error");
                    return;
                }
            };
            if !(event.kind.is_modify() || event.kind.is_create()) {
                return;
            }
            let touches_config = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if !touches_config {
                return;
            }

            match load_config(&path) {
                Ok(new_config) => {
                    if new_config.backends == last_backends {
                        tracing::debug!(path = ?path, "Config changed without backend changes");
                        return;
                    }
                    tracing::info!(
                        backends = new_config.backends.len(),
                        "Config file change detected, applying backend set"
                    );
                    last_backends = new_config.backends.clone();
                    let _ = tx.send(new_config);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to reload config, keeping current backends");
                }
            }
        }, Config::default().with_poll_interval(Duration::from_secs(2)))?;

        let watch_root = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(watch_root, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

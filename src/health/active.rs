//! Active health probing.
//!
//! # Responsibilities
//! - Periodically probe every backend, concurrently
//! - Feed probe latency and result through the same path as requests
//! - Use probes as the half-open trial for tripped backends

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use futures_util::future::join_all;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::config::HealthCheckConfig;
use crate::health::passive::OutcomeReporter;
use crate::health::signal::Sample;
use crate::load_balancer::{Backend, HealthState, Registry};
use crate::resilience::circuit_breaker::TrialPermit;

pub struct HealthMonitor {
    registry: Arc<Registry>,
    reporter: OutcomeReporter,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<Registry>,
        reporter: OutcomeReporter,
        config: HealthCheckConfig,
        client: Client<HttpConnector, Body>,
    ) -> Self {
        Self {
            registry,
            reporter,
            config,
            client,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every registered backend once.
    pub async fn check_all(&self) {
        let snapshot = self.registry.snapshot();
        let now = Instant::now();
        let guard = self.reporter.guard();

        let probes = snapshot.iter().filter_map(|backend| {
            // Tripped backends are only probed through their trial slot.
            let permit = if backend.state == HealthState::Unavailable {
                Some(guard.try_begin_trial(&backend.id, now)?)
            } else {
                None
            };
            Some(self.check_one(backend, permit))
        });

        join_all(probes).await;
    }

    async fn check_one(&self, backend: &Backend, permit: Option<TrialPermit>) {
        let success = self.probe(backend).await;
        let sample = match success {
            Ok(latency) => Sample::success(latency),
            Err(latency) => Sample::failure(latency),
        };
        self.reporter.report(&backend.id, sample);
        if let Some(permit) = permit {
            permit.complete();
        }
    }

    /// Probe one backend; the latency is returned either way.
    async fn probe(&self, backend: &Backend) -> Result<Duration, Duration> {
        let uri = match backend.address.join(&self.config.path) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::error!(backend = %backend.id, error = %e, "Failed to build health check URL");
                return Err(Duration::ZERO);
            }
        };

        let request = match Request::builder()
            .method("GET")
            .uri(uri)
            .header("user-agent", "load-router-health-check")
            .body(Body::empty()) {
                Ok(req) => req,
                Err(e) => {
                    tracing::error!(backend = %backend.id, error = %e, "Failed to build health check request");
                    return Err(Duration::ZERO);
                }
            };

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let started = Instant::now();
        let result = time::timeout(timeout, self.client.request(request)).await;
        let latency = started.elapsed();

        match result {
            Ok(Ok(response)) if response.status().is_success() => {
                tracing::debug!(backend = %backend.id, latency_ms = latency.as_millis() as u64, "Health check passed");
                Ok(latency)
            }
            Ok(Ok(response)) => {
                tracing::warn!(backend = %backend.id, status = %response.status(), "Health check failed: non-success status");
                Err(latency)
            }
            Ok(Err(e)) => {
                tracing::warn!(backend = %backend.id, error = %e, "Health check failed: connection error");
                Err(latency)
            }
            Err(_) => {
                tracing::warn!(backend = %backend.id, "Health check failed: timeout");
                Err(latency)
            }
        }
    }
}

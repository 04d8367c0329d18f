//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all proxy handler
//! - Wire up middleware (tracing, limits, request ID, timeout)
//! - Assemble registry, load tracking, circuit guard and forwarder
//! - Run background tasks (health monitor, admin API, config reload)
//! - Bind server to listener and drain on shutdown

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::config::{AdminConfig, BackendConfig, RouterConfig};
use crate::health::{signal, HealthMonitor, LoadSignal, LoadTracker, OutcomeReporter};
use crate::http::forwarder::Forwarder;
use crate::http::request::{request_id, MakeRequestUuid, X_REQUEST_ID};
use crate::load_balancer::backend::parse_address;
use crate::load_balancer::{Backend, LeastLoad, Registry};
use crate::observability::metrics;
use crate::resilience::{CircuitGuard, RetryPolicy};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub tracker: Arc<LoadTracker>,
    pub guard: Arc<CircuitGuard>,
    pub forwarder: Arc<Forwarder>,
    pub admin: Arc<AdminConfig>,
}

impl AppState {
    /// Register a backend. False when the id is taken.
    pub fn register(&self, backend: Backend) -> bool {
        self.registry.add(backend)
    }

    /// Deregister a backend and drop its signal history. Idempotent.
    pub fn deregister(&self, id: &str) -> bool {
        let removed = self.registry.remove(id);
        self.tracker.forget(id);
        removed
    }

    /// Bring the registry in line with `configs`. Unchanged backends keep
    /// their load and circuit state; a changed address counts as a new
    /// backend. Returns `(added, removed)`.
    pub fn apply_backend_set(&self, configs: &[BackendConfig]) -> (usize, usize) {
        let current = self.registry.snapshot();
        let wanted: HashMap<&str, &BackendConfig> =
            configs.iter().map(|c| (c.id.as_str(), c)).collect();
        let mut added = 0;
        let mut removed = 0;

        for backend in current.iter() {
            let keep = wanted
                .get(backend.id.as_str())
                .and_then(|c| parse_address(&c.address).ok())
                .is_some_and(|address| address == backend.address);
            if !keep && self.deregister(&backend.id) {
                removed += 1;
            }
        }

        for config in configs {
            if self.registry.get(&config.id).is_some() {
                continue;
            }
            match Backend::parse(config.id.clone(), &config.address) {
                Ok(backend) => {
                    if self.register(backend) {
                        added += 1;
                    }
                }
                Err(e) => tracing::warn!(backend = %config.id, error = %e, "Invalid backend address"),
            }
        }

        (added, removed)
    }
}

/// HTTP server for the router.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: RouterConfig,
    reporter: OutcomeReporter,
    client: Client<HttpConnector, Body>,
}

impl HttpServer {
    /// Create a new HTTP server with the configured load signal.
    pub fn new(config: RouterConfig) -> Self {
        let signal: Arc<dyn LoadSignal> = Arc::from(signal::from_config(&config.load));
        Self::with_signal(config, signal)
    }

    /// Create a new HTTP server with an explicit load signal.
    pub fn with_signal(config: RouterConfig, signal: Arc<dyn LoadSignal>) -> Self {
        let registry = Arc::new(Registry::from_config(&config.backends));
        let tracker = Arc::new(LoadTracker::new(
            registry.clone(),
            signal,
            config.load.degraded_penalty,
        ));
        let guard = Arc::new(CircuitGuard::new(registry.clone(), &config.circuit));
        let reporter = OutcomeReporter::new(registry.clone(), tracker.clone(), guard.clone());

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeouts.connect()));
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .build(connector);

        let forwarder = Arc::new(Forwarder::new(
            registry.clone(),
            reporter.clone(),
            Box::new(LeastLoad::new()),
            client.clone(),
            RetryPolicy::new(&config.retries, &config.timeouts),
            config.limits.max_body_bytes,
        ));

        let state = AppState {
            registry,
            tracker,
            guard,
            forwarder,
            admin: Arc::new(config.admin.clone()),
        };

        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            state,
            config,
            reporter,
            client,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RouterConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The proxy router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The admin API router bound to this server's state.
    pub fn admin_router(&self) -> Router {
        setup_admin_router(self.state.clone())
    }

    /// An active health monitor sharing this server's state.
    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            self.state.registry.clone(),
            self.reporter.clone(),
            self.config.health_check.clone(),
            self.client.clone(),
        )
    }

    /// Run the server until `shutdown` fires. Backend sets arriving on
    /// `config_updates` are applied live.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<RouterConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.state.registry.len(),
            "HTTP server starting"
        );

        if self.config.health_check.enabled {
            let monitor = self.health_monitor();
            tokio::spawn(monitor.run(shutdown.resubscribe()));
        }

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            tracing::info!(address = %self.config.admin.bind_address, "Admin API listening");
            let app = self.admin_router();
            let mut admin_shutdown = shutdown.resubscribe();
            tokio::spawn(async move {
                let result = axum::serve(admin_listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.recv().await;
                    })
                    .await;
                if let Err(e) = result {
                    tracing::error!(error = %e, "Admin server error");
                }
            });
        }

        let state = self.state.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => {
                        let Some(config) = update else { break };
                        let (added, removed) = state.apply_backend_set(&config.backends);
                        tracing::info!(added, removed, "Backend set reloaded");
                    }
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(&request);
    let method = request.method().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        "Proxying request"
    );

    let response = match state.forwarder.forward(request).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(request_id = %request_id, error = %err, "Request could not be routed");
            err.into_response()
        }
    };

    metrics::record_request(&method, response.status().as_u16(), start_time);
    response
}

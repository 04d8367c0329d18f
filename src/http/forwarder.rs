//! Request forwarding.
//!
//! # Responsibilities
//! - Pick a backend for each attempt (half-open trial first, then least load)
//! - Dispatch with a per-attempt deadline
//! - Retry on a different backend until the attempt budget runs out
//! - Report every outcome back to load tracking and the circuit guard
//!
//! # Design Decisions
//! - No registry lock is held while a backend call is outstanding
//! - The body is buffered once so every attempt sends identical bytes
//! - An empty pool on the first attempt fails fast without network I/O

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response as HttpResponse};
use axum::response::Response;
use http_body_util::LengthLimitError;
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use tokio::time::Instant;

use crate::error::{ForwardError, RouterError};
use crate::health::{OutcomeReporter, Sample};
use crate::http::request::{build_upstream_request, request_id};
use crate::http::response::passthrough;
use crate::load_balancer::{select, Backend, LoadBalancer, Registry};
use crate::observability::metrics;
use crate::resilience::{timeouts::with_deadline, RetryPolicy, TrialPermit};

/// Backend chosen for one attempt.
struct Candidate {
    backend: Backend,
    trial: Option<TrialPermit>,
}

/// Executes routing decisions.
pub struct Forwarder {
    registry: Arc<Registry>,
    reporter: OutcomeReporter,
    balancer: Box<dyn LoadBalancer>,
    client: Client<HttpConnector, Body>,
    policy: RetryPolicy,
    max_body_bytes: usize,
}

impl Forwarder {
    pub fn new(
        registry: Arc<Registry>,
        reporter: OutcomeReporter,
        balancer: Box<dyn LoadBalancer>,
        client: Client<HttpConnector, Body>,
        policy: RetryPolicy,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            registry,
            reporter,
            balancer,
            client,
            policy,
            max_body_bytes,
        }
    }

    /// Forward `request` to the best backend, retrying elsewhere on failure.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response, RouterError> {
        let request_id = request_id(&request);
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| {
                if is_length_limit(&e) {
                    RouterError::BodyTooLarge { limit: self.max_body_bytes }
                } else {
                    RouterError::InvalidRequestBody(e)
                }
            })?;

        let max_attempts = self.policy.max_attempts(&parts.method);
        let mut tried: Vec<String> = Vec::new();
        let mut last_error: Option<ForwardError> = None;

        for attempt in 1..=max_attempts {
            let Some(candidate) = self.pick(&tried) else {
                tracing::debug!(request_id = %request_id, attempt, "No untried eligible backend left");
                break;
            };

            let request = match build_upstream_request(&parts, &body, &candidate.backend.address) {
                Ok(request) => request,
                Err(e) => return Err(reject_unbuildable(candidate, e, &request_id)),
            };

            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let id = candidate.backend.id.clone();
            tracing::debug!(
                request_id = %request_id,
                backend = %id,
                load = candidate.backend.load,
                trial = candidate.trial.is_some(),
                attempt,
                "Dispatching request"
            );

            match self.attempt(request).await {
                Ok((response, latency)) => {
                    self.reporter.report(&id, Sample::success(latency));
                    if let Some(permit) = candidate.trial {
                        permit.complete();
                    }
                    metrics::record_attempt(&id, "success", latency);
                    return Ok(passthrough(response));
                }
                Err((err, latency)) => {
                    tracing::warn!(
                        request_id = %request_id,
                        backend = %id,
                        attempt,
                        latency_ms = latency.as_millis() as u64,
                        error = %err,
                        "Backend attempt failed"
                    );
                    self.reporter.report(&id, Sample::failure(latency));
                    if let Some(permit) = candidate.trial {
                        permit.complete();
                    }
                    metrics::record_attempt(&id, err.kind(), latency);
                    tried.push(id);
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(last) => Err(RouterError::BackendForwardingFailed {
                attempts: tried.len() as u32,
                last,
            }),
            None => Err(RouterError::AllBackendsUnavailable),
        }
    }

    /// Choose the next backend, skipping `tried`. A backend due for its
    /// half-open trial takes precedence over ordinary selection.
    fn pick(&self, tried: &[String]) -> Option<Candidate> {
        let snapshot = self.registry.snapshot();
        let now = Instant::now();

        if let Some((backend, permit)) = self.reporter.guard().claim_trial(&snapshot, tried, now) {
            return Some(Candidate { backend, trial: Some(permit) });
        }

        let backend = select(self.balancer.as_ref(), &snapshot, tried).ok()?;
        Some(Candidate { backend: backend.clone(), trial: None })
    }

    /// One dispatch. Latency is returned on both paths for load tracking.
    async fn attempt(
        &self,
        request: Request<Body>,
    ) -> Result<(HttpResponse<Incoming>, Duration), (ForwardError, Duration)> {
        let started = Instant::now();
        let result = with_deadline(self.policy.attempt_timeout(), self.client.request(request)).await;
        let latency = started.elapsed();

        match result {
            Ok(response) if self.policy.is_failure_status(response.status()) => {
                Err((ForwardError::FailureStatus(response.status()), latency))
            }
            Ok(response) => Ok((response, latency)),
            Err(e) => Err((e, latency)),
        }
    }
}

/// A request that cannot be rebuilt for a backend says nothing about that
/// backend: no outcome is reported and a claimed trial slot is handed back.
fn reject_unbuildable(candidate: Candidate, err: axum::http::Error, request_id: &str) -> RouterError {
    tracing::warn!(
        request_id = %request_id,
        backend = %candidate.backend.id,
        error = %err,
        "Could not build upstream request"
    );
    if let Some(permit) = candidate.trial {
        permit.release();
    }
    RouterError::InvalidUpstreamRequest(err)
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

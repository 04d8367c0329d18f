//! Passive health checking (outcome feedback).
//!
//! # Responsibilities
//! - Observe request and probe outcomes
//! - Feed latency into the load tracker
//! - Feed success/failure into the circuit guard
//!
//! # Design Decisions
//! - Load update and circuit transition happen in one critical section, so a
//!   request touches shared state once before dispatch and once after
//! - Logging and metrics happen after the lock is released

use std::sync::Arc;

use crate::health::signal::Sample;
use crate::health::tracker::LoadTracker;
use crate::load_balancer::Registry;
use crate::resilience::circuit_breaker::{announce, CircuitGuard, Transition};
use crate::observability::metrics;

/// What reporting one outcome changed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Report {
    /// New load, unless the sample was stale.
    pub load: Option<f64>,
    pub transition: Option<Transition>,
}

/// Routes outcomes to the tracker and the guard.
#[derive(Debug, Clone)]
pub struct OutcomeReporter {
    registry: Arc<Registry>,
    tracker: Arc<LoadTracker>,
    guard: Arc<CircuitGuard>,
}

impl OutcomeReporter {
    pub fn new(registry: Arc<Registry>, tracker: Arc<LoadTracker>, guard: Arc<CircuitGuard>) -> Self {
        Self { registry, tracker, guard }
    }

    pub fn tracker(&self) -> &Arc<LoadTracker> {
        &self.tracker
    }

    pub fn guard(&self) -> &Arc<CircuitGuard> {
        &self.guard
    }

    /// Apply `sample` for `id`. Returns `None` if the backend is gone.
    pub fn report(&self, id: &str, sample: Sample) -> Option<Report> {
        let report = self.registry.update(id, |b| {
            // Transition first so the degraded penalty follows the new state.
            let transition = if sample.success {
                self.guard.apply_success(b, sample.at)
            } else {
                self.guard.apply_failure(b, sample.at)
            };
            let load = self.tracker.apply(b, &sample);
            Report { load, transition }
        });

        match report {
            Some(report) => {
                if let Some(load) = report.load {
                    metrics::record_backend_load(id, load);
                }
                announce(id, report.transition);
            }
            None => tracing::debug!(backend = %id, "Outcome for deregistered backend ignored"),
        }
        report
    }
}

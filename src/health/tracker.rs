//! Load tracking.
//!
//! # Responsibilities
//! - Turn outcome samples into a per-backend load value
//! - Clamp every value written into [0, 1]
//! - Apply samples for one backend in recorded order
//!
//! # Design Decisions
//! - Writes go through the registry's critical section
//! - A sample older than the last applied one is dropped, not folded in
//! - Unknown ids are ignored so removal can race with in-flight outcomes

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::health::signal::{LoadSignal, Sample};
use crate::load_balancer::{backend::clamp_load, Backend, HealthState, Registry};
use crate::observability::metrics;

/// Writes the load field of registered backends.
#[derive(Debug)]
pub struct LoadTracker {
    registry: Arc<Registry>,
    signal: Arc<dyn LoadSignal>,
    degraded_penalty: f64,
}

impl LoadTracker {
    pub fn new(registry: Arc<Registry>, signal: Arc<dyn LoadSignal>, degraded_penalty: f64) -> Self {
        Self {
            registry,
            signal,
            degraded_penalty: clamp_load(degraded_penalty),
        }
    }

    /// Record a request or probe outcome observed now.
    pub fn record_outcome(&self, id: &str, latency: Duration, success: bool) -> Option<f64> {
        self.record(id, Sample::new(latency, success))
    }

    /// Record a sample. Returns the new load, or `None` if the backend is
    /// unknown or the sample is stale.
    pub fn record(&self, id: &str, sample: Sample) -> Option<f64> {
        let load = self.registry.update(id, |b| self.apply(b, &sample)).flatten();
        if let Some(load) = load {
            metrics::record_backend_load(id, load);
        }
        load
    }

    /// Overwrite the load of `id` with an externally computed value.
    pub fn set_load(&self, id: &str, value: f64) -> Option<f64> {
        self.set_load_at(id, value, Instant::now())
    }

    /// Overwrite the load of `id` with a value measured at `at`.
    pub fn set_load_at(&self, id: &str, value: f64, at: Instant) -> Option<f64> {
        let load = self
            .registry
            .update(id, |b| {
                if is_stale(b, at) {
                    return None;
                }
                b.last_sample_at = Some(at);
                b.load = clamp_load(value);
                Some(b.load)
            })
            .flatten();
        if let Some(load) = load {
            metrics::record_backend_load(id, load);
        }
        load
    }

    /// Drop signal state for a deregistered backend.
    pub fn forget(&self, id: &str) {
        self.signal.forget(id);
    }

    /// Fold `sample` into `backend`. Must run inside the registry's critical
    /// section.
    pub(crate) fn apply(&self, backend: &mut Backend, sample: &Sample) -> Option<f64> {
        if is_stale(backend, sample.at) {
            tracing::debug!(backend = %backend.id, "Dropping out-of-order load sample");
            return None;
        }
        let mut score = self.signal.observe(&backend.id, sample);
        if backend.state == HealthState::Degraded {
            score += self.degraded_penalty;
        }
        backend.last_sample_at = Some(sample.at);
        backend.load = clamp_load(score);
        Some(backend.load)
    }
}

fn is_stale(backend: &Backend, at: Instant) -> bool {
    backend.last_sample_at.is_some_and(|last| at < last)
}

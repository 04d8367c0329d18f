//! Circuit guard for backend protection.
//!
//! # States
//! - Healthy: normal operation
//! - Degraded: failing below the trip threshold; still selectable, load penalized
//! - Unavailable: tripped; excluded from selection until a half-open trial succeeds
//!
//! # State Transitions
//! ```text
//! Healthy → Degraded:      consecutive failures > degraded threshold
//! Healthy/Degraded → Unavailable: consecutive failures >= failure threshold
//! Unavailable → (trial):   cool-down elapsed, exactly one trial in flight
//! trial → Healthy:         trial succeeds, failures reset
//! trial → Unavailable:     trial fails (or is abandoned), cool-down re-armed
//! ```
//!
//! The guard is the only writer of `state`, `consecutive_failures` and
//! `unavailable_until`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::CircuitConfig;
use crate::load_balancer::{Backend, HealthState, Registry, Snapshot};
use crate::observability::metrics;

/// A state change produced by an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthState,
    pub to: HealthState,
}

/// Per-backend failure tracking over the shared registry.
#[derive(Debug)]
pub struct CircuitGuard {
    registry: Arc<Registry>,
    failure_threshold: u32,
    degraded_threshold: u32,
    cool_down: Duration,
}

impl CircuitGuard {
    pub fn new(registry: Arc<Registry>, config: &CircuitConfig) -> Self {
        Self {
            registry,
            failure_threshold: config.failure_threshold.max(1),
            degraded_threshold: config.degraded_threshold(),
            cool_down: config.cool_down(),
        }
    }

    /// Record a success for `id`. Unknown ids are ignored.
    pub fn on_success(&self, id: &str) -> Option<Transition> {
        let now = Instant::now();
        let transition = self
            .registry
            .update(id, |b| self.apply_success(b, now))
            .flatten();
        announce(id, transition);
        transition
    }

    /// Record a failure for `id`. Unknown ids are ignored.
    pub fn on_failure(&self, id: &str) -> Option<Transition> {
        let now = Instant::now();
        let transition = self
            .registry
            .update(id, |b| self.apply_failure(b, now))
            .flatten();
        announce(id, transition);
        transition
    }

    /// Whether `id` may receive traffic at `now`: either ordinarily
    /// selectable, or tripped with its cool-down elapsed and no trial running.
    pub fn is_eligible(&self, id: &str, now: Instant) -> bool {
        self.registry
            .snapshot()
            .get(id)
            .is_some_and(|b| b.is_selectable() || b.is_due_for_trial(now))
    }

    /// Claim the half-open trial slot for `id`. At most one permit per
    /// backend exists at a time.
    pub fn try_begin_trial(self: &Arc<Self>, id: &str, now: Instant) -> Option<TrialPermit> {
        let claimed = self.registry.update(id, |b| {
            if b.is_due_for_trial(now) {
                b.trial_in_flight = true;
                true
            } else {
                false
            }
        })?;
        if !claimed {
            return None;
        }
        tracing::info!(backend = %id, "Cool-down elapsed, admitting half-open trial");
        Some(TrialPermit {
            guard: self.clone(),
            id: id.to_string(),
            armed: true,
        })
    }

    /// Claim a trial on the first backend in `snapshot` that is due for one
    /// and not in `excluded`. Checks the snapshot first so the common case
    /// takes no lock.
    pub fn claim_trial(
        self: &Arc<Self>,
        snapshot: &Snapshot,
        excluded: &[String],
        now: Instant,
    ) -> Option<(Backend, TrialPermit)> {
        snapshot
            .iter()
            .filter(|b| b.is_due_for_trial(now))
            .filter(|b| !excluded.iter().any(|id| id == &b.id))
            .find_map(|b| {
                let permit = self.try_begin_trial(&b.id, now)?;
                Some((b.clone(), permit))
            })
    }

    pub(crate) fn apply_success(&self, backend: &mut Backend, now: Instant) -> Option<Transition> {
        let from = backend.state;
        match from {
            HealthState::Unavailable => {
                let cooled = backend.unavailable_until.map_or(true, |until| now >= until);
                // A late success from a request dispatched before the trip
                // does not count as recovery.
                if !(backend.trial_in_flight || cooled) {
                    return None;
                }
                backend.trial_in_flight = false;
                backend.unavailable_until = None;
            }
            HealthState::Healthy | HealthState::Degraded => {}
        }
        backend.consecutive_failures = 0;
        backend.state = HealthState::Healthy;
        (from != HealthState::Healthy).then_some(Transition { from, to: HealthState::Healthy })
    }

    pub(crate) fn apply_failure(&self, backend: &mut Backend, now: Instant) -> Option<Transition> {
        let from = backend.state;
        if from == HealthState::Unavailable {
            if backend.trial_in_flight {
                backend.trial_in_flight = false;
                backend.unavailable_until = Some(now + self.cool_down);
                tracing::warn!(backend = %backend.id, cool_down = ?self.cool_down, "Half-open trial failed, re-arming cool-down");
            }
            return None;
        }

        backend.consecutive_failures = backend.consecutive_failures.saturating_add(1);
        let to = if backend.consecutive_failures >= self.failure_threshold {
            backend.unavailable_until = Some(now + self.cool_down);
            backend.trial_in_flight = false;
            HealthState::Unavailable
        } else if backend.consecutive_failures > self.degraded_threshold {
            HealthState::Degraded
        } else {
            from
        };
        backend.state = to;
        (from != to).then_some(Transition { from, to })
    }

    fn abandon_trial(&self, id: &str) {
        let now = Instant::now();
        let rearmed = self
            .registry
            .update(id, |b| {
                if b.state == HealthState::Unavailable && b.trial_in_flight {
                    b.trial_in_flight = false;
                    b.unavailable_until = Some(now + self.cool_down);
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if rearmed {
            tracing::warn!(backend = %id, "Half-open trial abandoned without outcome, re-arming cool-down");
        }
    }

    /// Free the trial slot without judging the backend; the cool-down stays
    /// as it was, so the next caller may claim the trial right away.
    fn release_trial(&self, id: &str) {
        self.registry.update(id, |b| b.trial_in_flight = false);
    }
}

/// Log and count a circuit transition.
pub(crate) fn announce(id: &str, transition: Option<Transition>) {
    let Some(Transition { from, to }) = transition else {
        return;
    };
    match to {
        HealthState::Unavailable => {
            tracing::warn!(backend = %id, from = %from, "Circuit tripped, backend unavailable")
        }
        HealthState::Degraded => tracing::warn!(backend = %id, from = %from, "Backend degraded"),
        HealthState::Healthy => tracing::info!(backend = %id, from = %from, "Backend recovered"),
    }
    metrics::record_circuit_transition(id, to);
}

/// A RAII guard for the single half-open trial of a backend.
///
/// Reporting the trial's outcome clears the slot; call [`TrialPermit::complete`]
/// afterwards. A permit dropped without completion counts as a failed trial.
#[derive(Debug)]
pub struct TrialPermit {
    guard: Arc<CircuitGuard>,
    id: String,
    armed: bool,
}

impl TrialPermit {
    pub fn backend_id(&self) -> &str {
        &self.id
    }

    /// Mark the trial's outcome as reported.
    pub fn complete(mut self) {
        self.armed = false;
    }

    /// Give the slot back unused, e.g. when the trial request could not
    /// even be built.
    pub fn release(mut self) {
        self.armed = false;
        self.guard.release_trial(&self.id);
    }
}

impl Drop for TrialPermit {
    fn drop(&mut self) {
        if self.armed {
            self.guard.abandon_trial(&self.id);
        }
    }
}

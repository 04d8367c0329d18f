//! Load signal sources.
//!
//! A [`LoadSignal`] turns outcome feedback into a load score. The tracker
//! clamps whatever comes back, so implementations may return any float.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::{LoadConfig, LoadSignalKind};

/// One observed outcome for a backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub latency: Duration,
    pub success: bool,
    /// When the outcome was recorded; orders samples for one backend.
    pub at: Instant,
}

impl Sample {
    pub fn new(latency: Duration, success: bool) -> Self {
        Self { latency, success, at: Instant::now() }
    }

    pub fn success(latency: Duration) -> Self {
        Self::new(latency, true)
    }

    pub fn failure(latency: Duration) -> Self {
        Self::new(latency, false)
    }

    pub fn at(mut self, at: Instant) -> Self {
        self.at = at;
        self
    }
}

/// Given outcome feedback, produce a load score.
pub trait LoadSignal: Send + Sync + fmt::Debug {
    /// Fold `sample` into the signal for `id` and return the new score.
    fn observe(&self, id: &str, sample: &Sample) -> f64;

    /// Drop any state kept for `id`.
    fn forget(&self, _id: &str) {}
}

/// Build the signal selected in configuration.
pub fn from_config(config: &LoadConfig) -> Box<dyn LoadSignal> {
    match config.signal {
        LoadSignalKind::Ewma => Box::new(EwmaSignal::new(
            config.alpha,
            config.latency_ceiling(),
            config.error_weight,
        )),
        LoadSignalKind::Synthetic => Box::new(match config.seed {
            Some(seed) => SyntheticSignal::with_seed(seed),
            None => SyntheticSignal::new(),
        }),
    }
}

#[derive(Debug, Clone, Copy)]
struct Ewma {
    latency: f64,
    errors: f64,
}

/// Exponentially weighted latency and error rate.
///
/// Latency is normalized against `latency_ceiling` (anything slower scores
/// 1.0); the final score is `(1 - w) * latency + w * error_rate`.
#[derive(Debug)]
pub struct EwmaSignal {
    alpha: f64,
    latency_ceiling: Duration,
    error_weight: f64,
    state: DashMap<String, Ewma>,
}

impl EwmaSignal {
    pub fn new(alpha: f64, latency_ceiling: Duration, error_weight: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            latency_ceiling,
            error_weight: error_weight.clamp(0.0, 1.0),
            state: DashMap::new(),
        }
    }

    fn latency_score(&self, latency: Duration) -> f64 {
        let ceiling = self.latency_ceiling.as_secs_f64();
        if ceiling <= 0.0 {
            return 1.0;
        }
        (latency.as_secs_f64() / ceiling).min(1.0)
    }
}

impl LoadSignal for EwmaSignal {
    fn observe(&self, id: &str, sample: &Sample) -> f64 {
        let latency = self.latency_score(sample.latency);
        let error = if sample.success { 0.0 } else { 1.0 };

        let mut entry = self
            .state
            .entry(id.to_string())
            .or_insert(Ewma { latency, errors: error });
        let a = self.alpha;
        entry.latency = a * latency + (1.0 - a) * entry.latency;
        entry.errors = a * error + (1.0 - a) * entry.errors;

        (1.0 - self.error_weight) * entry.latency + self.error_weight * entry.errors
    }

    fn forget(&self, id: &str) {
        self.state.remove(id);
    }
}

/// Uniform random scores, ignoring the sample. Useful for demos where the
/// backends give no meaningful latency.
pub struct SyntheticSignal {
    rng: Mutex<fastrand::Rng>,
}

impl SyntheticSignal {
    pub fn new() -> Self {
        Self { rng: Mutex::new(fastrand::Rng::new()) }
    }

    /// Deterministic sequence, for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Mutex::new(fastrand::Rng::with_seed(seed)) }
    }
}

impl Default for SyntheticSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SyntheticSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntheticSignal").finish_non_exhaustive()
    }
}

impl LoadSignal for SyntheticSignal {
    fn observe(&self, _id: &str, _sample: &Sample) -> f64 {
        self.rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .f64()
    }
}

//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server as a plain value
//! - Carry its load signal and tri-state health
//! - Normalize addresses and load values coming from the outside
//!
//! Backends are copied into snapshots; the registry owns the only mutable
//! instance of each one.

use std::fmt;
use tokio::time::Instant;
use url::Url;

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthState {
    Healthy = 0,
    /// Failing but still selectable; only raises the load score.
    Degraded = 1,
    /// Tripped by the circuit guard; excluded from ordinary selection.
    Unavailable = 2,
}

impl HealthState {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single backend server.
#[derive(Debug, Clone, PartialEq)]
pub struct Backend {
    /// Stable identifier.
    pub id: String,
    /// Base URL requests are forwarded to.
    pub address: Url,
    /// Load in [0, 1]; lower means more spare capacity.
    pub load: f64,
    pub state: HealthState,
    pub consecutive_failures: u32,
    /// Only meaningful while `state` is `Unavailable`.
    pub unavailable_until: Option<Instant>,

    pub(crate) trial_in_flight: bool,
    pub(crate) last_sample_at: Option<Instant>,
}

impl Backend {
    /// Create a new backend: zero load, healthy.
    pub fn new(id: impl Into<String>, address: Url) -> Self {
        Self {
            id: id.into(),
            address,
            load: 0.0,
            state: HealthState::Healthy,
            consecutive_failures: 0,
            unavailable_until: None,
            trial_in_flight: false,
            last_sample_at: None,
        }
    }

    /// Parse `address` and create a backend from it.
    pub fn parse(id: impl Into<String>, address: &str) -> Result<Self, AddressError> {
        Ok(Self::new(id, parse_address(address)?))
    }

    /// Builder-style load override, clamped.
    pub fn with_load(mut self, load: f64) -> Self {
        self.load = clamp_load(load);
        self
    }

    /// Whether ordinary selection may pick this backend.
    pub fn is_selectable(&self) -> bool {
        self.state != HealthState::Unavailable
    }

    /// Whether a half-open trial may be started at `now`.
    pub fn is_due_for_trial(&self, now: Instant) -> bool {
        self.state == HealthState::Unavailable
            && !self.trial_in_flight
            && self.unavailable_until.map_or(true, |until| now >= until)
    }

    /// Whether a half-open trial is currently outstanding.
    pub fn trial_in_flight(&self) -> bool {
        self.trial_in_flight
    }
}

/// Clamp a raw load value into [0, 1]. NaN counts as fully loaded.
pub fn clamp_load(value: f64) -> f64 {
    if value.is_nan() {
        1.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Error returned for unusable backend addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("invalid backend address '{0}': {1}")]
    Invalid(String, url::ParseError),
    #[error("unsupported scheme '{0}', only http backends are supported")]
    UnsupportedScheme(String),
    #[error("backend address '{0}' has no host")]
    MissingHost(String),
}

/// Parse a backend address. Bare `host:port` is treated as `http://host:port`.
pub fn parse_address(raw: &str) -> Result<Url, AddressError> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    let url = Url::parse(&candidate).map_err(|e| AddressError::Invalid(raw.to_string(), e))?;
    if url.scheme() != "http" {
        return Err(AddressError::UnsupportedScheme(url.scheme().to_string()));
    }
    if url.host_str().is_none() {
        return Err(AddressError::MissingHost(raw.to_string()));
    }
    Ok(url)
}

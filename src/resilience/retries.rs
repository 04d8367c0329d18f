//! Retry policy.
//!
//! # Responsibilities
//! - Bound the number of attempts per request
//! - Decide which backend responses count as a failed attempt
//! - Provide the delay between attempts
//!
//! # Design Decisions
//! - Every retry goes to a different backend than the ones already tried
//! - Connection errors and timeouts always count as failures; statuses are configurable
//! - Non-idempotent methods can be limited to a single attempt

use std::collections::HashSet;
use std::time::Duration;

use axum::http::{Method, StatusCode};

use crate::config::{RetryConfig, TimeoutConfig};
use crate::resilience::backoff::backoff_delay;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    failure_statuses: HashSet<u16>,
    attempt_timeout: Duration,
    base_delay: Duration,
    max_delay: Duration,
    idempotent_only: bool,
}

impl RetryPolicy {
    pub fn new(retries: &RetryConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            max_retries: retries.max_retries,
            failure_statuses: retries.failure_statuses.iter().copied().collect(),
            attempt_timeout: timeouts.attempt(),
            base_delay: Duration::from_millis(retries.base_delay_ms),
            max_delay: Duration::from_millis(retries.max_delay_ms),
            idempotent_only: retries.idempotent_only,
        }
    }

    /// Total attempts allowed for a request with `method`: 1 + retries.
    pub fn max_attempts(&self, method: &Method) -> u32 {
        if self.idempotent_only && !method.is_idempotent() {
            1
        } else {
            self.max_retries.saturating_add(1)
        }
    }

    /// Whether a backend response with `status` is a failed attempt rather
    /// than a reply to pass through.
    pub fn is_failure_status(&self, status: StatusCode) -> bool {
        self.failure_statuses.contains(&status.as_u16())
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Delay before the given attempt (1-based; the first attempt never waits).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        backoff_delay(attempt.saturating_sub(1), self.base_delay, self.max_delay)
    }
}

//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → timeouts.rs (enforce per-attempt deadline)
//!     → On failure: circuit_breaker.rs (track failure streak, trip if threshold reached)
//!     → retries.rs (retry budget left? wait backoff.rs, try a different backend)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - Tripped backends fail fast: they are not selected until their cool-down ends
//! - Single half-open trial per backend prevents hammering a recovering server

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{CircuitGuard, Transition, TrialPermit};
pub use retries::RetryPolicy;

//! Health and load subsystem.
//!
//! # Data Flow
//! ```text
//! Passive feedback (passive.rs):
//!     Forwarding outcome observed
//!     → signal.rs scores latency/errors
//!     → tracker.rs writes clamped load
//!     → circuit guard updates failure streak
//!
//! Active probing (active.rs):
//!     Periodic timer
//!     → Probe each backend
//!     → Same path as passive feedback
//! ```
//!
//! # Design Decisions
//! - Per-request and fixed-interval refresh share one interface
//! - The load signal source is injectable, so tests can script it
//! - Health state is per-backend, not per-pool

pub mod active;
pub mod passive;
pub mod signal;
pub mod tracker;

pub use active::HealthMonitor;
pub use passive::{OutcomeReporter, Report};
pub use signal::{EwmaSignal, LoadSignal, Sample, SyntheticSignal};
pub use tracker::LoadTracker;

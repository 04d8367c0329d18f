//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Admin API (registry snapshot)
//! ```
//!
//! # Design Decisions
//! - Request ID flows from the inbound request to the backend unchanged
//! - Metrics are cheap and silent when no recorder is installed

pub mod logging;
pub mod metrics;

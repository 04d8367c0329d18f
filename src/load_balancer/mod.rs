//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives
//!     → registry.rs (lock-free snapshot of all backends)
//!     → Apply load balancing algorithm:
//!         - least_load.rs (pick selectable backend with lowest load)
//!     → Return backend copy or SelectionError
//! ```
//!
//! # Design Decisions
//! - Selection is pure: no I/O, no mutation, same snapshot gives same pick
//! - Only the health and resilience subsystems write load and state
//! - Unavailable backends excluded from selection

pub mod backend;
pub mod least_load;
pub mod registry;

use std::fmt::Debug;

pub use backend::{Backend, HealthState};
pub use least_load::LeastLoad;
pub use registry::{Registry, Snapshot};

/// Selection failed because nothing can take traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no eligible backend available")]
    AllBackendsUnavailable,
}

/// Strategy for choosing a backend from a snapshot.
pub trait LoadBalancer: Send + Sync + Debug {
    /// Pick a backend, skipping unavailable ones and any id in `excluded`.
    fn next_server<'a>(&self, backends: &'a [Backend], excluded: &[String]) -> Option<&'a Backend>;
}

/// Run `balancer` over `backends`, mapping an empty result to an error.
pub fn select<'a>(
    balancer: &dyn LoadBalancer,
    backends: &'a [Backend],
    excluded: &[String],
) -> Result<&'a Backend, SelectionError> {
    balancer
        .next_server(backends, excluded)
        .ok_or(SelectionError::AllBackendsUnavailable)
}

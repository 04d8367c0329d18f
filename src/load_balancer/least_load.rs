//! Least-load selection strategy.

use std::cmp::Ordering;

use crate::load_balancer::{backend::Backend, LoadBalancer};

/// Least load selector.
/// Selects the selectable backend with minimum load; ties go to the
/// lexicographically smallest id so identical snapshots give identical picks.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoad;

impl LeastLoad {
    pub fn new() -> Self {
        Self
    }
}

fn by_load_then_id(a: &&Backend, b: &&Backend) -> Ordering {
    a.load
        .total_cmp(&b.load)
        .then_with(|| a.id.cmp(&b.id))
}

impl LoadBalancer for LeastLoad {
    fn next_server<'a>(&self, backends: &'a [Backend], excluded: &[String]) -> Option<&'a Backend> {
        backends
            .iter()
            .filter(|b| b.is_selectable())
            .filter(|b| !excluded.iter().any(|id| id == &b.id))
            .min_by(by_load_then_id)
    }
}

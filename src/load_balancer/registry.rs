//! Backend registry.
//!
//! # Responsibilities
//! - Own the authoritative set of backends
//! - Serialize every mutation through one narrow critical section
//! - Publish an immutable snapshot after each mutation
//!
//! # Design Decisions
//! - Readers never take the lock: snapshots are published through `ArcSwap`
//! - The lock only guards in-memory updates, never I/O
//! - Entries are kept ordered by id so snapshots are stable

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;

use crate::config::BackendConfig;
use crate::load_balancer::backend::Backend;

/// An immutable, point-in-time copy of the backend pool, ordered by id.
#[derive(Debug, Clone)]
pub struct Snapshot(Arc<Vec<Backend>>);

impl Snapshot {
    pub fn get(&self, id: &str) -> Option<&Backend> {
        self.0
            .binary_search_by(|b| b.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.0[i])
    }
}

impl Deref for Snapshot {
    type Target = [Backend];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Backend>> for Snapshot {
    fn from(mut backends: Vec<Backend>) -> Self {
        backends.sort_by(|a, b| a.id.cmp(&b.id));
        Self(Arc::new(backends))
    }
}

/// The authoritative backend set.
#[derive(Debug)]
pub struct Registry {
    entries: Mutex<BTreeMap<String, Backend>>,
    published: ArcSwap<Vec<Backend>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            published: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Build a registry from backend configuration. Invalid or duplicate
    /// entries are skipped with a warning.
    pub fn from_config(configs: &[BackendConfig]) -> Self {
        let registry = Self::new();
        for config in configs {
            match Backend::parse(config.id.clone(), &config.address) {
                Ok(backend) => {
                    if !registry.add(backend) {
                        tracing::warn!(backend = %config.id, "Duplicate backend id in configuration, keeping first");
                    }
                }
                Err(e) => tracing::warn!(backend = %config.id, error = %e, "Invalid backend address"),
            }
        }
        registry
    }

    /// Current snapshot. Never blocks on writers.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.published.load_full())
    }

    /// Copy of a single backend, if registered.
    pub fn get(&self, id: &str) -> Option<Backend> {
        self.snapshot().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.published.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a backend. Returns false (and keeps the existing entry) when
    /// the id is already taken.
    pub fn add(&self, backend: Backend) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(&backend.id) {
            return false;
        }
        tracing::info!(backend = %backend.id, address = %backend.address, "Backend registered");
        entries.insert(backend.id.clone(), backend);
        self.publish(&entries);
        true
    }

    /// Deregister a backend. Unknown ids are a no-op; returns whether
    /// anything was removed.
    pub fn remove(&self, id: &str) -> bool {
        let mut entries = self.lock();
        if entries.remove(id).is_none() {
            return false;
        }
        tracing::info!(backend = %id, "Backend deregistered");
        self.publish(&entries);
        true
    }

    /// Apply `f` to one backend inside the critical section and republish.
    /// Returns `None` when the id is not registered.
    pub(crate) fn update<R>(&self, id: &str, f: impl FnOnce(&mut Backend) -> R) -> Option<R> {
        let mut entries = self.lock();
        let backend = entries.get_mut(id)?;
        let result = f(backend);
        self.publish(&entries);
        Some(result)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Backend>> {
        // Every update leaves the map consistent, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, entries: &BTreeMap<String, Backend>) {
        self.published
            .store(Arc::new(entries.values().cloned().collect()));
    }
}

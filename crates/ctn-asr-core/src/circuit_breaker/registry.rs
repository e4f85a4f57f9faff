//! Named registry of circuit breakers.
//!
//! Breakers are deliberately not module-level singletons: the composition
//! root constructs one registry at startup, registers a breaker per guarded
//! upstream, and injects the registry (or individual breakers) into the
//! clients that need them. Tests construct a fresh registry per test
//! instead of resetting shared state.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::{CircuitBreaker, CircuitBreakerConfig, CircuitStats, WindowedCircuitBreaker};

/// Registry mapping breaker names to shared breaker instances.
///
/// All breakers in one registry share the same success/error types; the
/// service layer erases per-client result types to `serde_json::Value`
/// before they reach the registry.
pub struct CircuitBreakerRegistry<T, E> {
    breakers: RwLock<HashMap<String, Arc<WindowedCircuitBreaker<T, E>>>>,
}

impl<T, E> CircuitBreakerRegistry<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a breaker built from `config` under its configured name.
    ///
    /// Replaces any existing breaker with the same name and returns the
    /// new instance.
    pub fn register(&self, config: CircuitBreakerConfig) -> Arc<WindowedCircuitBreaker<T, E>> {
        let breaker = Arc::new(WindowedCircuitBreaker::new(config));
        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        breakers.insert(breaker.name().to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Look up a breaker by name.
    pub fn get(&self, name: &str) -> Option<Arc<WindowedCircuitBreaker<T, E>>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Check whether a breaker is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered breaker names, sorted for stable output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Diagnostic snapshot of every registered breaker, sorted by name.
    pub fn stats(&self) -> Vec<CircuitStats> {
        let breakers = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut stats: Vec<CircuitStats> = breakers.values().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.config.name.cmp(&b.config.name));
        stats
    }

    /// Force the named breaker back to closed (admin operation).
    ///
    /// Returns `false` when no breaker is registered under `name`.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, E> Default for CircuitBreakerRegistry<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

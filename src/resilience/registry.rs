//! Per-mapping breaker registry.

use dashmap::DashMap;
use std::sync::Arc;

use crate::resilience::circuit_breaker::{BreakerSettings, CircuitBreaker};

/// Lazily creates one breaker per backend target and reuses it.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    settings: BreakerSettings,
}

impl BreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            breakers: DashMap::new(),
            settings,
        }
    }

    /// Breaker for `target`, created on first use.
    pub fn get(&self, target: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(target.to_string())
            .or_insert_with(|| {
                tracing::debug!(mapping = %target, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(target, self.settings))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakers_are_created_once_per_target() {
        let registry = BreakerRegistry::new(BreakerSettings::default());
        let a = registry.get("a");
        let again = registry.get("a");
        let b = registry.get("b");

        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }
}

//! Mapping lookup.

use std::sync::Arc;

use crate::config::MappingConfig;
use crate::mapping::rule::Mapping;
use crate::session::Session;

/// Configured mappings in declaration order plus the deny-all fallback.
///
/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct MappingTable {
    mappings: Vec<Arc<Mapping>>,
    deny_all: Arc<Mapping>,
}

impl Default for MappingTable {
    fn default() -> Self {
        Self {
            mappings: Vec::new(),
            deny_all: Arc::new(Mapping::deny_all()),
        }
    }
}

impl MappingTable {
    pub fn from_config(configs: &[MappingConfig]) -> Self {
        let mappings = configs
            .iter()
            .map(|c| Arc::new(Mapping::from_config(c)))
            .collect();
        Self {
            mappings,
            ..Default::default()
        }
    }

    /// First mapping whose context root prefixes `path`, else deny-all.
    pub fn resolve(&self, path: &str) -> Arc<Mapping> {
        self.mappings
            .iter()
            .find(|m| m.matches(path))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.deny_all))
    }

    /// Tell every mapping the session is ending.
    pub fn propagate_logout(&self, session: &Session) {
        for mapping in &self.mappings {
            mapping.logout(session);
        }
        tracing::info!(session = %session.id(), "Session logout propagated");
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

//! Session-scoped header replay cache.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

/// Ordered, name-unique set of headers replayed into backend requests.
///
/// Entries are never sent to the browser.
#[derive(Debug, Clone, Default)]
pub struct HeaderBag {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a header. Names compare case-insensitively.
    pub fn store_header(&mut self, name: HeaderName, value: HeaderValue) {
        tracing::debug!(header = %name, "Storing header in bag");
        self.entries.retain(|(n, _)| n != &name);
        self.entries.push((name, value));
    }

    /// Copy of the bag as the per-request working set.
    pub fn headers_for_request(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            map.insert(name.clone(), value.clone());
        }
        map
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

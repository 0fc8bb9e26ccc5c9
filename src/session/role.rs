//! Granted roles.
//!
//! A role definition has the form `name[:idleTimeout[:roleLifetime]]`, both
//! timeouts in seconds. A role without timeouts lives as long as its session.

use std::time::{Duration, Instant};

/// A role held by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    name: String,
    idle_timeout: Option<Duration>,
    lifetime: Option<Duration>,
    issued_at: Instant,
    last_used: Instant,
}

impl Role {
    /// A role without expiry.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            idle_timeout: None,
            lifetime: None,
            issued_at: now,
            last_used: now,
        }
    }

    /// Parse a role definition issued at `now`.
    ///
    /// Returns `None` for an empty name. Timeout elements that are not
    /// non-negative integers are ignored.
    pub fn parse(definition: &str, now: Instant) -> Option<Self> {
        let mut elements = definition.trim().split(':');
        let name = elements.next().filter(|n| !n.is_empty())?;
        let idle_timeout = elements.next().and_then(parse_secs);
        let lifetime = elements.next().and_then(parse_secs);

        Some(Self {
            name: name.to_string(),
            idle_timeout,
            lifetime,
            issued_at: now,
            last_used: now,
        })
    }

    /// Parse a comma-separated list of role definitions.
    pub fn parse_list(definitions: &str, now: Instant) -> Vec<Self> {
        definitions
            .split(',')
            .filter_map(|d| Self::parse(d, now))
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime
    }

    /// Whether neither the lifetime nor the idle timeout has elapsed at `now`.
    pub fn is_active(&self, now: Instant) -> bool {
        let alive = self
            .lifetime
            .map_or(true, |l| now.saturating_duration_since(self.issued_at) < l);
        let fresh = self
            .idle_timeout
            .map_or(true, |t| now.saturating_duration_since(self.last_used) < t);
        alive && fresh
    }

    /// Record a use of the role.
    pub fn touch(&mut self, now: Instant) {
        self.last_used = now;
    }
}

fn parse_secs(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}

//! In-memory session store.
//!
//! # Responsibilities
//! - Map session cookie values to session state
//! - Create sessions for browsers without a valid cookie
//! - Expire sessions by idle time and absolute lifetime
//! - Serialize mutation per session (one async mutex per session)

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::time;

use crate::config::SessionConfig;
use crate::observability::metrics;
use crate::session::state::Session;

/// Shared handle to one session.
#[derive(Debug)]
pub struct SessionHandle {
    id: String,
    session: Mutex<Session>,
    created: Instant,
    /// Milliseconds after `created` of the last request.
    last_seen_ms: AtomicU64,
}

impl SessionHandle {
    fn new(id: String) -> Self {
        Self {
            session: Mutex::new(Session::new(id.clone())),
            id,
            created: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lock the session for the duration of a mutation.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().await
    }

    fn touch(&self, now: Instant) {
        let ms = now.saturating_duration_since(self.created).as_millis() as u64;
        self.last_seen_ms.store(ms, Ordering::Relaxed);
    }

    fn is_expired(&self, now: Instant, idle: Duration, lifetime: Duration) -> bool {
        let age = now.saturating_duration_since(self.created);
        let last_seen = Duration::from_millis(self.last_seen_ms.load(Ordering::Relaxed));
        age >= lifetime || age.saturating_sub(last_seen) >= idle
    }
}

/// Session lookup keyed by the session cookie value.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<SessionHandle>>,
    idle_timeout: Duration,
    max_lifetime: Duration,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_timeouts(
            Duration::from_secs(config.idle_timeout_secs),
            Duration::from_secs(config.max_lifetime_secs),
        )
    }

    pub fn with_timeouts(idle_timeout: Duration, max_lifetime: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
            max_lifetime,
        }
    }

    /// Return the live session for `id`, or create a new one.
    ///
    /// The boolean is `true` when the session was created by this call.
    pub fn resolve(&self, id: Option<&str>) -> (Arc<SessionHandle>, bool) {
        let now = Instant::now();
        if let Some(handle) = id.and_then(|id| self.get_at(id, now)) {
            return (handle, false);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let handle = Arc::new(SessionHandle::new(id.clone()));
        self.sessions.insert(id, handle.clone());
        metrics::record_sessions_active(self.sessions.len());
        tracing::debug!(session = %handle.id(), "Session created");
        (handle, true)
    }

    /// Look up a live session and mark it as seen.
    pub fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.get_at(id, Instant::now())
    }

    fn get_at(&self, id: &str, now: Instant) -> Option<Arc<SessionHandle>> {
        let handle = self.sessions.get(id)?.value().clone();
        if handle.is_expired(now, self.idle_timeout, self.max_lifetime) {
            self.remove(id);
            return None;
        }
        handle.touch(now);
        Some(handle)
    }

    pub fn remove(&self, id: &str) {
        if self.sessions.remove(id).is_some() {
            tracing::debug!(session = %id, "Session removed");
            metrics::record_sessions_active(self.sessions.len());
        }
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, handle| !handle.is_expired(now, self.idle_timeout, self.max_lifetime));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::debug!(removed, "Expired sessions swept");
            metrics::record_sessions_active(self.sessions.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Periodically sweep until shutdown is signalled.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Session sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_reuses_known_sessions() {
        let store = SessionStore::with_timeouts(Duration::from_secs(60), Duration::from_secs(600));
        let (first, created) = store.resolve(None);
        assert!(created);

        let (again, created) = store.resolve(Some(first.id()));
        assert!(!created);
        assert_eq!(again.id(), first.id());

        let (other, created) = store.resolve(Some("unknown"));
        assert!(created);
        assert_ne!(other.id(), first.id());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let store = SessionStore::with_timeouts(Duration::from_millis(50), Duration::from_secs(600));
        let (handle, _) = store.resolve(None);
        let id = handle.id().to_string();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_expired_sessions() {
        let store = SessionStore::with_timeouts(Duration::from_secs(60), Duration::from_millis(30));
        store.resolve(None);
        store.resolve(None);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.sweep(), 2);
    }

    #[tokio::test]
    async fn session_state_survives_between_lookups() {
        let store = SessionStore::with_timeouts(Duration::from_secs(60), Duration::from_secs(600));
        let (handle, _) = store.resolve(None);
        handle.lock().await.set_audit_token("tok");

        let found = store.get(handle.id()).unwrap();
        assert_eq!(found.lock().await.audit_token(), Some("tok"));
    }
}

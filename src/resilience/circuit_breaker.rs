//! Circuit breaker implementation.
//!
//! # States
//! - **Closed**: Normal operation, calls pass through
//! - **Open**: Calls fail fast without reaching the backend
//! - **HalfOpen**: One trial call decides between Closed and Open
//!
//! # Transitions
//! ```text
//! Closed ──(max_failures consecutive failures)──▶ Open
//! Open ──(reset_timeout elapsed, first caller wins CAS)──▶ HalfOpen
//! HalfOpen ──(trial success)──▶ Closed (failure count reset)
//! HalfOpen ──(trial failure)──▶ Open (cooldown restarts)
//! ```
//!
//! A call that exceeds `call_timeout` is cancelled and counts as a failure.
//! State lives in atomics so concurrent requests never double-open the
//! circuit or admit two trial calls.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Circuit breaker state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(val: u8) -> Self {
        match val {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Runtime settings for one breaker.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub max_failures: u32,
    pub call_timeout: Duration,
    pub reset_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            max_failures: config.max_failures.max(1),
            call_timeout: Duration::from_secs(config.timeout_secs),
            reset_timeout: Duration::from_secs(config.reset_timeout_secs),
        }
    }
}

/// Why a guarded call did not produce a value.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker is open")]
    Open,

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Inner(E),
}

/// Failure-counting guard around one backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    state: AtomicU8,
    failures: AtomicU32,
    /// Milliseconds after `epoch` at which the circuit last opened.
    opened_at_ms: AtomicU64,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            state: AtomicU8::new(CircuitState::Closed as u8),
            failures: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Ask for permission to call the backend.
    ///
    /// Returns `None` while the circuit is open, or while a half-open trial
    /// is already in flight.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        match self.state() {
            CircuitState::Closed => Some(CallPermit::new(self, false)),
            CircuitState::HalfOpen => None,
            CircuitState::Open => {
                let opened = Duration::from_millis(self.opened_at_ms.load(Ordering::Acquire));
                if self.epoch.elapsed().saturating_sub(opened) < self.settings.reset_timeout {
                    return None;
                }
                self.transition(CircuitState::Open, CircuitState::HalfOpen)
                    .then(|| {
                        tracing::info!(mapping = %self.name, "Circuit half-open, admitting trial call");
                        CallPermit::new(self, true)
                    })
            }
        }
    }

    /// Run `operation` under the breaker.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.call_with(operation, |_| false).await
    }

    /// Run `operation` under the breaker, treating `Ok` values for which
    /// `is_failure` returns true as failures. Such values are still returned.
    pub async fn call_with<F, T, E, P>(&self, operation: F, is_failure: P) -> Result<T, BreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
        P: FnOnce(&T) -> bool,
    {
        let Some(permit) = self.try_acquire() else {
            tracing::debug!(mapping = %self.name, "Circuit open, failing fast");
            return Err(BreakerError::Open);
        };

        match time::timeout(self.settings.call_timeout, operation).await {
            Ok(Ok(value)) => {
                permit.record(!is_failure(&value));
                Ok(value)
            }
            Ok(Err(e)) => {
                permit.record(false);
                Err(BreakerError::Inner(e))
            }
            Err(_) => {
                tracing::warn!(mapping = %self.name, timeout = ?self.settings.call_timeout, "Backend call timed out");
                permit.record(false);
                Err(BreakerError::Timeout(self.settings.call_timeout))
            }
        }
    }

    fn transition(&self, from: CircuitState, to: CircuitState) -> bool {
        let swapped = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if swapped {
            metrics::record_circuit_state(&self.name, to as u8);
        }
        swapped
    }

    fn mark_opened(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.opened_at_ms.store(now, Ordering::Release);
    }

    fn on_success(&self, trial: bool) {
        if trial {
            self.failures.store(0, Ordering::Relaxed);
            if self.transition(CircuitState::HalfOpen, CircuitState::Closed) {
                tracing::info!(mapping = %self.name, "Circuit closed after successful trial");
            }
        } else if self.state() == CircuitState::Closed {
            self.failures.store(0, Ordering::Relaxed);
        }
    }

    fn on_failure(&self, trial: bool) {
        if trial {
            self.mark_opened();
            if self.transition(CircuitState::HalfOpen, CircuitState::Open) {
                tracing::warn!(mapping = %self.name, "Trial call failed, circuit re-opened");
            }
            return;
        }

        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.settings.max_failures && self.state() == CircuitState::Closed {
            self.mark_opened();
            if self.transition(CircuitState::Closed, CircuitState::Open) {
                tracing::warn!(
                    mapping = %self.name,
                    failures,
                    threshold = self.settings.max_failures,
                    "Circuit opened"
                );
            }
        }
    }

    /// A trial abandoned without an outcome hands the slot back.
    fn on_abandoned(&self, trial: bool) {
        if trial {
            self.mark_opened();
            if self.transition(CircuitState::HalfOpen, CircuitState::Open) {
                tracing::debug!(mapping = %self.name, "Trial call abandoned, circuit re-opened");
            }
        }
    }
}

/// Permission for one backend call. Must be resolved with [`CallPermit::record`].
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    recorded: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            recorded: false,
        }
    }

    pub fn record(mut self, success: bool) {
        self.recorded = true;
        if success {
            self.breaker.on_success(self.trial);
        } else {
            self.breaker.on_failure(self.trial);
        }
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker.on_abandoned(self.trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn settings(max_failures: u32, reset_ms: u64) -> BreakerSettings {
        BreakerSettings {
            max_failures,
            call_timeout: Duration::from_millis(200),
            reset_timeout: Duration::from_millis(reset_ms),
        }
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker.call(async { Err::<(), _>("boom") }).await;
    }

    #[tokio::test]
    async fn opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new("app", settings(10, 10_000));
        for _ in 0..9 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new("app", settings(3, 10_000));
        fail(&breaker).await;
        fail(&breaker).await;
        breaker.call(async { Ok::<_, ()>(()) }).await.unwrap();
        assert_eq!(breaker.failure_count(), 0);
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_circuit_never_runs_the_operation() {
        let breaker = CircuitBreaker::new("app", settings(1, 10_000));
        fail(&breaker).await;

        let calls = AtomicUsize::new(0);
        let result = breaker
            .call(async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(())
            })
            .await;

        assert!(matches!(result, Err(BreakerError::Open)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn half_open_admits_exactly_one_trial_and_closes_on_success() {
        let breaker = CircuitBreaker::new("app", settings(10, 50));
        for _ in 0..10 {
            fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        let trial = breaker.try_acquire().expect("trial permitted");
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_none());

        trial.record(true);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn failed_trial_reopens() {
        let breaker = CircuitBreaker::new("app", settings(1, 30));
        fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let breaker = CircuitBreaker::new("app", settings(1, 10_000));
        let result = breaker
            .call(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ()>(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Timeout(_))));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn failing_values_are_returned_and_counted() {
        let breaker = CircuitBreaker::new("app", settings(2, 10_000));
        for _ in 0..2 {
            let status = breaker
                .call_with(async { Ok::<_, ()>(503u16) }, |s| *s >= 500)
                .await
                .unwrap();
            assert_eq!(status, 503);
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn abandoned_trial_returns_to_open() {
        let breaker = CircuitBreaker::new("app", settings(1, 100));
        fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        drop(breaker.try_acquire());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(breaker.try_acquire().is_some());
    }

    #[tokio::test]
    async fn concurrent_failures_open_once() {
        let breaker = Arc::new(CircuitBreaker::new("app", settings(5, 10_000)));
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let b = breaker.clone();
            tasks.push(tokio::spawn(async move { fail(&b).await }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.failure_count() >= 5);
    }
}

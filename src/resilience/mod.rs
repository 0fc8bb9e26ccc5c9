//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Approved request for mapping M:
//!     → registry.rs (breaker for M, created on first use)
//!     → circuit_breaker.rs (fail fast when open, time out the call,
//!       count transport errors and 5xx answers)
//!     → backend connector
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - No automatic retries; the half-open trial is the only re-attempt
//! - Breaker state is lock-free so concurrent requests agree on transitions

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{BreakerError, BreakerSettings, CallPermit, CircuitBreaker, CircuitState};
pub use registry::BreakerRegistry;

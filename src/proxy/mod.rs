//! Streaming reverse-proxy engine.
//!
//! # Data Flow
//! ```text
//! approved request
//!     → connector.rs (validate, target URL, build request)
//!         → headers.rs (propagation, bag injection, X-Forwarded-*)
//!         → pump.rs (frontend body ─▶ backend, bounded)
//!     → hyper client (under the mapping's circuit breaker)
//!     → response.rs (Date/Warning reconciliation, body mode)
//!         → pump.rs (backend body ─▶ frontend) | buffer
//! ```
//!
//! # Design Decisions
//! - Bodies are never buffered unless the backend gives no framing
//! - Backpressure comes from bounded channels between pump and sink
//! - Either side disconnecting drops the other side's stream

pub mod connector;
pub mod date;
pub mod headers;
pub mod pump;
pub mod response;

pub use connector::BackendConnector;
pub use headers::Injection;
pub use response::BodyMode;

//! WAF gateway library.
//!
//! A reverse proxy that authorizes every request against a configured
//! mapping before streaming it to the mapping's backend.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                       WAF GATEWAY                         │
//!                 │                                                           │
//!  Client ───────▶│  http::server ──▶ http::dispatcher ──▶ mapping (authorize)│
//!                 │                        │                    │      │      │
//!                 │                        │              session   identity ─┼──▶ IdP / JWKS
//!                 │                        │             (roles, bags)          │
//!                 │                        ▼                                  │
//!                 │            resilience (breaker) ──▶ proxy::connector ─────┼──▶ Backend
//!                 │                        │                                  │
//!  Client ◀───────│  proxy::response ◀─────┴── session::harvest (Set-Cookie)  │
//!                 │                                                           │
//!                 │  config · observability · lifecycle · error               │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod mapping;
pub mod proxy;

// Per-browser state
pub mod bag;
pub mod session;

// Collaborators
pub mod identity;
pub mod resilience;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;

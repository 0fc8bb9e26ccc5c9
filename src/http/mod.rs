//! HTTP frontend subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum router, middleware stack)
//!     → request.rs (x-request-id assigned / propagated)
//!     → post_binding.rs (POST <saml prefix>/*, when configured)
//!     → dispatcher.rs (session, mapping, authorize, proxy, harvest)
//!     → response streamed to the client
//! ```

pub mod dispatcher;
pub mod post_binding;
pub mod request;
pub mod server;

pub use dispatcher::GatewayState;
pub use request::X_REQUEST_ID;
pub use server::GatewayServer;

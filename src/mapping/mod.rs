//! Mapping & authorization engine.
//!
//! # Data Flow
//! ```text
//! request path
//!     → table.rs (first context-root prefix match, else deny-all)
//!     → rule.rs Mapping::authorize
//!         ├── role check (401 / 403 / redirect)
//!         ├── oneshot.rs (identity provider call, role re-check)
//!         └── token_exchange.rs (JWT cookie or SAML exchange)
//!     → allow: RequestState feeds the backend request
//!     → deny: Mapping::deny terminates with the flow's status
//! ```
//!
//! # Design Decisions
//! - Mappings are built once at startup and never change
//! - Flow variants are an enum; the role check is shared
//! - Verification failures are "not authenticated", never errors

pub mod context;
pub mod flow;
pub mod oneshot;
pub mod rule;
pub mod table;
pub mod token_exchange;

pub use context::{AuthContext, RequestState};
pub use flow::{Flow, TokenExchangeSettings};
pub use rule::Mapping;
pub use table::MappingTable;
pub use token_exchange::JWT_COOKIE;

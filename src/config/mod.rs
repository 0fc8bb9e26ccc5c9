//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (${VAR} substitution, parse & deserialize)
//!     → validation.rs (semantic checks, every error collected)
//!     → GatewayConfig (validated, immutable)
//!     → mappings built once, shared via Arc with the dispatcher
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; mappings never change at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BackendConfig, CircuitBreakerConfig, FlowType, GatewayConfig, IdentityConfig,
    ListenerConfig, MappingConfig, ObservabilityConfig, ProxySettings, SamlConfig,
    SessionConfig, TimeoutConfig,
};

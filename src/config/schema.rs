//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Header propagation settings for proxied requests.
    pub proxy: ProxySettings,

    /// Session cookie and expiry settings.
    pub session: SessionConfig,

    /// Per-mapping circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Identity provider client settings.
    pub identity: IdentityConfig,

    /// SAML POST-binding endpoint.
    pub saml: SamlConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Mapping rules, matched in declaration order.
    pub mappings: Vec<MappingConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Settings applied to every outbound backend request.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxySettings {
    /// Fixed `X-Forwarded-Host`; derived from the `Host` header when unset.
    pub forwarded_host: Option<String>,

    /// Fixed `X-Forwarded-Port`; the listener port when unset.
    pub forwarded_port: Option<u16>,

    /// Frontend cookie carrying a per-application JWT.
    pub application_jwt_cookie: Option<String>,
}

/// Session settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the browser-visible session cookie.
    pub cookie_name: String,

    /// Idle time after which a session is discarded.
    pub idle_timeout_secs: u64,

    /// Absolute session lifetime.
    pub max_lifetime_secs: u64,

    /// How often expired sessions are swept.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "gateway.session".to_string(),
            idle_timeout_secs: 1800,
            max_lifetime_secs: 28_800,
            sweep_interval_secs: 60,
        }
    }
}

/// Circuit breaker settings, shared by every mapping's breaker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub max_failures: u32,

    /// Call timeout; an expired call counts as a failure.
    pub timeout_secs: u64,

    /// Cooldown before a half-open trial is allowed.
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 10,
            timeout_secs: 240,
            reset_timeout_secs: 10,
        }
    }
}

/// Identity provider client settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 2,
            request_timeout_secs: 10,
            user_agent: concat!("waf-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// SAML POST-binding settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SamlConfig {
    /// Path prefix of the POST-binding endpoint (e.g. "/saml"); disabled when unset.
    pub post_binding_prefix: Option<String>,
}

/// Timeout configuration for frontend requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for a frontend request in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 300 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Authorization flow selected for a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum FlowType {
    #[default]
    #[serde(rename = "CODE_401")]
    Code401,
    #[serde(rename = "CODE_403")]
    Code403,
    #[serde(rename = "REDIRECT")]
    Redirect,
    #[serde(rename = "ONESHOT")]
    OneShot,
    #[serde(rename = "TOKENEXCHANGE")]
    TokenExchange,
}

impl FlowType {
    /// Whether the flow needs a deny-target URL.
    pub fn requires_deny_target(self) -> bool {
        matches!(self, FlowType::Redirect | FlowType::OneShot | FlowType::TokenExchange)
    }
}

/// One routing/authorization rule.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MappingConfig {
    /// Mapping identifier; also the one-shot `client_id`.
    pub name: String,

    /// Path prefix this mapping applies to.
    pub context_root: String,

    pub authentication_flow: FlowType,

    /// Roles of which the session must hold at least one; empty = unrestricted.
    pub restricted_to_roles: Vec<String>,

    /// Redirect target or identity provider endpoint, depending on the flow.
    pub denied_access_url: Option<String>,

    /// Request headers forwarded to the identity provider (one-shot).
    pub headers: Vec<String>,

    pub backend: BackendConfig,

    /// Flow-specific settings (`clientId`, `clientSecret`, `subjectIssuer`, `certificateUrl`).
    pub config: HashMap<String, String>,
}

/// Backend target of a mapping.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,

    /// Prepended to the frontend path when building the backend URL.
    pub path_prefix: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: String::new(),
            port: 80,
            path_prefix: String::new(),
        }
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Validate semantic correctness (serde handles syntax)
//! - Check that each mapping carries what its flow needs
//! - Ensure values are within sane bounds
//!
//! # Design Decisions
//! - Collect all errors, not just first (better UX)
//! - A mapping that fails validation prevents startup

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::config::schema::{FlowType, GatewayConfig, MappingConfig};

/// Config keys read by the token-exchange flow.
pub const CLIENT_ID: &str = "clientId";
pub const CLIENT_SECRET: &str = "clientSecret";
pub const SUBJECT_ISSUER: &str = "subjectIssuer";
pub const CERTIFICATE_URL: &str = "certificateUrl";

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate the whole configuration, returning every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.session.cookie_name.is_empty() {
        errors.push(ValidationError::new("session.cookie_name", "must not be empty"));
    }
    if config.session.idle_timeout_secs == 0 || config.session.max_lifetime_secs == 0 {
        errors.push(ValidationError::new("session", "timeouts must be positive"));
    }
    if config.session.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("session.sweep_interval_secs", "must be positive"));
    }

    let breaker = &config.circuit_breaker;
    if breaker.max_failures == 0 || breaker.timeout_secs == 0 || breaker.reset_timeout_secs == 0 {
        errors.push(ValidationError::new("circuit_breaker", "all values must be positive"));
    }

    if let Some(prefix) = &config.saml.post_binding_prefix {
        if !prefix.starts_with('/') || prefix.len() < 2 {
            errors.push(ValidationError::new(
                "saml.post_binding_prefix",
                "must be an absolute path such as '/saml'",
            ));
        }
    }

    let mut names = HashSet::new();
    for (index, mapping) in config.mappings.iter().enumerate() {
        let scope = if mapping.name.is_empty() {
            format!("mappings[{index}]")
        } else {
            format!("mappings.{}", mapping.name)
        };

        if mapping.name.is_empty() {
            errors.push(ValidationError::new(&scope, "name is required"));
        } else if !names.insert(mapping.name.as_str()) {
            errors.push(ValidationError::new(&scope, "duplicate mapping name"));
        }

        validate_mapping(&scope, mapping, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_mapping(scope: &str, mapping: &MappingConfig, errors: &mut Vec<ValidationError>) {
    if !mapping.context_root.starts_with('/') {
        errors.push(ValidationError::new(
            format!("{scope}.context_root"),
            "must start with '/'",
        ));
    }

    let backend = &mapping.backend;
    if backend.host.is_empty() {
        errors.push(ValidationError::new(format!("{scope}.backend.host"), "is required"));
    }
    if backend.port == 0 {
        errors.push(ValidationError::new(format!("{scope}.backend.port"), "must be non-zero"));
    }
    if !backend.protocol.eq_ignore_ascii_case("http") {
        errors.push(ValidationError::new(
            format!("{scope}.backend.protocol"),
            format!("'{}' is not supported, backends are reached over plain http", backend.protocol),
        ));
    }

    let flow = mapping.authentication_flow;
    let deny_target = mapping.denied_access_url.as_deref().filter(|url| !url.is_empty());
    if flow.requires_deny_target() {
        match deny_target {
            None => errors.push(ValidationError::new(
                format!("{scope}.denied_access_url"),
                format!("is required for flow {flow:?}"),
            )),
            Some(url) if flow != FlowType::Redirect => {
                let absolute = Url::parse(url)
                    .map(|u| matches!(u.scheme(), "http" | "https"))
                    .unwrap_or(false);
                if !absolute {
                    errors.push(ValidationError::new(
                        format!("{scope}.denied_access_url"),
                        "must be an absolute http(s) URL of the identity provider",
                    ));
                }
            }
            Some(_) => {}
        }
    }

    if flow == FlowType::TokenExchange {
        for key in [CLIENT_ID, CLIENT_SECRET, SUBJECT_ISSUER] {
            if mapping.config.get(key).map_or(true, |v| v.is_empty()) {
                errors.push(ValidationError::new(
                    format!("{scope}.config.{key}"),
                    "is required for flow TokenExchange",
                ));
            }
        }
    }

    for header in &mapping.headers {
        if axum::http::HeaderName::from_bytes(header.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("{scope}.headers"),
                format!("'{header}' is not a valid header name"),
            ));
        }
    }
}

//! A single mapping: match, authorize, deny.

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Response, StatusCode},
};
use std::time::Instant;

use crate::config::{BackendConfig, MappingConfig};
use crate::error::GatewayError;
use crate::mapping::context::{AuthContext, RequestState};
use crate::mapping::flow::Flow;
use crate::mapping::{oneshot, token_exchange};
use crate::observability::metrics;
use crate::session::Session;

/// Marker after which a redirect target expects the original path.
pub const REDIRECT_URI_MARKER: &str = "redirect_uri=";

pub const DENY_ALL_NAME: &str = "deny-all";

/// Immutable routing and authorization rule.
#[derive(Debug, Clone)]
pub struct Mapping {
    name: String,
    context_root: String,
    flow: Flow,
    required_roles: Vec<String>,
    headers: Vec<HeaderName>,
    backend: BackendConfig,
}

impl Mapping {
    /// Build from validated configuration.
    pub fn from_config(config: &MappingConfig) -> Self {
        let headers = config
            .headers
            .iter()
            .filter_map(|h| HeaderName::from_bytes(h.trim().as_bytes()).ok())
            .collect();
        Self {
            name: config.name.clone(),
            context_root: config.context_root.clone(),
            flow: Flow::from_config(config),
            required_roles: config.restricted_to_roles.clone(),
            headers,
            backend: config.backend.clone(),
        }
    }

    /// Terminal rule matching every path and denying everything.
    pub fn deny_all() -> Self {
        Self {
            name: DENY_ALL_NAME.to_string(),
            context_root: "/".to_string(),
            flow: Flow::DenyAll,
            required_roles: Vec::new(),
            headers: Vec::new(),
            backend: BackendConfig::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context_root(&self) -> &str {
        &self.context_root
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn required_roles(&self) -> &[String] {
        &self.required_roles
    }

    /// Request headers forwarded to the identity provider.
    pub fn headers(&self) -> &[HeaderName] {
        &self.headers
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.context_root)
    }

    /// Role check shared by every flow.
    ///
    /// Records access to the context root and marks the matched role used.
    pub fn check_roles(&self, session: &mut Session, now: Instant) -> bool {
        session.record_access(&self.context_root, now);
        if self.required_roles.is_empty() {
            return true;
        }
        match session.use_any_role(&self.required_roles, now) {
            Some(role) => {
                tracing::debug!(mapping = %self.name, role = %role, "Role check passed");
                true
            }
            None => false,
        }
    }

    /// Decide whether the request may reach the backend.
    ///
    /// Errors are identity provider transport failures that must fail the
    /// request outright.
    pub async fn authorize(
        &self,
        ctx: &AuthContext<'_>,
        session: &mut Session,
        state: &mut RequestState,
    ) -> Result<bool, GatewayError> {
        let allowed = match &self.flow {
            Flow::Unauthorized | Flow::Forbidden | Flow::Redirect { .. } => {
                self.check_roles(session, ctx.now)
            }
            Flow::OneShot { url } => oneshot::authorize(self, url, ctx, session, state).await?,
            Flow::TokenExchange(settings) => {
                token_exchange::authorize(self, settings, ctx, session, state).await
            }
            Flow::DenyAll => false,
        };

        tracing::info!(
            mapping = %self.name,
            flow = self.flow.label(),
            path = %ctx.path,
            allowed,
            "Authorization decided"
        );
        Ok(allowed)
    }

    /// Terminate a denied request. The body is always empty.
    pub fn deny(&self, path: &str, state: &RequestState) -> Response<Body> {
        metrics::record_denial(&self.name, self.flow.label());

        let mut response = Response::new(Body::empty());
        let status = match &self.flow {
            Flow::Unauthorized => StatusCode::UNAUTHORIZED,
            Flow::Forbidden | Flow::OneShot { .. } | Flow::DenyAll => StatusCode::FORBIDDEN,
            Flow::TokenExchange(_) => state.deny_status.unwrap_or(StatusCode::UNAUTHORIZED),
            Flow::Redirect { url } => {
                let location = redirect_location(url, path);
                match HeaderValue::from_str(&location) {
                    Ok(value) => {
                        response.headers_mut().insert(header::LOCATION, value);
                        StatusCode::FOUND
                    }
                    Err(_) => {
                        tracing::error!(mapping = %self.name, "Redirect target is not a valid header value");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                }
            }
        };
        *response.status_mut() = status;
        response
    }

    /// Logout hook, called for every mapping when a session ends.
    pub fn logout(&self, session: &Session) {
        tracing::debug!(
            mapping = %self.name,
            flow = self.flow.label(),
            session = %session.id(),
            "Mapping notified of logout"
        );
    }
}

/// Deny target, with the URL-encoded request path appended when the target
/// ends with `redirect_uri=`.
pub fn redirect_location(url: &str, path: &str) -> String {
    if url.ends_with(REDIRECT_URI_MARKER) {
        let encoded: String = url::form_urlencoded::byte_serialize(path.as_bytes()).collect();
        format!("{url}{encoded}")
    } else {
        url.to_string()
    }
}

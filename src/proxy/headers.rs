//! Header propagation toward the backend.
//!
//! # Responsibilities
//! - Copy frontend headers except `Host`, `Cookie` and hop-by-hop headers
//! - Replace `Cookie` with the session bag's replay value
//! - Inject the header bag working set and the access token
//! - Add `X-Forwarded-Host`, `X-Forwarded-Port`, `X-PORTAL-AUTHENTICATED`
//!
//! # Design Decisions
//! - Existing `X-Forwarded-*` values from the frontend are kept
//! - Browser cookies never reach a backend verbatim; only bag cookies do

use axum::http::{
    header::{self, HeaderName},
    HeaderMap, HeaderValue,
};

use crate::config::ProxySettings;

pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PORT: HeaderName = HeaderName::from_static("x-forwarded-port");
pub const X_PORTAL_AUTHENTICATED: HeaderName = HeaderName::from_static("x-portal-authenticated");

/// Prefix of bearer `Authorization` values.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Cookie whose presence marks a portal-authenticated browser.
pub const AUTHENTICATION_LEVEL_COOKIE: &str = "AuthenticationLevel";

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name) || name.as_str() == "proxy-connection"
}

/// Value of cookie `name` in the frontend `Cookie` headers.
pub fn request_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(::cookie::Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

/// Bearer token of an `Authorization` header, without the prefix.
pub fn bearer_token(value: &HeaderValue) -> Option<&str> {
    let text = value.to_str().ok()?;
    let token = text.strip_prefix(BEARER_PREFIX)?.trim();
    (!token.is_empty()).then_some(token)
}

pub fn bearer_value(token: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{BEARER_PREFIX}{token}")).ok()
}

/// Everything the outbound header set is derived from besides the
/// frontend headers themselves.
#[derive(Debug, Default)]
pub struct Injection {
    /// Replay value from the cookie bag.
    pub cookie_header: Option<String>,
    /// Header bag working set, possibly rewritten by the authorization flow.
    pub working_headers: HeaderMap,
    /// Verified token to send as `Authorization: Bearer`.
    pub access_token: Option<String>,
}

/// Build the backend request headers.
pub fn outbound_headers(
    frontend: &HeaderMap,
    injection: &Injection,
    settings: &ProxySettings,
    local_port: u16,
) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(frontend.len() + 4);
    for (name, value) in frontend {
        if name == header::HOST || name == header::COOKIE || is_hop_by_hop(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    for (name, value) in &injection.working_headers {
        out.insert(name.clone(), value.clone());
    }

    if let Some(value) = injection
        .cookie_header
        .as_deref()
        .and_then(|c| HeaderValue::from_str(c).ok())
    {
        out.insert(header::COOKIE, value);
    }

    let app_token = settings
        .application_jwt_cookie
        .as_deref()
        .and_then(|name| request_cookie(frontend, name));
    let token = injection.access_token.clone().or(app_token);
    if let Some(value) = token.as_deref().and_then(bearer_value) {
        out.insert(header::AUTHORIZATION, value);
    }

    if !out.contains_key(&X_FORWARDED_HOST) {
        let host = settings.forwarded_host.clone().or_else(|| {
            frontend
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(strip_port)
        });
        if let Some(value) = host.and_then(|h| HeaderValue::from_str(&h).ok()) {
            out.insert(X_FORWARDED_HOST, value);
        }
    }

    if !out.contains_key(&X_FORWARDED_PORT) {
        let port = settings.forwarded_port.unwrap_or(local_port);
        out.insert(X_FORWARDED_PORT, HeaderValue::from(port));
    }

    // The application cookie is forwarded as-is but never counts as identity.
    let portal_signal = injection.access_token.is_some()
        || request_cookie(frontend, AUTHENTICATION_LEVEL_COOKIE).is_some();
    if portal_signal {
        out.insert(X_PORTAL_AUTHENTICATED, HeaderValue::from_static("true"));
    }

    out
}

/// `example.org:8080` → `example.org`, `[::1]:80` → `[::1]`.
fn strip_port(host: &str) -> String {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => host[..=end].to_string(),
            None => host.to_string(),
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name.to_string(),
        _ => host.to_string(),
    }
}

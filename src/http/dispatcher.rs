//! Gateway dispatcher.
//!
//! # Data Flow
//! ```text
//! request
//!     → validate (version, transfer-encoding)
//!     → session (cookie lookup / create)
//!     → mapping (first prefix match)
//!     → authorize under the session lock
//!         ├── deny → Mapping::deny
//!         └── allow → breaker → backend connector
//!                       → harvest Set-Cookie under the session lock
//!                       → relay (reconciled headers, streamed body)
//!     → session / jwt cookies appended
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{header, request::Parts, HeaderValue, Request, Response},
    response::IntoResponse,
};
use hyper::body::Incoming;
use std::sync::Arc;
use std::time::Instant;

use crate::error::GatewayError;
use crate::http::request::request_id;
use crate::identity::IdentityServices;
use crate::mapping::{AuthContext, Mapping, MappingTable, RequestState, JWT_COOKIE};
use crate::observability::metrics;
use crate::proxy::connector::take_set_cookies;
use crate::proxy::headers::request_cookie;
use crate::proxy::{BackendConnector, Injection};
use crate::resilience::{BreakerError, BreakerRegistry};
use crate::session::{harvest_set_cookies, SessionHandle, SessionStore};

/// Shared state of every request handler.
#[derive(Clone)]
pub struct GatewayState {
    pub mappings: Arc<MappingTable>,
    pub sessions: Arc<SessionStore>,
    pub breakers: Arc<BreakerRegistry>,
    pub connector: BackendConnector,
    pub identity: IdentityServices,
    pub session_cookie: Arc<str>,
    /// Port the gateway listens on, the `X-Forwarded-Port` fallback.
    pub local_port: u16,
}

impl GatewayState {
    /// Session named by the request's session cookie, created when unknown.
    pub fn session_for(&self, parts: &Parts) -> (Arc<SessionHandle>, bool) {
        let id = request_cookie(&parts.headers, &self.session_cookie);
        self.sessions.resolve(id.as_deref())
    }
}

/// Catch-all handler.
pub async fn dispatch(State(state): State<GatewayState>, request: Request<Body>) -> Response<Body> {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let mapping = state.mappings.resolve(parts.uri.path());

    tracing::debug!(
        request_id = %request_id(&parts.headers),
        mapping = %mapping.name(),
        method = %parts.method,
        path = %parts.uri.path(),
        "Dispatching request"
    );

    let method = parts.method.clone();
    let response = handle(&state, &mapping, parts, body).await;
    metrics::record_request(
        mapping.name(),
        method.as_str(),
        response.status().as_u16(),
        start,
    );
    response
}

async fn handle(state: &GatewayState, mapping: &Mapping, parts: Parts, body: Body) -> Response<Body> {
    if let Err(e) = BackendConnector::validate(&parts) {
        return e.into_response();
    }

    let (session, created) = state.session_for(&parts);
    let path = parts.uri.path();

    let (decision, mut request_state, injection) = {
        let mut guard = session.lock().await;
        let mut request_state = RequestState::for_session(&guard);
        let ctx = AuthContext {
            identity: &state.identity,
            table: &state.mappings,
            headers: &parts.headers,
            path,
            now: Instant::now(),
        };
        let decision = mapping.authorize(&ctx, &mut guard, &mut request_state).await;
        let injection = request_state.injection(&guard, path);
        (decision, request_state, injection)
    };

    let mut response = match decision {
        Err(e) => e.into_response(),
        Ok(false) => mapping.deny(path, &request_state),
        Ok(true) => match proxy(state, mapping, &session, &parts, body, &injection).await {
            Ok((response, logged_out)) => {
                request_state.logged_out |= logged_out;
                response
            }
            Err(e) => e.into_response(),
        },
    };

    if let Some(jwt) = request_state.issued_jwt.as_deref() {
        let cookie = ::cookie::Cookie::build((JWT_COOKIE, jwt)).path("/").build();
        append_set_cookie(&mut response, &cookie.to_string());
    }

    if request_state.logged_out {
        state.sessions.remove(session.id());
        append_set_cookie(&mut response, &expired_session_cookie(&state.session_cookie));
    } else if created {
        append_set_cookie(&mut response, &session_cookie(&state.session_cookie, session.id()));
    }
    response
}

/// Send the approved request under the mapping's breaker and relay the
/// answer. The flag reports a logout commanded by the backend.
async fn proxy(
    state: &GatewayState,
    mapping: &Mapping,
    session: &SessionHandle,
    parts: &Parts,
    body: Body,
    injection: &Injection,
) -> Result<(Response<Body>, bool), GatewayError> {
    let request = state
        .connector
        .build_request(mapping, parts, body, injection, state.local_port)?;

    let breaker = state.breakers.get(mapping.name());
    let is_server_error = |r: &Response<Incoming>| r.status().is_server_error();
    let mut backend = match breaker.call_with(state.connector.send(request), is_server_error).await {
        Ok(response) => response,
        Err(BreakerError::Open) => return Err(GatewayError::CircuitOpen(mapping.name().to_string())),
        Err(BreakerError::Timeout(after)) => return Err(GatewayError::Timeout(after)),
        Err(BreakerError::Inner(e)) => return Err(e),
    };

    let set_cookies = take_set_cookies(backend.headers_mut());
    let harvest = {
        let mut guard = session.lock().await;
        harvest_set_cookies(
            &mut guard,
            mapping.context_root(),
            set_cookies,
            &state.mappings,
            Instant::now(),
        )
    };

    let mut response = BackendConnector::relay(backend, parts.version, &parts.method).await?;
    for value in harvest.forward {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    Ok((response, harvest.logged_out))
}

pub fn session_cookie(name: &str, id: &str) -> String {
    ::cookie::Cookie::build((name, id))
        .path("/")
        .http_only(true)
        .build()
        .to_string()
}

pub fn expired_session_cookie(name: &str) -> String {
    ::cookie::Cookie::build((name, ""))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::ZERO)
        .build()
        .to_string()
}

pub fn append_set_cookie(response: &mut Response<Body>, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(_) => tracing::warn!("Dropping Set-Cookie that is not a valid header value"),
    }
}

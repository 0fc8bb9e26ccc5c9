//! SAML POST-binding endpoint.
//!
//! The identity provider posts `SAMLResponse` to `<prefix>/<target>`. A
//! recognised response leaves its assertion in the session header bag as a
//! bearer `Authorization`, ready for a token-exchange mapping on the next
//! request. The browser is always sent on to `/<target>`.

use axum::{
    body::{self, Body},
    http::{header, HeaderValue, Request, Response, StatusCode},
};

use std::sync::Arc;

use crate::http::dispatcher::{append_set_cookie, session_cookie, GatewayState};
use crate::proxy::headers::bearer_value;

pub const SAML_RESPONSE_PARAM: &str = "SAMLResponse";

/// Largest form body read from the identity provider.
const MAX_FORM_BYTES: usize = 1024 * 1024;

/// Handle a POST under `prefix`.
pub async fn saml_post_binding(
    state: GatewayState,
    prefix: Arc<str>,
    request: Request<Body>,
) -> Response<Body> {
    let (parts, body) = request.into_parts();
    let form = match body::to_bytes(body, MAX_FORM_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable SAML post body");
            return status(StatusCode::BAD_REQUEST);
        }
    };

    let saml = parts
        .uri
        .query()
        .and_then(|q| form_param(q.as_bytes(), SAML_RESPONSE_PARAM))
        .or_else(|| form_param(&form, SAML_RESPONSE_PARAM));

    let (session, created) = state.session_for(&parts);
    if let Some(saml) = saml.filter(|s| state.identity.saml.is_saml_token(s)) {
        match state
            .identity
            .saml
            .extract_assertion(&saml)
            .and_then(|assertion| bearer_value(&assertion))
        {
            Some(value) => {
                session
                    .lock()
                    .await
                    .headers_mut()
                    .store_header(header::AUTHORIZATION, value);
                tracing::info!(session = %session.id(), "Stored SAML assertion for token exchange");
            }
            None => tracing::warn!(session = %session.id(), "SAML response without usable assertion"),
        }
    } else {
        tracing::debug!(path = %parts.uri.path(), "POST without SAML response");
    }

    let location = target_location(parts.uri.path(), &prefix);
    let mut response = status(StatusCode::FOUND);
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            response.headers_mut().insert(header::LOCATION, value);
        }
        Err(_) => return status(StatusCode::BAD_REQUEST),
    }
    if created {
        append_set_cookie(&mut response, &session_cookie(&state.session_cookie, session.id()));
    }
    response
}

/// Request path with the binding prefix removed.
pub fn target_location(path: &str, prefix: &str) -> String {
    match path.strip_prefix(prefix) {
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        Some(rest) => format!("/{rest}"),
        None => path.to_string(),
    }
}

fn form_param(input: &[u8], name: &str) -> Option<String> {
    url::form_urlencoded::parse(input)
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn status(code: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = code;
    response
}

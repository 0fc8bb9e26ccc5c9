//! Token-exchange flow.
//!
//! # Data Flow
//! ```text
//! `jwt` cookie ──verify──▶ ok ──▶ Authorization: Bearer <jwt>, allow
//!      │ missing / invalid
//!      ▼
//! Authorization: Bearer <SAML> (request, else header bag)
//!      │ missing ──▶ deny 401
//!      ▼
//! POST token-exchange grant ──▶ 200 + access_token ──▶ rewrite, Set-Cookie jwt, allow
//!                           ├─▶ anything else ──▶ deny 401
//!                           └─▶ transport error ──▶ deny 500
//! ```
//!
//! The frontend body is not read until the proxy starts, so the identity
//! provider call never competes with it.

use axum::http::{header, HeaderMap, StatusCode};

use crate::identity::TokenExchangeGrant;
use crate::mapping::context::{AuthContext, RequestState};
use crate::mapping::flow::TokenExchangeSettings;
use crate::mapping::rule::Mapping;
use crate::observability::metrics;
use crate::proxy::headers::{bearer_token, request_cookie};
use crate::session::Session;

/// Cookie carrying the application JWT issued by the exchange.
pub const JWT_COOKIE: &str = "jwt";

const FLOW: &str = "token_exchange";

pub async fn authorize(
    mapping: &Mapping,
    settings: &TokenExchangeSettings,
    ctx: &AuthContext<'_>,
    session: &mut Session,
    state: &mut RequestState,
) -> bool {
    if let Some(jwt) = request_cookie(ctx.headers, JWT_COOKIE) {
        if verify_cookie(settings, ctx, &jwt).await {
            tracing::debug!(mapping = %mapping.name(), "Accepted JWT cookie");
            state.access_token = Some(jwt);
            return true;
        }
        tracing::debug!(mapping = %mapping.name(), "JWT cookie rejected");
    }

    let Some(saml) = saml_bearer(ctx.headers, &state.working_headers) else {
        tracing::debug!(mapping = %mapping.name(), "No SAML bearer to exchange");
        return false;
    };

    let grant = TokenExchangeGrant {
        subject_token: &saml,
        subject_issuer: &settings.subject_issuer,
        client_id: &settings.client_id,
        client_secret: &settings.client_secret,
    };
    let response = match ctx.identity.client.token_exchange(&settings.url, grant).await {
        Ok(response) => response,
        Err(e) => {
            metrics::record_identity_call(FLOW, "error");
            tracing::warn!(mapping = %mapping.name(), error = %e, "Token exchange failed");
            state.deny_status = Some(StatusCode::INTERNAL_SERVER_ERROR);
            return false;
        }
    };

    let Some(token) = response.access_token() else {
        metrics::record_identity_call(FLOW, "rejected");
        tracing::info!(mapping = %mapping.name(), status = %response.status, "Token exchange rejected");
        state.deny_status = Some(StatusCode::UNAUTHORIZED);
        return false;
    };

    metrics::record_identity_call(FLOW, "ok");
    state.working_headers.remove(header::AUTHORIZATION);
    state.access_token = Some(token.clone());
    state.issued_jwt = Some(token);
    state.absorb_identity_cookies(ctx, mapping, session, response.set_cookies);
    true
}

async fn verify_cookie(settings: &TokenExchangeSettings, ctx: &AuthContext<'_>, jwt: &str) -> bool {
    let Some(certificate_url) = settings.certificate_url.as_deref() else {
        return false;
    };
    ctx.identity
        .verifier
        .verify(jwt, certificate_url, Some(settings.client_id.as_str()))
        .await
}

/// SAML assertion from a bearer `Authorization`, request first, then the
/// header bag working set.
fn saml_bearer(request: &HeaderMap, working: &HeaderMap) -> Option<String> {
    request
        .get(header::AUTHORIZATION)
        .and_then(bearer_token)
        .or_else(|| working.get(header::AUTHORIZATION).and_then(bearer_token))
        .map(str::to_string)
}

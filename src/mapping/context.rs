//! Per-request authorization context.

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use std::time::Instant;

use crate::identity::IdentityServices;
use crate::mapping::rule::Mapping;
use crate::mapping::table::MappingTable;
use crate::proxy::Injection;
use crate::session::{harvest_set_cookies, Session};

/// Read-only inputs of one authorization decision.
pub struct AuthContext<'a> {
    pub identity: &'a IdentityServices,
    pub table: &'a MappingTable,
    /// Frontend request headers.
    pub headers: &'a HeaderMap,
    /// Frontend request path.
    pub path: &'a str,
    pub now: Instant,
}

/// What the authorization flow decided besides allow/deny.
#[derive(Debug, Default)]
pub struct RequestState {
    /// Header bag copy for this request; injected into the backend request.
    pub working_headers: HeaderMap,
    /// Verified or freshly exchanged token to forward as `Authorization: Bearer`.
    pub access_token: Option<String>,
    /// Freshly issued JWT to hand to the browser as a cookie.
    pub issued_jwt: Option<String>,
    /// Status a denying flow chose for itself.
    pub deny_status: Option<StatusCode>,
    /// An identity provider response ended the session.
    pub logged_out: bool,
}

impl RequestState {
    /// Start a request from the session's header bag.
    pub fn for_session(session: &Session) -> Self {
        Self {
            working_headers: session.headers().headers_for_request(),
            ..Default::default()
        }
    }

    /// Headers and cookies for the backend request.
    pub fn injection(&self, session: &Session, path: &str) -> Injection {
        Injection {
            cookie_header: session.cookies().cookie_header_for(path),
            working_headers: self.working_headers.clone(),
            access_token: self.access_token.clone(),
        }
    }

    /// Store cookies set by an identity provider as if a backend had set them.
    pub fn absorb_identity_cookies(
        &mut self,
        ctx: &AuthContext<'_>,
        mapping: &Mapping,
        session: &mut Session,
        set_cookies: Vec<HeaderValue>,
    ) {
        if set_cookies.is_empty() {
            return;
        }
        let harvest = harvest_set_cookies(
            session,
            mapping.context_root(),
            set_cookies,
            ctx.table,
            ctx.now,
        );
        tracing::debug!(
            mapping = %mapping.name(),
            stored = harvest.stored,
            "Absorbed identity provider cookies"
        );
        if harvest.logged_out {
            self.logged_out = true;
        }
    }
}

//! One-shot flow.
//!
//! A failed role check triggers a single identity provider call whose
//! response cookies may grant roles through the control channel. Roles are
//! consumed by every check: the session holds none once the check is over,
//! so each request needs a fresh grant.

use axum::http::{HeaderMap, HeaderName};

use crate::error::GatewayError;
use crate::mapping::context::{AuthContext, RequestState};
use crate::mapping::rule::Mapping;
use crate::observability::metrics;
use crate::session::Session;

const FLOW: &str = "oneshot";

pub async fn authorize(
    mapping: &Mapping,
    url: &str,
    ctx: &AuthContext<'_>,
    session: &mut Session,
    state: &mut RequestState,
) -> Result<bool, GatewayError> {
    if check_and_consume(mapping, session, ctx) {
        return Ok(true);
    }

    let headers = forwarded_headers(mapping.headers(), ctx.headers);
    let response = match ctx.identity.client.one_shot(url, mapping.name(), headers).await {
        Ok(response) => response,
        Err(e) => {
            metrics::record_identity_call(FLOW, "error");
            tracing::warn!(mapping = %mapping.name(), url = %url, error = %e, "One-shot call failed");
            return Err(GatewayError::Identity(e));
        }
    };
    metrics::record_identity_call(FLOW, if response.status.is_success() { "ok" } else { "rejected" });
    tracing::debug!(mapping = %mapping.name(), status = %response.status, "One-shot answered");

    state.absorb_identity_cookies(ctx, mapping, session, response.set_cookies);
    Ok(check_and_consume(mapping, session, ctx))
}

fn check_and_consume(mapping: &Mapping, session: &mut Session, ctx: &AuthContext<'_>) -> bool {
    let allowed = mapping.check_roles(session, ctx.now);
    session.clear_roles();
    allowed
}

/// Allow-listed request headers, every value kept.
pub fn forwarded_headers(allowed: &[HeaderName], request: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for name in allowed {
        for value in request.get_all(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FlowType, IdentityConfig, MappingConfig};
    use crate::identity::IdentityServices;
    use crate::mapping::MappingTable;
    use crate::session::Role;
    use axum::http::HeaderValue;
    use std::time::Instant;

    fn one_shot(url: &str) -> Mapping {
        Mapping::from_config(&MappingConfig {
            name: "app".into(),
            context_root: "/app".into(),
            authentication_flow: FlowType::OneShot,
            restricted_to_roles: vec!["r".into()],
            denied_access_url: Some(url.into()),
            ..Default::default()
        })
    }

    #[test]
    fn only_allow_listed_headers_are_forwarded() {
        let mut request = HeaderMap::new();
        request.insert("x-client", HeaderValue::from_static("a"));
        request.append("x-client", HeaderValue::from_static("b"));
        request.insert("cookie", HeaderValue::from_static("secret=1"));

        let out = forwarded_headers(&[HeaderName::from_static("x-client")], &request);
        assert_eq!(out.len(), 2);
        assert!(out.get("cookie").is_none());
    }

    #[tokio::test]
    async fn held_role_passes_without_call_and_is_consumed() {
        let identity = IdentityServices::new(&IdentityConfig::default()).unwrap();
        let table = MappingTable::default();
        let headers = HeaderMap::new();
        let ctx = AuthContext {
            identity: &identity,
            table: &table,
            headers: &headers,
            path: "/app",
            now: Instant::now(),
        };
        let mapping = one_shot("http://127.0.0.1:1/token");
        let mut session = Session::new("s");
        session.add_role(Role::new("r"));
        let mut state = RequestState::default();

        assert!(authorize(&mapping, "http://127.0.0.1:1/token", &ctx, &mut session, &mut state)
            .await
            .unwrap());
        assert!(session.roles().is_empty());
    }

    #[tokio::test]
    async fn unreachable_identity_provider_fails_the_request() {
        let identity = IdentityServices::new(&IdentityConfig::default()).unwrap();
        let table = MappingTable::default();
        let headers = HeaderMap::new();
        let ctx = AuthContext {
            identity: &identity,
            table: &table,
            headers: &headers,
            path: "/app",
            now: Instant::now(),
        };
        let mapping = one_shot("http://127.0.0.1:1/token");
        let mut session = Session::new("s");
        let mut state = RequestState::default();

        let result =
            authorize(&mapping, "http://127.0.0.1:1/token", &ctx, &mut session, &mut state).await;
        assert!(matches!(result, Err(GatewayError::Identity(_))));
    }
}

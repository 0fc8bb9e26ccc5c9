//! Backend connector.
//!
//! # Responsibilities
//! - Reject frontend requests we cannot relay (version, transfer-encoding)
//! - Build the outbound request (method, target URL, propagated headers)
//! - Pump the frontend body to the backend
//! - Hand the backend response to reconciliation
//!
//! # Design Decisions
//! - One pooled hyper client shared by every mapping
//! - The request body starts flowing only once hyper has written the head
//! - Dropping the exchange future drops both pumps, resetting the backend

use axum::{
    body::Body,
    http::{header, request::Parts, HeaderMap, Method, Request, Response, Uri, Version},
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::ProxySettings;
use crate::error::GatewayError;
use crate::mapping::Mapping;
use crate::proxy::headers::{outbound_headers, Injection};
use crate::proxy::pump;
use crate::proxy::response;

/// Per-request outbound HTTP exchange.
#[derive(Clone)]
pub struct BackendConnector {
    client: Client<HttpConnector, Body>,
    settings: ProxySettings,
}

impl BackendConnector {
    pub fn new(settings: ProxySettings) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, settings }
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    /// Check that the frontend request can be relayed at all.
    pub fn validate(parts: &Parts) -> Result<(), GatewayError> {
        match parts.version {
            Version::HTTP_10 | Version::HTTP_11 | Version::HTTP_2 => {}
            other => return Err(GatewayError::UnsupportedVersion(other)),
        }

        if let Some(te) = parts.headers.get(header::TRANSFER_ENCODING) {
            let value = te.to_str().unwrap_or_default().trim();
            if !value.eq_ignore_ascii_case("chunked") {
                return Err(GatewayError::UnsupportedTransferEncoding(value.to_string()));
            }
        }
        Ok(())
    }

    /// Build the backend request for an approved frontend request.
    pub fn build_request(
        &self,
        mapping: &Mapping,
        parts: &Parts,
        body: Body,
        injection: &Injection,
        local_port: u16,
    ) -> Result<Request<Body>, GatewayError> {
        let uri = target_uri(mapping, &parts.uri)?;
        let headers = outbound_headers(&parts.headers, injection, &self.settings, local_port);

        let mut request = Request::builder()
            .method(parts.method.clone())
            .uri(uri)
            .body(pump::pump(body, "frontend->backend"))?;
        *request.headers_mut() = headers;
        Ok(request)
    }

    /// Send a request and wait for the response head.
    pub async fn send(&self, request: Request<Body>) -> Result<Response<Incoming>, GatewayError> {
        self.client
            .request(request)
            .await
            .map_err(|e| GatewayError::Backend(e.to_string()))
    }

    /// Reconcile and stream a backend response to a frontend speaking `frontend`.
    pub async fn relay(
        response: Response<Incoming>,
        frontend: Version,
        method: &Method,
    ) -> Result<Response<Body>, GatewayError> {
        response::relay(response, frontend, method).await
    }
}

/// `http://host:port` + backend path prefix + frontend path and query.
pub fn target_uri(mapping: &Mapping, frontend: &Uri) -> Result<Uri, GatewayError> {
    let backend = mapping.backend();
    let path_and_query = frontend
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri = format!(
        "{}://{}:{}{}{}",
        backend.protocol.to_ascii_lowercase(),
        backend.host,
        backend.port,
        backend.path_prefix,
        path_and_query
    );
    Ok(uri.parse::<Uri>().map_err(axum::http::Error::from)?)
}

/// Remove every `Set-Cookie` header, returning the values in order.
pub fn take_set_cookies(headers: &mut HeaderMap) -> Vec<axum::http::HeaderValue> {
    match headers.entry(header::SET_COOKIE) {
        header::Entry::Occupied(entry) => entry.remove_entry_mult().1.collect(),
        header::Entry::Vacant(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, MappingConfig};
    use axum::http::{HeaderValue, Method};

    fn mapping(path_prefix: &str) -> Mapping {
        Mapping::from_config(&MappingConfig {
            name: "app".into(),
            context_root: "/app".into(),
            backend: BackendConfig {
                host: "10.0.0.5".into(),
                port: 8081,
                path_prefix: path_prefix.into(),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn target_keeps_path_and_query() {
        let uri: Uri = "/app/list?page=2".parse().unwrap();
        assert_eq!(
            target_uri(&mapping(""), &uri).unwrap().to_string(),
            "http://10.0.0.5:8081/app/list?page=2"
        );
        assert_eq!(
            target_uri(&mapping("/internal"), &uri).unwrap().to_string(),
            "http://10.0.0.5:8081/internal/app/list?page=2"
        );
    }

    #[test]
    fn rejects_unsupported_transfer_encoding() {
        let gzip = parts(Request::builder().header("transfer-encoding", "gzip"));
        assert!(matches!(
            BackendConnector::validate(&gzip),
            Err(GatewayError::UnsupportedTransferEncoding(_))
        ));

        let chunked = parts(Request::builder().header("transfer-encoding", "chunked"));
        assert!(BackendConnector::validate(&chunked).is_ok());
    }

    #[test]
    fn rejects_unreadable_versions() {
        let old = parts(Request::builder().version(Version::HTTP_09));
        assert!(matches!(
            BackendConnector::validate(&old),
            Err(GatewayError::UnsupportedVersion(_))
        ));
    }

    #[tokio::test]
    async fn build_request_preserves_custom_methods() {
        let connector = BackendConnector::new(ProxySettings::default());
        let method = Method::from_bytes(b"PROPFIND").unwrap();
        let frontend = parts(Request::builder().method(method.clone()).uri("/app/dav"));

        let request = connector
            .build_request(&mapping(""), &frontend, Body::empty(), &Injection::default(), 8080)
            .unwrap();
        assert_eq!(request.method(), method);
        assert_eq!(request.uri(), "http://10.0.0.5:8081/app/dav");
    }

    #[test]
    fn set_cookies_are_taken_in_order() {
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let taken = take_set_cookies(&mut headers);
        assert_eq!(taken, vec!["a=1", "b=2"]);
        assert!(headers.get(header::SET_COOKIE).is_none());
        assert_eq!(headers.len(), 1);
    }
}

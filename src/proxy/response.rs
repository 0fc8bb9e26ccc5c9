//! Backend response reconciliation.
//!
//! # Responsibilities
//! - Copy status and reason phrase
//! - Resolve the `Date` header (backend value, else a warning date, else now)
//! - Drop `Warning` headers describing another instant
//! - Pick the body forwarding mode from the backend's framing headers
//!
//! # Data Flow
//! ```text
//! backend response head
//!     → reconcile_headers (Date, Warning, hop-by-hop removal)
//!     → body_mode (chunked | content-length | buffered)
//!     → relay: pump or buffer the body into the frontend response
//! ```

use axum::{
    body::Body,
    http::{
        header::{self, HeaderName},
        HeaderMap, HeaderValue, Method, Response, StatusCode, Version,
    },
};
use bytes::Bytes;
use hyper::body::Body as HttpBody;
use time::OffsetDateTime;

use crate::error::GatewayError;
use crate::proxy::date::{format_http_date, parse_http_date, warning_date};
use crate::proxy::headers::is_hop_by_hop;
use crate::proxy::pump::{self, BoxError};

/// How the response body travels to the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Backend streamed chunks; relay them as they arrive.
    Chunked,
    /// Backend announced a length; pump exactly that many bytes.
    ContentLength(u64),
    /// No framing information; read everything, then write once.
    Buffered,
}

/// Decide the body mode from the backend headers.
pub fn body_mode(headers: &HeaderMap, frontend: Version) -> Result<BodyMode, GatewayError> {
    if let Some(te) = headers.get(header::TRANSFER_ENCODING) {
        let value = te.to_str().unwrap_or_default().trim();
        if !value.eq_ignore_ascii_case("chunked") {
            return Err(GatewayError::UnsupportedResponseEncoding(value.to_string()));
        }
        if !supports_chunked(frontend) {
            return Err(GatewayError::ChunkedNotSupported(frontend));
        }
        return Ok(BodyMode::Chunked);
    }

    let length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    Ok(match length {
        Some(n) => BodyMode::ContentLength(n),
        None => BodyMode::Buffered,
    })
}

/// HTTP/1.0 has no chunked framing.
fn supports_chunked(version: Version) -> bool {
    version == Version::HTTP_11 || version == Version::HTTP_2
}

/// Build the frontend response headers from the backend's.
pub fn reconcile_headers(backend: &HeaderMap, now: OffsetDateTime) -> HeaderMap {
    let (date_value, date_instant) = resolve_date(backend, now);

    let mut out = HeaderMap::with_capacity(backend.len() + 1);
    out.insert(header::DATE, date_value);

    for warning in backend.get_all(header::WARNING) {
        let embedded = warning.to_str().ok().and_then(warning_date);
        let stale = matches!((embedded, date_instant), (Some(w), Some(d)) if w != d);
        if stale {
            tracing::debug!(warning = ?warning, "Dropping stale warning");
        } else {
            out.append(header::WARNING, warning.clone());
        }
    }

    for (name, value) in backend {
        if skip_on_copy(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    out
}

fn skip_on_copy(name: &HeaderName) -> bool {
    name == header::DATE || name == header::WARNING || is_hop_by_hop(name)
}

fn resolve_date(backend: &HeaderMap, now: OffsetDateTime) -> (HeaderValue, Option<OffsetDateTime>) {
    if let Some(value) = backend.get(header::DATE) {
        if let Some(instant) = value.to_str().ok().and_then(parse_http_date) {
            return (value.clone(), Some(instant));
        }
    }

    let from_warning = backend
        .get_all(header::WARNING)
        .iter()
        .find_map(|w| w.to_str().ok().and_then(warning_date));
    let instant = from_warning.unwrap_or(now);

    let value = HeaderValue::from_str(&format_http_date(instant))
        .unwrap_or_else(|_| HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"));
    (value, Some(instant))
}

/// Responses that never carry a body, so no length is synthesised for them.
fn is_bodiless(status: StatusCode, method: &Method) -> bool {
    *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Turn a backend response into the frontend response.
///
/// Headers are reconciled before any body byte is forwarded.
pub async fn relay<B>(
    backend: Response<B>,
    frontend: Version,
    method: &Method,
) -> Result<Response<Body>, GatewayError>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let (parts, body) = backend.into_parts();
    let mode = body_mode(&parts.headers, frontend)?;
    let mut headers = reconcile_headers(&parts.headers, OffsetDateTime::now_utc());

    let body = match mode {
        BodyMode::Chunked | BodyMode::ContentLength(_) => pump::pump(body, "backend->frontend"),
        BodyMode::Buffered if is_bodiless(parts.status, method) => Body::empty(),
        BodyMode::Buffered => {
            let bytes = pump::buffer(body)
                .await
                .map_err(|e| GatewayError::BackendBody(e.to_string()))?;
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            Body::from(bytes)
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = parts.status;
    *response.headers_mut() = headers;
    if let Some(reason) = parts.extensions.get::<hyper::ext::ReasonPhrase>() {
        response.extensions_mut().insert(reason.clone());
    }
    Ok(response)
}

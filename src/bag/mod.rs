//! Cookie and header bags.
//!
//! # Data Flow
//! ```text
//! backend Set-Cookie ──▶ CookieBag::store (path = cookie Path | context root)
//!                             │
//! next request path ──▶ CookieBag::cookie_header_for ──▶ outbound Cookie:
//!
//! derived header (e.g. SAML bearer) ──▶ HeaderBag::store_header
//!                                           │
//! request start ──▶ HeaderBag::headers_for_request ──▶ working set ──▶ outbound headers
//! ```
//!
//! Both bags live inside a session and are only touched under its lock.

pub mod cookie;
pub mod header;

pub use self::cookie::{CookieBag, StoredCookie};
pub use self::header::HeaderBag;

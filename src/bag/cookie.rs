//! Session-scoped cookie replay cache.
//!
//! Cookies set by backends are kept server-side, indexed by path prefix,
//! and replayed as a single `Cookie:` header on every later request whose
//! path starts with a stored prefix.

use ::cookie::Cookie;

/// A stored name/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
}

/// Path-prefix indexed cookie store.
///
/// Prefixes and the cookies under each prefix keep insertion order. Names
/// are unique within one prefix only.
#[derive(Debug, Clone, Default)]
pub struct CookieBag {
    paths: Vec<(String, Vec<StoredCookie>)>,
}

impl CookieBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Set-Cookie` value and store it.
    ///
    /// The cookie's own `Path` wins; otherwise `default_path` (the mapping's
    /// context root) is used. Returns the stored cookie name, or `None` when
    /// the value does not parse.
    pub fn store(&mut self, default_path: &str, set_cookie: &str) -> Option<String> {
        let parsed = match Cookie::parse(set_cookie) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unparsable Set-Cookie");
                return None;
            }
        };
        let path = parsed
            .path()
            .filter(|p| !p.is_empty())
            .unwrap_or(default_path)
            .to_string();
        let name = parsed.name().to_string();
        tracing::debug!(cookie = %name, path = %path, "Storing cookie in bag");
        self.insert(&path, &name, parsed.value());
        Some(name)
    }

    /// Store every value of a `Set-Cookie` header list.
    pub fn store_all<'a, I>(&mut self, default_path: &str, set_cookies: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        set_cookies
            .into_iter()
            .filter_map(|value| self.store(default_path, value))
            .count()
    }

    /// Add or replace `name` under `path`. A replaced cookie moves to the end.
    pub fn insert(&mut self, path: &str, name: &str, value: &str) {
        let cookie = StoredCookie {
            name: name.to_string(),
            value: value.to_string(),
        };
        match self.paths.iter_mut().find(|(p, _)| p == path) {
            Some((_, cookies)) => {
                cookies.retain(|c| c.name != name);
                cookies.push(cookie);
            }
            None => self.paths.push((path.to_string(), vec![cookie])),
        }
    }

    /// Build the `Cookie:` header value for `request_path`.
    ///
    /// Every stored prefix of the path contributes its cookies, in bag order.
    /// The same name may appear more than once when stored under different
    /// prefixes.
    pub fn cookie_header_for(&self, request_path: &str) -> Option<String> {
        let pairs: Vec<String> = self
            .paths
            .iter()
            .filter(|(prefix, _)| request_path.starts_with(prefix.as_str()))
            .flat_map(|(_, cookies)| cookies.iter())
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    pub fn len(&self) -> usize {
        self.paths.iter().map(|(_, cookies)| cookies.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }
}

//! Per-browser session state.

use std::collections::HashMap;
use std::time::Instant;

use crate::bag::{CookieBag, HeaderBag};
use crate::session::role::Role;

/// Server-side state of one browser session.
///
/// Only mutated while the owning [`SessionHandle`](crate::session::SessionHandle)
/// lock is held.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    roles: Vec<Role>,
    audit_token: Option<String>,
    cookies: CookieBag,
    headers: HeaderBag,
    last_access: HashMap<String, Instant>,
    destroyed: bool,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
            audit_token: None,
            cookies: CookieBag::new(),
            headers: HeaderBag::new(),
            last_access: HashMap::new(),
            destroyed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn role_names(&self) -> Vec<&str> {
        self.roles.iter().map(Role::name).collect()
    }

    /// Grant a role, replacing an existing one with the same name.
    pub fn add_role(&mut self, role: Role) {
        self.roles.retain(|r| r.name() != role.name());
        self.roles.push(role);
    }

    pub fn clear_roles(&mut self) {
        self.roles.clear();
    }

    /// Find the first active role whose name is in `required`, mark it used
    /// and return its name.
    pub fn use_any_role(&mut self, required: &[String], now: Instant) -> Option<&str> {
        let role = self
            .roles
            .iter_mut()
            .find(|r| r.is_active(now) && required.iter().any(|req| req == r.name()))?;
        role.touch(now);
        Some(role.name())
    }

    pub fn audit_token(&self) -> Option<&str> {
        self.audit_token.as_deref()
    }

    pub fn set_audit_token(&mut self, token: impl Into<String>) {
        self.audit_token = Some(token.into());
    }

    pub fn cookies(&self) -> &CookieBag {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut CookieBag {
        &mut self.cookies
    }

    pub fn headers(&self) -> &HeaderBag {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderBag {
        &mut self.headers
    }

    /// Record access to a mapping's context root.
    pub fn record_access(&mut self, context_root: &str, now: Instant) {
        self.last_access.insert(context_root.to_string(), now);
    }

    pub fn last_access(&self, context_root: &str) -> Option<Instant> {
        self.last_access.get(context_root).copied()
    }

    /// Mark the session for removal. All state is dropped.
    pub fn destroy(&mut self) {
        self.roles.clear();
        self.audit_token = None;
        self.cookies.clear();
        self.headers.clear();
        self.last_access.clear();
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

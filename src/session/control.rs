//! Control-channel cookie.
//!
//! Backends mutate session state by setting the reserved [`CONTROL_COOKIE`].
//! Its value is URL-encoded `KEY=VALUE` pairs joined with `&`:
//!
//! ```text
//! ADD_CREDENTIALS=<roles>   add each role (name[:idle[:lifetime]], comma separated)
//! SET_CREDENTIALS=<roles>   clear all roles, then add
//! AUDIT_TOKEN=<value>       store the audit token
//! SESSION=<anything>        log out of every mapping and destroy the session
//! ```
//!
//! Keys are case-insensitive. Pairs that do not split into exactly one key
//! and one value are ignored, as are unknown keys.

use std::time::Instant;
use url::form_urlencoded;

use crate::session::role::Role;
use crate::session::state::Session;

/// Name of the reserved control cookie.
pub const CONTROL_COOKIE: &str = "AL_CONTROL";

/// One decoded control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    AddCredentials(String),
    SetCredentials(String),
    AuditToken(String),
    EndSession(String),
}

/// Result of applying a command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Continue,
    /// A `SESSION` command was seen; the caller must propagate the logout
    /// and destroy the session.
    Logout,
}

/// Decode a control cookie value into commands.
pub fn parse_commands(raw: &str) -> Vec<ControlCommand> {
    let decoded = url_decode(raw);
    decoded
        .split('&')
        .filter_map(|command| {
            let parts: Vec<&str> = command.split('=').collect();
            let [key, value] = parts.as_slice() else {
                if !command.is_empty() {
                    tracing::debug!(command = %command, "Ignoring malformed control command");
                }
                return None;
            };
            let value = url_decode(value);
            match key.to_ascii_uppercase().as_str() {
                "ADD_CREDENTIALS" => Some(ControlCommand::AddCredentials(value)),
                "SET_CREDENTIALS" => Some(ControlCommand::SetCredentials(value)),
                "AUDIT_TOKEN" => Some(ControlCommand::AuditToken(value)),
                "SESSION" => Some(ControlCommand::EndSession(value)),
                other => {
                    tracing::debug!(command = %other, "Ignoring unknown control command");
                    None
                }
            }
        })
        .collect()
}

/// Apply commands to `session` in order.
///
/// Processing stops at the first `SESSION` command.
pub fn apply(session: &mut Session, commands: &[ControlCommand], now: Instant) -> ControlOutcome {
    for command in commands {
        match command {
            ControlCommand::AddCredentials(roles) => {
                for role in Role::parse_list(roles, now) {
                    tracing::info!(session = %session.id(), role = %role.name(), "Adding role");
                    session.add_role(role);
                }
            }
            ControlCommand::SetCredentials(roles) => {
                session.clear_roles();
                for role in Role::parse_list(roles, now) {
                    tracing::info!(session = %session.id(), role = %role.name(), "Setting role");
                    session.add_role(role);
                }
            }
            ControlCommand::AuditToken(token) => {
                tracing::debug!(session = %session.id(), "Storing audit token");
                session.set_audit_token(token.clone());
            }
            ControlCommand::EndSession(reason) => {
                tracing::info!(session = %session.id(), reason = %reason, "Session logout requested");
                return ControlOutcome::Logout;
            }
        }
    }
    ControlOutcome::Continue
}

/// Decode `%XX` escapes and `+` as in form encoding, without splitting.
fn url_decode(raw: &str) -> String {
    let escaped = raw.replace('&', "%26").replace('=', "%3D");
    form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

//! Set-Cookie interception.
//!
//! Runs on every backend (and identity provider) response before any
//! `Set-Cookie` reaches the browser: control cookies are interpreted and
//! dropped, everything else is stored in the cookie bag and forwarded.

use axum::http::HeaderValue;
use std::time::Instant;

use crate::mapping::MappingTable;
use crate::session::control::{self, ControlOutcome, CONTROL_COOKIE};
use crate::session::state::Session;

/// What is left to do with the response after interception.
#[derive(Debug, Default)]
pub struct Harvest {
    /// `Set-Cookie` values to forward to the browser.
    pub forward: Vec<HeaderValue>,
    /// Number of cookies stored in the bag.
    pub stored: usize,
    /// The session was destroyed by a `SESSION` control command.
    pub logged_out: bool,
}

/// Intercept `set_cookies` received under a mapping with `context_root`.
pub fn harvest_set_cookies<I>(
    session: &mut Session,
    context_root: &str,
    set_cookies: I,
    mappings: &MappingTable,
    now: Instant,
) -> Harvest
where
    I: IntoIterator<Item = HeaderValue>,
{
    let mut harvest = Harvest::default();
    let mut regular = Vec::new();

    for value in set_cookies {
        let Ok(text) = value.to_str() else {
            harvest.forward.push(value);
            continue;
        };
        match ::cookie::Cookie::parse(text) {
            Ok(c) if c.name() == CONTROL_COOKIE => {
                // A destroyed session takes no further commands.
                if harvest.logged_out {
                    tracing::debug!(session = %session.id(), "Ignoring control cookie after logout");
                    continue;
                }
                let commands = control::parse_commands(c.value());
                if control::apply(session, &commands, now) == ControlOutcome::Logout {
                    mappings.propagate_logout(session);
                    session.destroy();
                    harvest.logged_out = true;
                }
            }
            _ => {
                regular.push(text.to_string());
                harvest.forward.push(value);
            }
        }
    }

    if !harvest.logged_out {
        harvest.stored = session
            .cookies_mut()
            .store_all(context_root, regular.iter().map(String::as_str));
    }

    harvest
}

//! Authorization flow variants.

use crate::config::validation::{CERTIFICATE_URL, CLIENT_ID, CLIENT_SECRET, SUBJECT_ISSUER};
use crate::config::{FlowType, MappingConfig};

/// Settings of a token-exchange mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenExchangeSettings {
    /// Token endpoint of the identity provider.
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
    pub subject_issuer: String,
    /// JWKS endpoint for verifying a presented JWT cookie.
    pub certificate_url: Option<String>,
}

/// How a mapping authorizes and denies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Role check, 401 on denial.
    Unauthorized,
    /// Role check, 403 on denial.
    Forbidden,
    /// Role check, 302 to `url` on denial.
    Redirect { url: String },
    /// Role check backed by a single identity provider call.
    OneShot { url: String },
    /// JWT cookie, else SAML bearer exchanged for a JWT.
    TokenExchange(TokenExchangeSettings),
    /// Builtin fallback.
    DenyAll,
}

impl Flow {
    pub fn from_config(config: &MappingConfig) -> Self {
        let url = config.denied_access_url.clone().unwrap_or_default();
        let setting = |key: &str| config.config.get(key).cloned().unwrap_or_default();

        match config.authentication_flow {
            FlowType::Code401 => Flow::Unauthorized,
            FlowType::Code403 => Flow::Forbidden,
            FlowType::Redirect => Flow::Redirect { url },
            FlowType::OneShot => Flow::OneShot { url },
            FlowType::TokenExchange => Flow::TokenExchange(TokenExchangeSettings {
                url,
                client_id: setting(CLIENT_ID),
                client_secret: setting(CLIENT_SECRET),
                subject_issuer: setting(SUBJECT_ISSUER),
                certificate_url: config
                    .config
                    .get(CERTIFICATE_URL)
                    .filter(|u| !u.trim().is_empty())
                    .cloned(),
            }),
        }
    }

    /// Metric/log label.
    pub fn label(&self) -> &'static str {
        match self {
            Flow::Unauthorized => "unauthorized",
            Flow::Forbidden => "forbidden",
            Flow::Redirect { .. } => "redirect",
            Flow::OneShot { .. } => "oneshot",
            Flow::TokenExchange(_) => "token_exchange",
            Flow::DenyAll => "deny_all",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_exchange_settings_come_from_config_map() {
        let mut config = MappingConfig {
            authentication_flow: FlowType::TokenExchange,
            denied_access_url: Some("http://idp/token".into()),
            ..Default::default()
        };
        config.config.insert(CLIENT_ID.into(), "portal".into());
        config.config.insert(CLIENT_SECRET.into(), "s3cret".into());
        config.config.insert(SUBJECT_ISSUER.into(), "idp".into());
        config.config.insert(CERTIFICATE_URL.into(), " ".into());

        let Flow::TokenExchange(settings) = Flow::from_config(&config) else {
            panic!("expected token exchange");
        };
        assert_eq!(settings.url, "http://idp/token");
        assert_eq!(settings.client_id, "portal");
        assert_eq!(settings.client_secret, "s3cret");
        assert_eq!(settings.subject_issuer, "idp");
        assert!(settings.certificate_url.is_none());
    }

    #[test]
    fn simple_flows_map_directly() {
        let config = MappingConfig {
            authentication_flow: FlowType::Redirect,
            denied_access_url: Some("/login".into()),
            ..Default::default()
        };
        assert_eq!(Flow::from_config(&config), Flow::Redirect { url: "/login".into() });
        assert_eq!(Flow::from_config(&MappingConfig::default()), Flow::Unauthorized);
    }
}

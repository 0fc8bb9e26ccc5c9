//! Identity provider collaborators.
//!
//! - `client`: one-shot and token-exchange calls
//! - `jwt`: signed token verification
//! - `saml`: SAML envelope helpers

pub mod client;
pub mod jwt;
pub mod saml;

use std::sync::Arc;

pub use client::{IdentityClient, IdpResponse, TokenExchangeGrant};
pub use jwt::{JwksVerifier, TokenVerifier};
pub use saml::{SamlDecoder, XmlSamlDecoder};

use crate::config::IdentityConfig;

/// Everything the authorization flows need to talk to the identity side.
#[derive(Clone)]
pub struct IdentityServices {
    pub client: IdentityClient,
    pub verifier: Arc<dyn TokenVerifier>,
    pub saml: Arc<dyn SamlDecoder>,
}

impl IdentityServices {
    /// Production wiring: JWKS verification and the XML SAML decoder.
    pub fn new(config: &IdentityConfig) -> Result<Self, reqwest::Error> {
        let client = IdentityClient::new(config)?;
        let jwks_http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            verifier: Arc::new(JwksVerifier::new(jwks_http)),
            saml: Arc::new(XmlSamlDecoder),
        })
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = verifier;
        self
    }
}

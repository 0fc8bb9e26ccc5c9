//! Signed JWT verification against a JWKS endpoint.

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use std::collections::HashSet;

/// Verifies a bearer JWT. Any failure means "not valid".
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str, certificate_url: &str, audience: Option<&str>) -> bool;
}

/// RS256 verifier resolving keys by `kid` from the certificate URL.
///
/// Keys are cached per `(url, kid)`; an unknown kid triggers one refetch.
#[derive(Default)]
pub struct JwksVerifier {
    http: reqwest::Client,
    keys: DashMap<(String, String), DecodingKey>,
}

impl JwksVerifier {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            keys: DashMap::new(),
        }
    }

    async fn key_for(&self, certificate_url: &str, kid: &str) -> Option<DecodingKey> {
        let cache_key = (certificate_url.to_string(), kid.to_string());
        if let Some(key) = self.keys.get(&cache_key) {
            return Some(key.clone());
        }

        let set = match self.fetch(certificate_url).await {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!(url = %certificate_url, error = %e, "JWKS fetch failed");
                return None;
            }
        };

        for jwk in &set.keys {
            let Some(id) = jwk.common.key_id.as_deref() else {
                continue;
            };
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => {
                    self.keys
                        .insert((certificate_url.to_string(), id.to_string()), key);
                }
                Err(e) => tracing::debug!(kid = %id, error = %e, "Skipping unusable JWK"),
            }
        }
        self.keys.get(&cache_key).map(|k| k.clone())
    }

    async fn fetch(&self, certificate_url: &str) -> Result<JwkSet, reqwest::Error> {
        self.http
            .get(certificate_url)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await
    }
}

/// Validation rules: RS256, `exp`/`nbf` checked when present, audience optional.
pub fn validation_for(audience: Option<&str>) -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.required_spec_claims = HashSet::new();
    match audience.map(str::trim).filter(|a| !a.is_empty()) {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }
    validation
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str, certificate_url: &str, audience: Option<&str>) -> bool {
        let header = match decode_header(token) {
            Ok(header) => header,
            Err(e) => {
                tracing::debug!(error = %e, "Malformed JWT");
                return false;
            }
        };
        let Some(kid) = header.kid else {
            tracing::debug!("JWT without key id");
            return false;
        };
        let Some(key) = self.key_for(certificate_url, &kid).await else {
            tracing::debug!(kid = %kid, "No verification key");
            return false;
        };

        match decode::<serde_json::Value>(token, &key, &validation_for(audience)) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "JWT rejected");
                false
            }
        }
    }
}

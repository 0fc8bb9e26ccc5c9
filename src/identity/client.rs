//! Out-of-band identity provider calls.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;
use serde::Deserialize;
use std::time::Duration;

use crate::config::IdentityConfig;

pub const GRANT_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
pub const TOKEN_TYPE_SAML2: &str = "urn:ietf:params:oauth:token-type:saml2";

/// Answer of the identity provider, reduced to what the flows need.
#[derive(Debug, Clone)]
pub struct IdpResponse {
    pub status: StatusCode,
    pub set_cookies: Vec<HeaderValue>,
    pub body: Bytes,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

impl IdpResponse {
    /// `access_token` of a 200 JSON answer.
    pub fn access_token(&self) -> Option<String> {
        if self.status != StatusCode::OK {
            return None;
        }
        serde_json::from_slice::<TokenResponse>(&self.body)
            .ok()
            .and_then(|t| t.access_token)
            .filter(|t| !t.is_empty())
    }
}

/// Form fields of an OAuth2 token-exchange grant.
#[derive(Debug, Clone)]
pub struct TokenExchangeGrant<'a> {
    pub subject_token: &'a str,
    pub subject_issuer: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// HTTP client for one-shot and token-exchange calls.
///
/// Connections are not kept alive between calls.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
}

impl IdentityClient {
    pub fn new(config: &IdentityConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(0)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;
        Ok(Self { http })
    }

    /// `grant_type=password&client_id=<mapping>` with the allow-listed headers.
    pub async fn one_shot(
        &self,
        url: &str,
        client_id: &str,
        headers: HeaderMap,
    ) -> Result<IdpResponse, reqwest::Error> {
        tracing::debug!(url = %url, client_id = %client_id, "One-shot call");
        let response = self
            .http
            .post(url)
            .headers(headers)
            .form(&[("grant_type", "password"), ("client_id", client_id)])
            .send()
            .await?;
        collect(response).await
    }

    /// OAuth2 token exchange of a SAML assertion.
    pub async fn token_exchange(
        &self,
        url: &str,
        grant: TokenExchangeGrant<'_>,
    ) -> Result<IdpResponse, reqwest::Error> {
        tracing::debug!(url = %url, client_id = %grant.client_id, "Token exchange call");
        let response = self
            .http
            .post(url)
            .form(&[
                ("grant_type", GRANT_TOKEN_EXCHANGE),
                ("subject_token_type", TOKEN_TYPE_SAML2),
                ("subject_token", grant.subject_token),
                ("subject_issuer", grant.subject_issuer),
                ("client_id", grant.client_id),
                ("client_secret", grant.client_secret),
            ])
            .send()
            .await?;
        collect(response).await
    }
}

async fn collect(response: reqwest::Response) -> Result<IdpResponse, reqwest::Error> {
    let status = response.status();
    let set_cookies = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .cloned()
        .collect();
    let body = response.bytes().await?;
    Ok(IdpResponse {
        status,
        set_cookies,
        body,
    })
}

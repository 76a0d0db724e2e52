//! Authorisation-code token exchange and consent authorisation URLs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token exchange not configured: {0}")]
    NotConfigured(String),

    #[error("token endpoint rejected exchange ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("token endpoint unreachable: {0}")]
    Network(String),

    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// One authorisation-code exchange.
#[derive(Debug, Clone)]
pub struct TokenRequest<'a> {
    pub token_endpoint: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_url: &'a str,
    pub code: &'a str,
    pub scope: &'a str,
}

#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, request: &TokenRequest<'_>) -> Result<TokenResponse, TokenError>;
}

/// `authorization_code` grant with `client_secret_basic` authentication.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    client: reqwest::Client,
}

impl OAuthClient {
    pub fn new(timeout: Duration) -> Result<Self, TokenError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(|e| TokenError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TokenExchanger for OAuthClient {
    async fn exchange(&self, request: &TokenRequest<'_>) -> Result<TokenResponse, TokenError> {
        if request.token_endpoint.is_empty() {
            return Err(TokenError::NotConfigured("token_endpoint is not set".to_string()));
        }

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", request.code),
            ("redirect_uri", request.redirect_url),
        ];
        if !request.scope.is_empty() {
            form.push(("scope", request.scope));
        }

        let response = self
            .client
            .post(request.token_endpoint)
            .basic_auth(request.client_id, Some(request.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| TokenError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TokenError::Network(e.to_string()))?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "token exchange rejected");
            return Err(TokenError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| TokenError::InvalidResponse(e.to_string()))?;
        if token.access_token.is_empty() {
            return Err(TokenError::InvalidResponse("empty access_token".to_string()));
        }
        debug!(expires_in = ?token.expires_in, "token exchanged");
        Ok(token)
    }
}

/// PSU authorisation URL for one consent bundle; `state` carries the
/// bundle name back through the redirect.
pub fn authorization_url(
    authorization_endpoint: &str,
    client_id: &str,
    redirect_url: &str,
    scopes: &[String],
    state: &str,
) -> Option<String> {
    let mut url = url::Url::parse(authorization_endpoint).ok()?;
    url.query_pairs_mut()
        .append_pair("response_type", "code id_token")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_url)
        .append_pair("scope", &scopes.join(" "))
        .append_pair("state", state)
        .append_pair("nonce", state);
    Some(url.into())
}

//! Authorization-code exchange against the provider token endpoint

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::server::ApiError;

/// Parsed `{ code, redirectUri? }` request body
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRequest {
    pub code: String,
    pub redirect_uri: Option<String>,
}

impl ExchangeRequest {
    /// Parse the body; anything without a usable `code` is [`ApiError::MissingCode`]
    pub fn parse(body: &[u8]) -> Result<Self, ApiError> {
        let value: Value = serde_json::from_slice(body).map_err(|e| {
            debug!("Rejecting exchange request body: {e}");
            ApiError::MissingCode
        })?;

        let code = value
            .get("code")
            .and_then(Value::as_str)
            .filter(|code| !code.trim().is_empty())
            .ok_or(ApiError::MissingCode)?
            .to_string();

        let redirect_uri = value
            .get("redirectUri")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
            .map(str::to_string);

        Ok(Self { code, redirect_uri })
    }

    /// The caller's redirect URI, or `default` for the popup flow
    pub fn redirect_uri_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.redirect_uri.as_deref().unwrap_or(default)
    }
}

/// OAuth client credentials
#[derive(Clone, Copy)]
pub struct ClientCredentials<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// Successful token endpoint response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenSet {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Structured error body returned by the token endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderError {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ProviderError {
    /// `error: description`, or just `error`
    pub fn summary(&self) -> String {
        match self.error_description.as_deref() {
            Some(description) if !description.is_empty() => {
                format!("{}: {}", self.error, description)
            }
            _ => self.error.clone(),
        }
    }

    fn into_api_error(self) -> ApiError {
        let reason = match self.error_description.as_deref() {
            Some(description) if !description.is_empty() => description.to_string(),
            _ => self.error.clone(),
        };
        ApiError::authentication(format!("Authentication failed: {reason}"), Some(self.summary()))
    }
}

/// Exchange `code` for a token set. No retries: codes are single-use.
pub async fn exchange_code(
    client: &reqwest::Client,
    token_url: &str,
    credentials: ClientCredentials<'_>,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenSet, ApiError> {
    let form = [
        ("code", code),
        ("client_id", credentials.client_id),
        ("client_secret", credentials.client_secret),
        ("redirect_uri", redirect_uri),
        ("grant_type", "authorization_code"),
    ];

    let response = client
        .post(token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            error!(error_message = %e, "Token endpoint request failed");
            ApiError::upstream("Failed to reach the Google token endpoint", None)
        })?;

    let status = response.status();
    let body = response.bytes().await.map_err(|e| {
        error!(error_message = %e, "Failed to read token endpoint response");
        ApiError::upstream("Failed to read the Google token endpoint response", None)
    })?;

    if !status.is_success() {
        return Err(match serde_json::from_slice::<ProviderError>(&body) {
            Ok(provider) => {
                warn!(
                    status = %status,
                    provider_error = %provider.error,
                    "Token endpoint rejected authorization code"
                );
                provider.into_api_error()
            }
            Err(_) => {
                warn!(status = %status, body_length = body.len(), "Token endpoint returned unstructured error");
                ApiError::authentication(
                    "Authentication failed",
                    Some(format!("token endpoint returned status {}", status.as_u16())),
                )
            }
        });
    }

    serde_json::from_slice::<TokenSet>(&body).map_err(|e| {
        error!(error_message = %e, "Unparseable token endpoint response");
        ApiError::upstream("Unexpected response from the Google token endpoint", None)
    })
}

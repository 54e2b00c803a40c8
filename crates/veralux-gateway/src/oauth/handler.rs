//! `POST /api/auth/google` - Google sign-in code exchange

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
};
use tracing::info;

use super::claims::{ExchangeResponse, IdentityClaims};
use super::exchange::{ClientCredentials, ExchangeRequest, exchange_code};
use crate::server::{ApiError, AppState, TimestampedError};

/// Exchange an authorization code for a verified identity
pub async fn google_exchange_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ExchangeResponse>, TimestampedError> {
    let body = body.map_err(ApiError::from)?;
    let request = ExchangeRequest::parse(&body)?;

    let credentials = state.credentials();
    let client_id = credentials
        .google_client_id
        .as_deref()
        .ok_or_else(|| ApiError::Configuration("Google Client ID not configured".to_string()))?;
    let client_secret = credentials.google_client_secret.as_deref().ok_or_else(|| {
        ApiError::Configuration("Google Client Secret not configured".to_string())
    })?;

    let oauth = &state.config.oauth;
    let tokens = exchange_code(
        &state.oauth_client,
        &oauth.token_url,
        ClientCredentials {
            client_id,
            client_secret,
        },
        &request.code,
        request.redirect_uri_or(&oauth.default_redirect_uri),
    )
    .await?;

    let id_token = tokens.id_token.ok_or(ApiError::TokenExchangeIncomplete)?;
    let payload = state
        .verifier
        .verify(&id_token, client_id)
        .await
        .map_err(ApiError::from)?;
    let user = IdentityClaims::from_payload(&payload)?;

    info!(sub = %user.sub, "Google sign-in exchange completed");
    Ok(Json(ExchangeResponse { jwt: id_token, user }))
}

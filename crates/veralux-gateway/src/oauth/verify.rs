//! Identity token verification against the provider's published keys
//!
//! Tokens must be RS256 and carry a `kid`. Keys come from the JWKS endpoint and
//! are cached for a configurable TTL; an unknown `kid` forces one refetch so
//! that key rotation is picked up without waiting for the cache to expire.

use std::time::{Duration, Instant};

use jsonwebtoken::{
    Algorithm, DecodingKey, Validation, decode, decode_header,
    jwk::{Jwk, JwkSet},
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::OAuthConfig;
use crate::server::ApiError;

/// Identity token verification failures
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token header has no key id")]
    MissingKeyId,

    #[error("unsupported signing algorithm {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    #[error("failed to fetch signing keys: {0}")]
    KeyFetch(String),

    #[error("no signing key for kid {0}")]
    KeyNotFound(String),

    #[error("unusable signing key: {0}")]
    InvalidKey(String),

    #[error("token rejected: {0}")]
    Rejected(String),
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::KeyFetch(_) => {
                ApiError::upstream("Failed to fetch Google signing keys", Some(err.to_string()))
            }
            other => ApiError::authentication(
                "Authentication failed: invalid ID token",
                Some(other.to_string()),
            ),
        }
    }
}

struct CachedJwks {
    jwks: JwkSet,
    fetched_at: Instant,
}

impl CachedJwks {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() > ttl
    }
}

/// Verifies provider-issued identity tokens
pub struct IdTokenVerifier {
    client: reqwest::Client,
    jwks_url: String,
    issuers: Vec<String>,
    ttl: Duration,
    leeway_secs: u64,
    cache: RwLock<Option<CachedJwks>>,
}

impl IdTokenVerifier {
    pub fn new(
        client: reqwest::Client,
        jwks_url: impl Into<String>,
        issuers: Vec<String>,
        ttl: Duration,
        leeway_secs: u64,
    ) -> Self {
        Self {
            client,
            jwks_url: jwks_url.into(),
            issuers,
            ttl,
            leeway_secs,
            cache: RwLock::new(None),
        }
    }

    pub fn from_config(config: &OAuthConfig, client: reqwest::Client) -> Self {
        Self::new(
            client,
            config.jwks_url.clone(),
            config.issuers.clone(),
            Duration::from_secs(config.jwks_cache_ttl_secs),
            config.leeway_secs,
        )
    }

    /// Verify `token` for `audience` and return its claims payload
    pub async fn verify(&self, token: &str, audience: &str) -> Result<Value, VerifyError> {
        let header = decode_header(token).map_err(|e| VerifyError::Malformed(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(VerifyError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;

        let jwk = self.key_for(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|e| VerifyError::InvalidKey(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[audience]);
        validation.set_issuer(self.issuers.as_slice());
        validation.leeway = self.leeway_secs;

        let data = decode::<Value>(token, &key, &validation)
            .map_err(|e| VerifyError::Rejected(e.to_string()))?;
        debug!(kid = %kid, "Identity token verified");
        Ok(data.claims)
    }

    async fn key_for(&self, kid: &str) -> Result<Jwk, VerifyError> {
        let jwks = self.cached_jwks().await?;
        if let Some(key) = jwks.find(kid) {
            return Ok(key.clone());
        }

        warn!(kid, "Signing key not in cached JWKS, refreshing");
        let jwks = self.refresh().await?;
        jwks.find(kid)
            .cloned()
            .ok_or_else(|| VerifyError::KeyNotFound(kid.to_string()))
    }

    async fn cached_jwks(&self) -> Result<JwkSet, VerifyError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if !cached.is_expired(self.ttl) {
                    return Ok(cached.jwks.clone());
                }
            }
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<JwkSet, VerifyError> {
        let jwks = self.fetch_jwks().await?;
        *self.cache.write().await = Some(CachedJwks {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        Ok(jwks)
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, VerifyError> {
        debug!(url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| VerifyError::KeyFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VerifyError::KeyFetch(format!("HTTP {}", response.status())));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| VerifyError::KeyFetch(e.to_string()))?;
        debug!(keys = jwks.keys.len(), "Fetched JWKS");
        Ok(jwks)
    }
}

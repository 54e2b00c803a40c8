//! Request-time credential lookup
//!
//! Credentials live outside the config file. Each request captures a
//! [`CredentialSnapshot`] from a [`SecretSource`] and works from that copy.

use std::collections::HashMap;

use crate::config::Config;

/// Where credentials are read from
#[derive(Debug, Clone, Default)]
pub enum SecretSource {
    /// Process environment variables
    #[default]
    Env,
    /// Fixed values, keyed by variable name
    Fixed(HashMap<String, String>),
}

impl SecretSource {
    /// Build a fixed source from `(name, value)` pairs
    pub fn fixed<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Fixed(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Look up a value; blank values count as unset
    pub fn get(&self, name: &str) -> Option<String> {
        let value = match self {
            Self::Env => std::env::var(name).ok(),
            Self::Fixed(values) => values.get(name).cloned(),
        }?;

        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Credentials captured for a single request
#[derive(Clone, Default, PartialEq)]
pub struct CredentialSnapshot {
    pub completion_api_key: Option<String>,
    pub completion_model: Option<String>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
}

impl CredentialSnapshot {
    pub fn capture(config: &Config, source: &SecretSource) -> Self {
        Self {
            completion_api_key: source.get(&config.completion.api_key_env),
            completion_model: source.get(&config.completion.model_env),
            google_client_id: source.get(&config.oauth.client_id_env),
            google_client_secret: source.get(&config.oauth.client_secret_env),
        }
    }
}

// Keep secrets out of debug logs.
impl std::fmt::Debug for CredentialSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(value: &Option<String>) -> &'static str {
            if value.is_some() { "<set>" } else { "<unset>" }
        }

        f.debug_struct("CredentialSnapshot")
            .field("completion_api_key", &mask(&self.completion_api_key))
            .field("completion_model", &self.completion_model)
            .field("google_client_id", &self.google_client_id)
            .field("google_client_secret", &mask(&self.google_client_secret))
            .finish()
    }
}

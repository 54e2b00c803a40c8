use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{GatewayError, Result};

/// Main configuration structure for the gateway
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Chat-completion upstream configuration
    #[serde(default)]
    pub completion: CompletionConfig,
    /// Google OAuth configuration
    #[serde(default)]
    pub oauth: OAuthConfig,
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GatewayError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, or the first default location that exists.
    ///
    /// Falls back to built-in defaults when no file is found.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        for path in default_config_paths() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(&path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Check that addresses and URLs are well formed
    pub fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;
        parse_url("completion.base_url", &self.completion.base_url)?;
        parse_url("oauth.token_url", &self.oauth.token_url)?;
        parse_url("oauth.jwks_url", &self.oauth.jwks_url)?;
        if self.oauth.issuers.is_empty() {
            return Err(GatewayError::Config(
                "oauth.issuers must name at least one issuer".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::home_dir().map(|h| h.join(".veralux").join("config.toml")),
        dirs::config_dir().map(|c| c.join("veralux").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| GatewayError::Config(format!("Invalid {field} '{value}': {e}")))
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:3000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Origins allowed by CORS (empty = any origin)
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Maximum accepted request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid listen address: {e}")))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            allowed_origins: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Chat-completion upstream configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    /// Base URL of an OpenAI-compatible API; `/chat/completions` is appended
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    /// Model used when the model environment variable is unset
    #[serde(default = "default_completion_model")]
    pub default_model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_completion_api_key_env")]
    pub api_key_env: String,
    /// Environment variable that overrides the model identifier
    #[serde(default = "default_completion_model_env")]
    pub model_env: String,
    /// Connect timeout in seconds (streams themselves are not time-limited)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl CompletionConfig {
    /// Full URL of the streaming chat endpoint
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_completion_base_url(),
            default_model: default_completion_model(),
            api_key_env: default_completion_api_key_env(),
            model_env: default_completion_model_env(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_completion_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_completion_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_completion_model_env() -> String {
    "OPENAI_MODEL".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Google OAuth configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    /// Authorization-code token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// JSON Web Key Set used to verify identity tokens
    #[serde(default = "default_jwks_url")]
    pub jwks_url: String,
    /// Accepted `iss` values
    #[serde(default = "default_issuers")]
    pub issuers: Vec<String>,
    /// Environment variable holding the OAuth client id
    #[serde(default = "default_client_id_env")]
    pub client_id_env: String,
    /// Environment variable holding the OAuth client secret
    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: String,
    /// Redirect URI used when the caller supplies none ("postmessage" = popup flow)
    #[serde(default = "default_redirect_uri")]
    pub default_redirect_uri: String,
    /// Token endpoint and key fetch timeout in seconds
    #[serde(default = "default_oauth_timeout_secs")]
    pub timeout_secs: u64,
    /// How long fetched signing keys are reused
    #[serde(default = "default_jwks_cache_ttl_secs")]
    pub jwks_cache_ttl_secs: u64,
    /// Clock skew tolerance for `exp`/`nbf` checks
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            jwks_url: default_jwks_url(),
            issuers: default_issuers(),
            client_id_env: default_client_id_env(),
            client_secret_env: default_client_secret_env(),
            default_redirect_uri: default_redirect_uri(),
            timeout_secs: default_oauth_timeout_secs(),
            jwks_cache_ttl_secs: default_jwks_cache_ttl_secs(),
            leeway_secs: default_leeway_secs(),
        }
    }
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_jwks_url() -> String {
    "https://www.googleapis.com/oauth2/v3/certs".to_string()
}

fn default_issuers() -> Vec<String> {
    vec![
        "accounts.google.com".to_string(),
        "https://accounts.google.com".to_string(),
    ]
}

fn default_client_id_env() -> String {
    "GOOGLE_CLIENT_ID".to_string()
}

fn default_client_secret_env() -> String {
    "GOOGLE_CLIENT_SECRET".to_string()
}

fn default_redirect_uri() -> String {
    "postmessage".to_string()
}

fn default_oauth_timeout_secs() -> u64 {
    30
}

fn default_jwks_cache_ttl_secs() -> u64 {
    3600
}

fn default_leeway_secs() -> u64 {
    60
}

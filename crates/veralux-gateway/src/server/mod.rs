//! HTTP server: shared state, routing and lifecycle
//!
//! Routes:
//! - `GET /health` liveness probe
//! - `POST /api/chat` streaming assistant relay
//! - `POST /api/auth/google` Google sign-in code exchange

mod error;

pub use error::{ApiError, ErrorBody, TimestampedError};

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, ServerConfig};
use crate::error::{GatewayError, Result};
use crate::oauth::{IdTokenVerifier, google_exchange_handler};
use crate::relay::chat_handler;
use crate::secrets::{CredentialSnapshot, SecretSource};

/// Shared application state for all handlers
pub struct AppState {
    /// Gateway configuration
    pub config: Config,
    /// Where credentials are read from on each request
    pub secrets: SecretSource,
    /// Client for the completion API; no total timeout so streams can run long
    pub completion_client: reqwest::Client,
    /// Client for the token endpoint and JWKS
    pub oauth_client: reqwest::Client,
    /// Identity token verifier with its key cache
    pub verifier: IdTokenVerifier,
}

impl AppState {
    /// Build the state and its HTTP clients
    pub fn new(config: Config, secrets: SecretSource) -> Result<Self> {
        let completion_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.completion.connect_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Client(format!("Failed to create completion client: {e}")))?;

        let oauth_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.oauth.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Client(format!("Failed to create OAuth client: {e}")))?;

        let verifier = IdTokenVerifier::from_config(&config.oauth, oauth_client.clone());

        Ok(Self {
            config,
            secrets,
            completion_client,
            oauth_client,
            verifier,
        })
    }

    /// Read the credentials for one request
    pub fn credentials(&self) -> CredentialSnapshot {
        CredentialSnapshot::capture(&self.config, &self.secrets)
    }
}

/// The gateway HTTP server
pub struct GatewayServer {
    config: Config,
}

impl GatewayServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Bind the listener and serve until a shutdown signal arrives
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.server.socket_addr()?;
        let state = Arc::new(AppState::new(self.config.clone(), SecretSource::Env)?);
        let app = create_router(state);

        tracing::info!("Starting VeraLux gateway on {addr}");
        tracing::info!("Completion API: {}", self.config.completion.base_url);
        if self.config.server.allowed_origins.is_empty() {
            tracing::info!("CORS: any origin allowed");
        } else {
            tracing::info!(
                "CORS: {} origins configured",
                self.config.server.allowed_origins.len()
            );
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Server(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GatewayError::Server(format!("Server error: {e}")))?;

        tracing::info!("Gateway shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes and layers configured
pub fn create_router(state: Arc<AppState>) -> Router {
    let layers = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.server))
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/auth/google", post(google_exchange_handler))
        .fallback(not_found_handler)
        .method_not_allowed_fallback(method_not_allowed_handler)
        .layer(layers)
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn not_found_handler() -> ApiError {
    ApiError::Rejected {
        status: StatusCode::NOT_FOUND,
        message: "Not found".to_string(),
    }
}

async fn method_not_allowed_handler() -> ApiError {
    ApiError::Rejected {
        status: StatusCode::METHOD_NOT_ALLOWED,
        message: "Method not allowed".to_string(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

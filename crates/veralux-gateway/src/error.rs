//! Error types for the VeraLux gateway

use thiserror::Error;

/// Startup and lifecycle errors for the gateway process
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors (unreadable file, bad TOML, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors (bind failures, serve loop errors)
    #[error("Server error: {0}")]
    Server(String),

    /// HTTP client construction errors
    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

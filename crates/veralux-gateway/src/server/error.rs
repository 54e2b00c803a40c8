//! Handler-boundary errors
//!
//! Every failure a handler can hit is one of the [`ApiError`] variants and is
//! rendered as a JSON object with an `error` field. Internal diagnostics are
//! logged here; only the sanitized message and optional provider detail reach
//! the caller.

use axum::{
    Json,
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Errors returned by the relay and OAuth handlers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Request body is not valid JSON
    #[error("{0}")]
    MalformedRequest(String),

    /// Request body parsed but has the wrong shape
    #[error("{0}")]
    InvalidSchema(String),

    /// OAuth request without an authorization code
    #[error("Missing authorization code")]
    MissingCode,

    /// Server-side credential or setting is missing
    #[error("{0}")]
    Configuration(String),

    /// Token endpoint answered without an identity token
    #[error("No ID token received from Google")]
    TokenExchangeIncomplete,

    /// Verified identity token carried no usable claims
    #[error("Invalid token payload")]
    InvalidPayload,

    /// Provider rejected the code or the token failed verification
    #[error("{message}")]
    AuthenticationFailed {
        message: String,
        details: Option<String>,
    },

    /// Upstream service unreachable or failing
    #[error("{message}")]
    Upstream {
        message: String,
        details: Option<String>,
    },

    /// Request refused before a handler ran (oversized body, unknown route)
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl ApiError {
    pub fn authentication(message: impl Into<String>, details: Option<String>) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
            details,
        }
    }

    pub fn upstream(message: impl Into<String>, details: Option<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            details,
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedRequest(_)
            | ApiError::InvalidSchema(_)
            | ApiError::MissingCode
            | ApiError::TokenExchangeIncomplete
            | ApiError::InvalidPayload => StatusCode::BAD_REQUEST,
            ApiError::Configuration(_)
            | ApiError::AuthenticationFailed { .. }
            | ApiError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Rejected { status, .. } => *status,
        }
    }

    /// Error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ApiError::MalformedRequest(_) => "malformed_request",
            ApiError::InvalidSchema(_) => "invalid_schema",
            ApiError::MissingCode => "missing_code",
            ApiError::Configuration(_) => "configuration",
            ApiError::TokenExchangeIncomplete => "token_exchange_incomplete",
            ApiError::InvalidPayload => "invalid_payload",
            ApiError::AuthenticationFailed { .. } => "authentication_failed",
            ApiError::Upstream { .. } => "upstream",
            ApiError::Rejected { .. } => "request_rejected",
        }
    }

    /// Caller-facing diagnostic detail, if any
    pub fn details(&self) -> Option<&str> {
        match self {
            ApiError::AuthenticationFailed { details, .. } | ApiError::Upstream { details, .. } => {
                details.as_deref()
            }
            _ => None,
        }
    }

    fn body(&self, timestamp: Option<String>) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            details: self.details().map(str::to_string),
            timestamp,
        }
    }

    fn log(&self) {
        let status = self.status();
        if status.is_server_error() {
            error!(
                error_type = self.category(),
                status = %status,
                error_message = %self,
                "Request failed"
            );
        } else {
            warn!(
                error_type = self.category(),
                status = %status,
                error_message = %self,
                "Request rejected"
            );
        }
    }

    /// Attach a timestamp to the rendered error body
    pub fn timestamped(self) -> TimestampedError {
        TimestampedError(self)
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

/// JSON error envelope
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        (self.status(), Json(self.body(None))).into_response()
    }
}

/// An [`ApiError`] rendered with an RFC 3339 `timestamp` field
#[derive(Debug)]
pub struct TimestampedError(pub ApiError);

impl From<ApiError> for TimestampedError {
    fn from(error: ApiError) -> Self {
        Self(error)
    }
}

impl IntoResponse for TimestampedError {
    fn into_response(self) -> Response {
        let error = self.0;
        error.log();
        let timestamp = chrono::Utc::now().to_rfc3339();
        (error.status(), Json(error.body(Some(timestamp)))).into_response()
    }
}

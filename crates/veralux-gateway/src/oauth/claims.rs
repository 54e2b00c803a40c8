//! Projection of verified identity claims into the sign-in response

use serde::Serialize;
use serde_json::Value;

use crate::server::ApiError;

/// User fields returned to the dApp
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityClaims {
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub sub: String,
}

impl IdentityClaims {
    /// Project a verified payload; a payload without a string `sub` is rejected
    pub fn from_payload(payload: &Value) -> Result<Self, ApiError> {
        let claims = payload.as_object().ok_or(ApiError::InvalidPayload)?;
        let sub = claims
            .get("sub")
            .and_then(Value::as_str)
            .ok_or(ApiError::InvalidPayload)?
            .to_string();

        let text = |key: &str| claims.get(key).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            email: text("email"),
            name: text("name"),
            picture: text("picture"),
            sub,
        })
    }
}

/// Successful exchange response
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeResponse {
    /// Raw identity token as issued by the provider
    pub jwt: String,
    pub user: IdentityClaims,
}

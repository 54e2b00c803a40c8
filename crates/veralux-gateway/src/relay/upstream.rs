//! Streaming request to the chat-completion API

use reqwest::header::ACCEPT;
use serde::Serialize;
use tracing::{debug, error};

use super::prompts::ChatMessage;
use crate::server::ApiError;

/// Sampling temperature for assistant replies
pub const TEMPERATURE: f32 = 0.35;

/// Longest slice of an upstream error body kept in logs
const MAX_LOGGED_ERROR_BODY: usize = 500;

/// Upstream payload for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: TEMPERATURE,
            stream: true,
        }
    }
}

/// Send the streaming request and wait for the upstream to accept it.
///
/// Returns the response with its body unread. Transport failures and non-2xx
/// statuses are logged in full and surfaced as a sanitized [`ApiError::Upstream`].
pub async fn start_completion(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    request: &CompletionRequest,
) -> Result<reqwest::Response, ApiError> {
    debug!(
        url,
        model = %request.model,
        messages = request.messages.len(),
        "Requesting streaming completion"
    );

    let response = client
        .post(url)
        .bearer_auth(api_key)
        .header(ACCEPT, "text/event-stream")
        .json(request)
        .send()
        .await
        .map_err(|e| {
            let kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connect"
            } else {
                "request"
            };
            error!(error_kind = kind, error_message = %e, "Completion API request failed");
            ApiError::upstream("Failed to reach the completion service", None)
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let end = body
            .char_indices()
            .nth(MAX_LOGGED_ERROR_BODY)
            .map_or(body.len(), |(idx, _)| idx);
        error!(
            status = %status,
            body_length = body.len(),
            body = &body[..end],
            "Completion API returned an error"
        );
        return Err(ApiError::upstream(
            "The completion service returned an error",
            Some(format!("upstream status {}", status.as_u16())),
        ));
    }

    Ok(response)
}

//! `POST /api/chat` - streaming assistant relay

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{State, rejection::BytesRejection},
    http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use tracing::{debug, info};
use uuid::Uuid;

use super::conversation::ChatRequest;
use super::prompts::compose_messages;
use super::stream::{RelayBody, relay_stream};
use super::upstream::{CompletionRequest, start_completion};
use crate::server::{ApiError, AppState};

/// Relay a conversation to the completion API and stream the reply as plain text
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body?;
    let request_id = Uuid::new_v4();
    debug!(%request_id, body_bytes = body.len(), "Received chat relay request");

    let request = ChatRequest::parse(&body)?;
    let turns = request.turns();
    debug!(
        %request_id,
        input_messages = request.messages.len(),
        forwarded_turns = turns.len(),
        has_context = request.context.is_some(),
        "Chat request validated"
    );

    let credentials = state.credentials();
    let api_key = credentials.completion_api_key.as_deref().ok_or_else(|| {
        ApiError::Configuration("Completion API key not configured".to_string())
    })?;
    let model = credentials
        .completion_model
        .clone()
        .unwrap_or_else(|| state.config.completion.default_model.clone());

    let payload = CompletionRequest::new(model, compose_messages(&turns, request.context.as_deref()));
    let upstream = start_completion(
        &state.completion_client,
        &state.config.completion.chat_completions_url(),
        api_key,
        &payload,
    )
    .await?;

    info!(%request_id, model = %payload.model, "Streaming completion to client");
    Ok(text_stream_response(relay_stream(upstream.bytes_stream(), request_id)))
}

fn text_stream_response(body: RelayBody) -> Response {
    (
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (CACHE_CONTROL, "no-cache, no-transform"),
            (CONNECTION, "keep-alive"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

//! Integration tests for the streaming assistant relay
//!
//! The completion API is a wiremock server; the router is driven with
//! `tower::ServiceExt::oneshot`.

mod common;

use axum::http::{StatusCode, header};
use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

use common::{app, body_json, body_text, config_for, post_json, send};
use veralux_gateway::secrets::SecretSource;

fn sse(fragments: &[&str]) -> String {
    let mut body = String::from(": keep-alive\n\n");
    body.push_str(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
    );
    for fragment in fragments {
        let event = serde_json::json!({"choices": [{"index": 0, "delta": {"content": fragment}}]});
        body.push_str(&format!("data: {event}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn secrets_with_key() -> SecretSource {
    SecretSource::fixed([("OPENAI_API_KEY", "sk-test")])
}

async fn mount_completion(server: &MockServer, body: String) {
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/chat/completions"))
        .and(matchers::header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(server)
        .await;
}

// =============================================================================
// Successful relays
// =============================================================================

#[tokio::test]
async fn test_streams_reply_as_plain_text() {
    let server = MockServer::start().await;
    mount_completion(&server, sse(&["Hello", " from", " Lux!"])).await;

    let app = app(config_for(&server), secrets_with_key());
    let response = send(
        app,
        post_json(
            "/api/chat",
            r#"{"messages":[{"sender":"user","content":"Hello"}]}"#,
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache, no-transform"
    );
    assert_eq!(body_text(response).await, "Hello from Lux!");
}

#[tokio::test]
async fn test_upstream_payload_shape() {
    let server = MockServer::start().await;
    mount_completion(&server, sse(&["ok"])).await;

    let app = app(config_for(&server), secrets_with_key());
    let body = serde_json::json!({
        "messages": [
            {"sender": "user", "content": "What is VeraLux?"},
            {"sender": "ai", "content": "A social identity network."},
            {"sender": "user", "content": "   "},
            {"sender": "user", "content": "x".repeat(9000)}
        ],
        "context": "Viewing the marketplace"
    });
    let response = send(app, post_json("/api/chat", body.to_string())).await;
    assert_eq!(body_text(response).await, "ok");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();

    assert_eq!(sent["model"], "gpt-4o-mini");
    assert_eq!(sent["stream"], true);

    let messages = sent["messages"].as_array().unwrap();
    let roles: Vec<&str> = messages.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["system", "system", "user", "assistant", "user"]);
    assert!(messages[1]["content"].as_str().unwrap().contains("Viewing the marketplace"));
    assert_eq!(messages[4]["content"].as_str().unwrap().chars().count(), 8000);
}

#[tokio::test]
async fn test_model_override_from_environment() {
    let server = MockServer::start().await;
    mount_completion(&server, sse(&["hi"])).await;

    let secrets = SecretSource::fixed([("OPENAI_API_KEY", "sk-test"), ("OPENAI_MODEL", "gpt-4o")]);
    let app = app(config_for(&server), secrets);
    let response = send(app, post_json("/api/chat", r#"{"messages":[]}"#)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let _ = body_text(response).await;

    let requests = server.received_requests().await.unwrap();
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["model"], "gpt-4o");
}

// =============================================================================
// Rejected requests
// =============================================================================

#[tokio::test]
async fn test_non_array_messages_rejected_without_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = app(config_for(&server), secrets_with_key());
    let response = send(app, post_json("/api/chat", r#"{"messages":"hello"}"#)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "messages must be an array"})
    );
}

#[tokio::test]
async fn test_invalid_json_rejected() {
    let server = MockServer::start().await;
    let app = app(config_for(&server), secrets_with_key());
    let response = send(app, post_json("/api/chat", "{nope")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid JSON body");
}

#[tokio::test]
async fn test_missing_api_key_is_server_error() {
    let server = MockServer::start().await;
    Mock::given(matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = app(config_for(&server), SecretSource::fixed([("OPENAI_API_KEY", "  ")]));
    let response = send(
        app,
        post_json("/api/chat", r#"{"messages":[{"sender":"user","content":"Hi"}]}"#),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await["error"],
        "Completion API key not configured"
    );
}

// =============================================================================
// Upstream failures
// =============================================================================

#[tokio::test]
async fn test_upstream_error_status_is_sanitized() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"message": "Incorrect API key provided: sk-test"}
        })))
        .mount(&server)
        .await;

    let app = app(config_for(&server), secrets_with_key());
    let response = send(
        app,
        post_json("/api/chat", r#"{"messages":[{"sender":"user","content":"Hi"}]}"#),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"], "The completion service returned an error");
    assert_eq!(json["details"], "upstream status 401");
    assert!(!json.to_string().contains("sk-test"));
}

#[tokio::test]
async fn test_unreachable_upstream() {
    let server = MockServer::start().await;
    let mut config = config_for(&server);
    drop(server);
    config.completion.connect_timeout_secs = 1;

    let app = app(config, secrets_with_key());
    let response = send(
        app,
        post_json("/api/chat", r#"{"messages":[{"sender":"user","content":"Hi"}]}"#),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await["error"],
        "Failed to reach the completion service"
    );
}

#[tokio::test]
async fn test_in_band_error_terminates_body() {
    let server = MockServer::start().await;
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n\
                data: {\"error\":{\"message\":\"overloaded\"}}\n\n";
    mount_completion(&server, body.to_string()).await;

    let app = app(config_for(&server), secrets_with_key());
    let response = send(
        app,
        post_json("/api/chat", r#"{"messages":[{"sender":"user","content":"Hi"}]}"#),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let result = axum::body::to_bytes(response.into_body(), usize::MAX).await;
    assert!(result.is_err());
}

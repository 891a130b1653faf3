//! Server Startup Tests
//!
//! Exercises the assembled router: health check, the Twilio voice webhook and
//! the status callback, with the AI side served by the mock Realtime server.

mod mock_providers;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use mock_providers::MockRealtimeServer;
use waav_call_bridge::config::{BridgeSettings, RealtimeSettings};
use waav_call_bridge::{ServerConfig, routes, state::AppState};

fn create_config(api_key: Option<&str>, endpoint: Option<String>) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 5050,
        public_hostname: Some("bridge.example.com".to_string()),
        tls: None,
        openai_api_key: api_key.map(str::to_string),
        realtime: RealtimeSettings {
            endpoint,
            ..RealtimeSettings::default()
        },
        bridge: BridgeSettings::default(),
    }
}

fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = routes::create_router(AppState::new(create_config(None, None)));

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body, serde_json::json!({"status": "OK"}));
}

#[tokio::test]
async fn test_incoming_call_returns_stream_twiml() {
    let server = MockRealtimeServer::start().await;
    let state = AppState::new(create_config(Some("sk-test"), Some(server.endpoint())));
    let app = routes::create_router(state.clone());

    let response = app
        .oneshot(form_request(
            "/incoming-call",
            "CallSid=CA123&From=%2B15550001111&To=%2B15550002222",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/xml"
    );
    let body = body_string(response).await;
    assert!(body.contains(
        r#"<Response><Connect><Stream url="wss://bridge.example.com/media-stream/CA123" /></Connect></Response>"#
    ));

    // The AI connection was opened before answering
    assert_eq!(server.handshakes().len(), 1);
    assert!(state.bridge.is_active());

    state
        .bridge
        .end_session(waav_call_bridge::EndReason::Completed)
        .await;
}

#[tokio::test]
async fn test_incoming_call_without_api_key_fails() {
    let app = routes::create_router(AppState::new(create_config(None, None)));

    let response = app
        .oneshot(form_request("/incoming-call", "CallSid=CA123"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_incoming_call_fails_when_ai_rejects() {
    let server = MockRealtimeServer::start().await;
    server.reject_handshakes(401);
    let state = AppState::new(create_config(Some("sk-bad"), Some(server.endpoint())));
    let app = routes::create_router(state.clone());

    let response = app
        .oneshot(form_request("/incoming-call", "CallSid=CA123"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!state.bridge.is_active());
}

#[tokio::test]
async fn test_completed_status_ends_session() {
    let server = MockRealtimeServer::start().await;
    let state = AppState::new(create_config(Some("sk-test"), Some(server.endpoint())));
    let app = routes::create_router(state.clone());

    let response = app
        .clone()
        .oneshot(form_request("/incoming-call", "CallSid=CA123"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.bridge.is_active());

    // Non-terminal statuses leave the call up
    let response = app
        .clone()
        .oneshot(form_request(
            "/call-status-update",
            "CallSid=CA123&CallStatus=in-progress",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.bridge.is_active());

    let response = app
        .clone()
        .oneshot(form_request(
            "/call-status-update",
            "CallSid=CA123&CallStatus=completed",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!state.bridge.is_active());
    assert!(!state.bridge.slot().is_occupied());

    // Repeated terminal callbacks are harmless
    let response = app
        .oneshot(form_request(
            "/call-status-update",
            "CallSid=CA123&CallStatus=completed",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_error_status_is_acknowledged() {
    let app = routes::create_router(AppState::new(create_config(None, None)));

    let response = app
        .oneshot(form_request(
            "/call-status-update",
            "CallSid=CA123&CallStatus=failed&ErrorCode=31005&ErrorMessage=Connection+error",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_media_stream_requires_upgrade() {
    let app = routes::create_router(AppState::new(create_config(None, None)));

    let request = Request::builder()
        .uri("/media-stream/CA123")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(response.status().is_client_error());
}

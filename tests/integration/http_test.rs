//! Integration tests for the HTTP surface: health and handshake refusal.

mod helpers;

use http::StatusCode;

use billhub_core::types::id::UserId;

#[tokio::test]
async fn test_health_check() {
    let app = helpers::TestApp::new();

    let response = app.request("/api/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_detailed_health_reports_engine_state() {
    let app = helpers::TestApp::new();
    let _conn = app.realtime.connect(UserId::new());

    let response = app.request("/api/health/detailed", None).await;

    assert_eq!(response.status, StatusCode::OK);
    let data = &response.body["data"];
    assert_eq!(data["ws_connections"], 1);
    assert_eq!(data["online_users"], 1);
    assert_eq!(data["metrics"]["connections_total"], 1);
}

#[tokio::test]
async fn test_ws_upgrade_without_token_is_401() {
    let app = helpers::TestApp::new();

    let response = app.request("/ws", None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "AUTHENTICATION");
}

#[tokio::test]
async fn test_ws_upgrade_with_bad_token_is_401() {
    let app = helpers::TestApp::new();

    let response = app.request("/ws?token=not-a-jwt", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app.request("/ws", Some("not-a-jwt")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ws_upgrade_with_foreign_secret_is_401() {
    let app = helpers::TestApp::new();
    let mut other_config = app.config.clone();
    other_config.auth.jwt_secret = "someone-else".to_string();
    let other = helpers::TestApp::with_config(other_config);

    let token = other.token_for(UserId::new());
    let response = app.request(&format!("/ws?token={token}"), None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_valid_token_without_upgrade_is_not_401() {
    let app = helpers::TestApp::new();
    let token = app.token_for(UserId::new());

    let response = app.request("/ws", Some(&token)).await;

    assert_ne!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.status.is_client_error());
    assert_eq!(app.realtime.registry.connection_count(), 0);
}

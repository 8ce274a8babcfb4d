// Integration tests for the internal token refresh endpoint

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use classlink::api::{create_refresh_router, RefreshAppState};
use classlink::google::GoogleOAuthConfig;
use classlink::profiles::ProfileStore;
use classlink::tokens::TokenBroker;
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_app(
    token_url: String,
    service_token: Option<String>,
) -> (Router, Arc<ProfileStore>) {
    let key = BASE64.encode([0u8; 32]);
    let store = Arc::new(ProfileStore::new(":memory:", &key).unwrap());

    let broker = Arc::new(TokenBroker::new(
        Arc::clone(&store),
        GoogleOAuthConfig {
            auth_url: "https://accounts.example.com/auth".to_string(),
            token_url,
            client_id: "classlink-client".to_string(),
            client_secret: "classlink-secret".to_string(),
            redirect_uri: "http://localhost:8787/google-oauth".to_string(),
            scopes: vec!["classroom.courses".to_string()],
        },
    ));

    let app = create_refresh_router(RefreshAppState {
        broker,
        service_token,
    });

    (app, store)
}

fn refresh_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/google-refresh-token")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn missing_user_id_is_a_bad_request() {
    let (app, _store) = create_test_app("http://unused.invalid/token".to_string(), None);

    let response = app.oneshot(refresh_request("{}")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("user_id"));
}

#[tokio::test]
async fn unknown_user_is_a_bad_request() {
    let (app, _store) = create_test_app("http://unused.invalid/token".to_string(), None);

    let response = app
        .oneshot(refresh_request(r#"{"user_id":"nobody"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unlinked_user_is_a_bad_request() {
    let (app, store) = create_test_app("http://unused.invalid/token".to_string(), None);
    store.create_profile("user-42").unwrap();

    let response = app
        .oneshot(refresh_request(r#"{"user_id":"user-42"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("Refresh token"));
}

#[tokio::test]
async fn refresh_rotates_and_persists_the_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"ya29.rotated","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;

    let (app, store) = create_test_app(format!("{}/token", server.url()), None);
    store
        .store_link("user-42", "ya29.stale", "1//refresh", Utc::now() - Duration::minutes(1))
        .unwrap();

    let response = app
        .oneshot(refresh_request(r#"{"user_id":"user-42"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["access_token"], "ya29.rotated");

    // The response expiry is epoch milliseconds matching the stored record
    let stored = store.get("user-42").unwrap().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("ya29.rotated"));
    assert_eq!(
        json["expires_at"].as_i64().unwrap(),
        stored.expires_at.unwrap().timestamp_millis()
    );
    // Refresh token was not rotated
    assert_eq!(stored.refresh_token.as_deref(), Some("1//refresh"));

    mock.assert_async().await;
}

#[tokio::test]
async fn provider_rejection_is_a_server_error() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant"}"#)
        .create_async()
        .await;

    let (app, store) = create_test_app(format!("{}/token", server.url()), None);
    store
        .store_link("user-42", "ya29.stale", "1//revoked", Utc::now() - Duration::minutes(1))
        .unwrap();

    let response = app
        .oneshot(refresh_request(r#"{"user_id":"user-42"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("invalid_grant"));

    // Stored token unchanged after the failed refresh
    let stored = store.get("user-42").unwrap().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("ya29.stale"));

    mock.assert_async().await;
}

#[tokio::test]
async fn bearer_auth_is_enforced_when_configured() {
    let (app, store) = create_test_app(
        "http://unused.invalid/token".to_string(),
        Some("internal-token".to_string()),
    );
    store.create_profile("user-42").unwrap();

    // No Authorization header
    let response = app
        .clone()
        .oneshot(refresh_request(r#"{"user_id":"user-42"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong token
    let mut request = refresh_request(r#"{"user_id":"user-42"}"#);
    request
        .headers_mut()
        .insert("authorization", "Bearer wrong-token".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Correct token gets past auth (and fails later for being unlinked)
    let mut request = refresh_request(r#"{"user_id":"user-42"}"#);
    request
        .headers_mut()
        .insert("authorization", "Bearer internal-token".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cors_preflight_allows_any_origin() {
    let (app, _store) = create_test_app("http://unused.invalid/token".to_string(), None);

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/google-refresh-token")
        .header("origin", "http://localhost:8080")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type, authorization")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
    let allow_methods = response
        .headers()
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(allow_methods.contains("POST"));
}

// Integration tests for the Google linking endpoint

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use classlink::api::{create_oauth_router, OAuthAppState};
use classlink::google::GoogleOAuthConfig;
use classlink::profiles::ProfileStore;
use std::sync::Arc;
use tower::ServiceExt;

fn test_oauth_config(token_url: String) -> GoogleOAuthConfig {
    GoogleOAuthConfig {
        auth_url: "https://accounts.example.com/auth".to_string(),
        token_url,
        client_id: "classlink-client".to_string(),
        client_secret: "classlink-secret".to_string(),
        redirect_uri: "http://localhost:8787/google-oauth".to_string(),
        scopes: vec!["classroom.courses".to_string(), "openid".to_string()],
    }
}

fn create_test_app(token_url: String) -> (Router, Arc<ProfileStore>) {
    let key = BASE64.encode([0u8; 32]);
    let store = Arc::new(ProfileStore::new(":memory:", &key).unwrap());

    let app = create_oauth_router(OAuthAppState {
        profile_store: Arc::clone(&store),
        oauth: test_oauth_config(token_url),
        http_client: reqwest::Client::new(),
        post_link_redirect: "http://localhost:8080/dashboard".to_string(),
    });

    (app, store)
}

async fn error_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn phase_a_redirects_to_consent_screen() {
    let (app, _store) = create_test_app("http://unused.invalid/token".to_string());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/google-oauth?user_id=user-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);

    let location = response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.starts_with("https://accounts.example.com/auth?"));
    assert!(location.contains("client_id=classlink-client"));
    assert!(location.contains("response_type=code"));
    assert!(location.contains("access_type=offline"));
    assert!(location.contains("prompt=consent"));
    // The user id rides in `state` across the provider round-trip
    assert!(location.contains("state=user-42"));
}

#[tokio::test]
async fn phase_a_requires_user_id() {
    let (app, _store) = create_test_app("http://unused.invalid/token".to_string());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/google-oauth")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = error_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("user_id"));
}

#[tokio::test]
async fn phase_b_exchanges_code_and_links_profile() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"access_token":"ya29.new","refresh_token":"1//refresh","expires_in":3599}"#,
        )
        .create_async()
        .await;

    let (app, store) = create_test_app(format!("{}/token", server.url()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/google-oauth?code=auth-code&state=user-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "http://localhost:8080/dashboard"
    );

    // The record keyed by `state` now carries the full triple
    let tokens = store.get("user-42").unwrap().unwrap();
    assert!(tokens.linked);
    assert_eq!(tokens.access_token.as_deref(), Some("ya29.new"));
    assert_eq!(tokens.refresh_token.as_deref(), Some("1//refresh"));
    assert!(tokens.expires_at.unwrap() > chrono::Utc::now());

    // No other user was touched
    assert!(store.get("someone-else").unwrap().is_none());

    mock.assert_async().await;
}

#[tokio::test]
async fn phase_b_surfaces_provider_error_without_store_write() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant","error_description":"Malformed auth code."}"#)
        .create_async()
        .await;

    let (app, store) = create_test_app(format!("{}/token", server.url()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/google-oauth?code=bad&state=user-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The provider's error body comes back to the caller
    let json = error_body(response).await;
    let message = json["error"].as_str().unwrap();
    assert!(message.contains("invalid_grant"));
    assert!(message.contains("Malformed auth code."));

    // No store write happened
    assert!(store.get("user-42").unwrap().is_none());

    mock.assert_async().await;
}

#[tokio::test]
async fn phase_b_requires_state() {
    let (app, _store) = create_test_app("http://unused.invalid/token".to_string());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/google-oauth?code=auth-code")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = error_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("state"));
}

#[tokio::test]
async fn consent_denial_is_a_bad_request() {
    let (app, store) = create_test_app("http://unused.invalid/token".to_string());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/google-oauth?error=access_denied&state=user-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = error_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("access_denied"));
    assert!(store.get("user-42").unwrap().is_none());
}

#[tokio::test]
async fn relinking_replaces_the_triple() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"access_token":"ya29.second","refresh_token":"1//second","expires_in":3599}"#,
        )
        .create_async()
        .await;

    let (app, store) = create_test_app(format!("{}/token", server.url()));
    store
        .store_link(
            "user-42",
            "ya29.first",
            "1//first",
            chrono::Utc::now() + chrono::Duration::hours(1),
        )
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/google-oauth?code=auth-code&state=user-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);

    let tokens = store.get("user-42").unwrap().unwrap();
    assert_eq!(tokens.access_token.as_deref(), Some("ya29.second"));
    assert_eq!(tokens.refresh_token.as_deref(), Some("1//second"));
    assert!(tokens.linked);
}

//! Internal token refresh endpoint.
//!
//! `POST /google-refresh-token` with body `{"user_id": ...}`. Called by the
//! front end when it finds the stored access token expired; responds with
//! the rotated token and its absolute expiry in epoch milliseconds.
//!
//! Browser front ends call this cross-origin, so the router carries a
//! permissive CORS layer (the preflight OPTIONS is answered by the layer).

use crate::auth::extract_bearer_token;
use crate::tokens::{TokenBroker, TokenFailure};
use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for the refresh endpoint
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    ServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Shared application state for the refresh endpoint
#[derive(Clone)]
pub struct RefreshAppState {
    pub broker: Arc<TokenBroker>,
    /// Expected bearer token for internal calls. None disables auth.
    pub service_token: Option<String>,
}

/// Request body for POST /google-refresh-token
#[derive(Deserialize)]
pub struct RefreshRequest {
    user_id: Option<String>,
}

/// Success response: the rotated token and its expiry in epoch milliseconds
#[derive(Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_at: i64,
}

/// Create the refresh endpoint router
pub fn create_refresh_router(state: RefreshAppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/google-refresh-token", post(google_refresh_token))
        .layer(cors)
        .with_state(Arc::new(state))
}

/// POST /google-refresh-token
async fn google_refresh_token(
    State(state): State<Arc<RefreshAppState>>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    if let Some(expected) = &state.service_token {
        let presented = extract_bearer_token(&headers)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;
        if &presented != expected {
            return Err(AppError::Unauthorized("Invalid service token".to_string()));
        }
    }

    let user_id = match request.user_id {
        Some(id) if !id.is_empty() => id,
        _ => return Err(AppError::BadRequest("Missing user_id".to_string())),
    };

    match state.broker.refresh_and_store(&user_id).await {
        Ok(rotated) => {
            info!(user_id = %user_id, "Access token refreshed");
            Ok(Json(RefreshResponse {
                access_token: rotated.access_token,
                expires_at: rotated.expires_at.timestamp_millis(),
            }))
        }
        Err(TokenFailure::RecordNotFound) | Err(TokenFailure::NotLinked) => {
            warn!(user_id = %user_id, "Refresh requested for unlinked user");
            Err(AppError::BadRequest("Refresh token not found".to_string()))
        }
        Err(e) => {
            error!(user_id = %user_id, error = %e, "Token refresh failed");
            Err(AppError::ServerError(format!(
                "Failed to refresh token: {}",
                e
            )))
        }
    }
}

//! Google account linking endpoint.
//!
//! Implements the two-phase authorization-code flow on a single route:
//! 1. `GET /google-oauth?user_id=<id>` redirects to Google's consent
//!    screen, carrying the user id in the OAuth `state` parameter
//! 2. Google redirects back here with `?code=...&state=<id>`
//! 3. The code is exchanged for tokens, the triple is persisted, and the
//!    profile is marked linked
//! 4. The browser is redirected to the post-link landing page
//!
//! The handler is stateless between invocations: the only state carried
//! across the provider round-trip is the user id inside `state`.

use crate::google::{exchange_code, GoogleOAuthConfig};
use crate::profiles::ProfileStore;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for the linking endpoint
enum AppError {
    BadRequest(String),
    ServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Shared application state for the linking endpoint
#[derive(Clone)]
pub struct OAuthAppState {
    pub profile_store: Arc<ProfileStore>,
    pub oauth: GoogleOAuthConfig,
    pub http_client: reqwest::Client,
    /// Where the browser lands after a successful link.
    pub post_link_redirect: String,
}

/// Query parameters seen by the endpoint across both phases
#[derive(Deserialize)]
pub struct LinkQuery {
    user_id: Option<String>,
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Create the linking endpoint router
pub fn create_oauth_router(state: OAuthAppState) -> Router {
    Router::new()
        .route("/google-oauth", get(google_oauth))
        .with_state(Arc::new(state))
}

/// GET /google-oauth
///
/// Phase selection: a `code` parameter means Google is calling back,
/// anything else starts a new linking attempt.
async fn google_oauth(
    State(state): State<Arc<OAuthAppState>>,
    Query(query): Query<LinkQuery>,
) -> Result<Response, AppError> {
    if let Some(error) = query.error {
        warn!(error = %error, "Google authorization was denied");
        return Err(AppError::BadRequest(format!(
            "Authorization failed: {}",
            error
        )));
    }

    match query.code {
        None => start_link(&state, query.user_id),
        Some(code) => complete_link(&state, &code, query.state).await,
    }
}

/// Phase A: redirect the browser to Google's consent screen.
fn start_link(state: &OAuthAppState, user_id: Option<String>) -> Result<Response, AppError> {
    let user_id = user_id
        .ok_or_else(|| AppError::BadRequest("Missing 'user_id' parameter".to_string()))?;

    // The user id rides in `state` across the provider redirect
    let auth_url = state.oauth.build_authorize_url(&user_id);

    info!(user_id = %user_id, "Redirecting to Google consent screen");

    Ok(found(&auth_url))
}

/// Phase B: exchange the code, persist the triple, mark the profile linked.
async fn complete_link(
    state: &OAuthAppState,
    code: &str,
    link_state: Option<String>,
) -> Result<Response, AppError> {
    let user_id = link_state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    debug!(user_id = %user_id, "Exchanging authorization code");

    let grant = exchange_code(&state.http_client, &state.oauth, code)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "Code exchange failed");
            AppError::ServerError(format!("Failed to exchange authorization code: {}", e))
        })?;

    state
        .profile_store
        .store_link(&user_id, &grant.access_token, &grant.refresh_token, grant.expires_at)
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "Failed to store link tokens");
            AppError::ServerError(format!("Failed to store tokens: {}", e))
        })?;

    info!(user_id = %user_id, "Google account linked");

    Ok(found(&state.post_link_redirect))
}

/// 302 redirect. `axum::response::Redirect` only offers 303/307/308; OAuth
/// flows conventionally use 302 for the consent hop.
fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

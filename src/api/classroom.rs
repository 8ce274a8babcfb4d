//! Classroom read endpoints.
//!
//! Server-side mirrors of the course screens. Every call goes through the
//! token broker, so the front end never handles Google credentials and a
//! stale access token is rotated transparently.

use crate::auth::extract_bearer_token;
use crate::google::{ClassroomClient, Course, CourseWorkMaterial};
use crate::tokens::{RetryPolicy, TokenBroker, TokenFailure};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for the Classroom endpoints
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Shared application state for the Classroom endpoints
#[derive(Clone)]
pub struct ClassroomAppState {
    pub broker: Arc<TokenBroker>,
    pub classroom: Arc<ClassroomClient>,
    /// Expected bearer token for internal calls. None disables auth.
    pub service_token: Option<String>,
}

/// GET /classroom/:user_id/courses response
#[derive(Serialize)]
pub struct CoursesResponse {
    pub courses: Vec<Course>,
}

/// GET /classroom/:user_id/courses/:course_id/materials response
#[derive(Serialize)]
pub struct MaterialsResponse {
    pub materials: Vec<CourseWorkMaterial>,
}

/// Create the Classroom API router
pub fn create_classroom_router(state: ClassroomAppState) -> Router {
    Router::new()
        .route("/classroom/:user_id/courses", get(list_courses))
        .route(
            "/classroom/:user_id/courses/:course_id/materials",
            get(list_materials),
        )
        .with_state(Arc::new(state))
}

/// GET /classroom/:user_id/courses
async fn list_courses(
    State(state): State<Arc<ClassroomAppState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CoursesResponse>, AppError> {
    require_service_token(&state, &headers)?;

    let courses = state
        .broker
        .with_access_token(&user_id, RetryPolicy::RefreshOnAuthError, |token| {
            let classroom = Arc::clone(&state.classroom);
            async move { classroom.list_courses(&token).await }
        })
        .await
        .map_err(|e| map_token_failure(&user_id, e))?;

    Ok(Json(CoursesResponse { courses }))
}

/// GET /classroom/:user_id/courses/:course_id/materials
async fn list_materials(
    State(state): State<Arc<ClassroomAppState>>,
    Path((user_id, course_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<MaterialsResponse>, AppError> {
    require_service_token(&state, &headers)?;

    let materials = state
        .broker
        .with_access_token(&user_id, RetryPolicy::RefreshOnAuthError, |token| {
            let classroom = Arc::clone(&state.classroom);
            let course_id = course_id.clone();
            async move { classroom.list_course_materials(&token, &course_id).await }
        })
        .await
        .map_err(|e| map_token_failure(&user_id, e))?;

    Ok(Json(MaterialsResponse { materials }))
}

/// Check the internal bearer token when auth is enabled.
fn require_service_token(state: &ClassroomAppState, headers: &HeaderMap) -> Result<(), AppError> {
    if let Some(expected) = &state.service_token {
        let presented = extract_bearer_token(headers)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;
        if &presented != expected {
            return Err(AppError::Unauthorized("Invalid service token".to_string()));
        }
    }
    Ok(())
}

/// Map broker failures to HTTP statuses.
///
/// Unlinked or unknown users are a caller problem (400); provider-side
/// failures surface as 502 so the front end can distinguish "relink" from
/// "try again later".
fn map_token_failure(user_id: &str, failure: TokenFailure) -> AppError {
    match failure {
        TokenFailure::RecordNotFound | TokenFailure::NotLinked => {
            warn!(user_id = %user_id, "Classroom call for unlinked user");
            AppError::BadRequest("Google account is not linked".to_string())
        }
        e => {
            error!(user_id = %user_id, error = %e, "Classroom call failed");
            AppError::BadGateway(format!("Classroom request failed: {}", e))
        }
    }
}

//! HTTP client for the Google Classroom REST API.
//!
//! Callers never hand it a stored token directly; the access token arrives
//! per call from the token broker so every request carries a fresh
//! credential.

use crate::tokens::OperationError;
use anyhow::{anyhow, Context};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

const BASE_URL: &str = "https://classroom.googleapis.com/v1";

/// Classroom course.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_link: Option<String>,
}

/// Course work material attached to a course.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseWorkMaterial {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

/// `GET /courses` response envelope.
#[derive(Debug, Deserialize)]
struct CourseListResponse {
    #[serde(default)]
    courses: Vec<Course>,
}

/// `GET /courses/{id}/courseWorkMaterials` response envelope.
#[derive(Debug, Deserialize)]
struct MaterialListResponse {
    #[serde(default, rename = "courseWorkMaterial")]
    course_work_material: Vec<CourseWorkMaterial>,
}

/// HTTP client for the Classroom REST API.
///
/// Authenticates each request with the bearer token supplied by the caller.
pub struct ClassroomClient {
    http_client: Client,
    base_url: String,
}

impl Default for ClassroomClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassroomClient {
    /// Create a client using the default Classroom API base URL.
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(base_url: String) -> Self {
        let http_client = Client::builder()
            .user_agent("classlink/1.0")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http_client,
            base_url,
        }
    }

    /// Fetch the courses the linked account can see.
    pub async fn list_courses(&self, access_token: &str) -> Result<Vec<Course>, OperationError> {
        let url = format!("{}/courses", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                OperationError::Other(anyhow!(e).context("Failed to send list_courses request"))
            })?;

        let response = check_response_status(response).await?;
        let parsed: CourseListResponse = response
            .json()
            .await
            .context("Failed to parse courses response")
            .map_err(OperationError::Other)?;

        Ok(parsed.courses)
    }

    /// Fetch the course work materials for one course.
    pub async fn list_course_materials(
        &self,
        access_token: &str,
        course_id: &str,
    ) -> Result<Vec<CourseWorkMaterial>, OperationError> {
        let url = format!("{}/courses/{}/courseWorkMaterials", self.base_url, course_id);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                OperationError::Other(
                    anyhow!(e).context("Failed to send list_course_materials request"),
                )
            })?;

        let response = check_response_status(response).await?;
        let parsed: MaterialListResponse = response
            .json()
            .await
            .context("Failed to parse course materials response")
            .map_err(OperationError::Other)?;

        Ok(parsed.course_work_material)
    }
}

/// Check the response status and classify known error codes.
///
/// - 401/403 → authorization rejection (lets the call wrapper force a
///   refresh when its policy allows)
/// - Other non-2xx → generic API error
async fn check_response_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, OperationError> {
    match response.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            Err(OperationError::Unauthorized(format!(
                "Classroom API rejected token ({}): {}",
                status, body
            )))
        }
        s if !s.is_success() => Err(OperationError::Other(anyhow!(
            "Classroom API error: {}",
            s
        ))),
        _ => Ok(response),
    }
}

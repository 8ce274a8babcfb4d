//! Google API boundary.
//!
//! Two halves: the OAuth2 endpoints (authorization URL building plus the
//! two token grants) and a typed client for the Classroom REST API. Nothing
//! in here touches storage; callers own persistence.

mod classroom;
mod oauth;

pub use classroom::{ClassroomClient, Course, CourseWorkMaterial};
pub use oauth::{
    exchange_code, refresh_access_token, CodeGrant, GoogleOAuthConfig, RefreshedToken,
};

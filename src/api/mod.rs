// HTTP API

pub mod classroom;
pub mod oauth;
pub mod refresh;

pub use classroom::{create_classroom_router, ClassroomAppState};
pub use oauth::{create_oauth_router, OAuthAppState};
pub use refresh::{create_refresh_router, RefreshAppState};

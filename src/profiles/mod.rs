//! Per-user profile storage for Google OAuth tokens.
//!
//! Each user has exactly one profile row carrying the Google token triple
//! (access token, refresh token, absolute expiry) and a `linked` flag that is
//! set once the first authorization-code exchange succeeds. Tokens are
//! encrypted at rest with AES-256-GCM; the master key comes from the
//! environment and lives in memory only.
//!
//! The store is the only component that touches these columns. The linking
//! endpoint writes the full triple, the token broker rotates the access
//! token, and nothing here ever deletes a row (unlinking is handled
//! elsewhere, if at all).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod encryption;
mod store;

pub use store::ProfileStore;

/// Google OAuth state for one user profile.
///
/// Invariants maintained by [`ProfileStore`]:
/// - `access_token` present implies `expires_at` present
/// - `linked` implies `refresh_token` present
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GoogleTokens {
    /// Short-lived bearer credential for Google API requests.
    pub access_token: Option<String>,

    /// Long-lived credential exchanged for new access tokens.
    pub refresh_token: Option<String>,

    /// When the access token stops being usable (UTC).
    pub expires_at: Option<DateTime<Utc>>,

    /// True once a successful token exchange has occurred.
    pub linked: bool,
}

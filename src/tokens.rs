//! Token refresh coordination and the authenticated call wrapper.
//!
//! Every outbound Google call goes through [`TokenBroker::with_access_token`],
//! which hands the operation an access token that is valid for at least the
//! freshness margin, refreshing against the token endpoint first when the
//! cached one is stale.
//!
//! Concurrent refreshes for the same user are not serialized: two callers
//! racing on an expired token may both hit the token endpoint, and the last
//! store write wins. Each exchange is independently valid, and the next
//! freshness check self-heals any lost update.

use crate::google::{refresh_access_token, GoogleOAuthConfig, RefreshedToken};
use crate::profiles::{GoogleTokens, ProfileStore};
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Safety margin applied when deciding whether a cached access token is
/// still usable. Absorbs clock skew and in-flight request latency so a
/// token does not expire mid-call.
const FRESHNESS_MARGIN_SECS: i64 = 300;

/// Failure surfaced by token acquisition or a wrapped call.
#[derive(Debug)]
pub enum TokenFailure {
    /// No profile row exists for the user, or the store read failed.
    RecordNotFound,
    /// The user has no refresh token on file; linking is required first.
    NotLinked,
    /// The provider rejected the refresh exchange. Carries the provider's
    /// error detail. There is no automatic recovery; the user must re-link.
    RefreshFailed(String),
    /// Persisting the rotated token failed.
    StoreWriteFailed(anyhow::Error),
    /// The wrapped operation failed after a valid token was obtained.
    /// Passed through unchanged.
    OperationFailed(OperationError),
}

impl std::fmt::Display for TokenFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenFailure::RecordNotFound => write!(f, "No profile record found"),
            TokenFailure::NotLinked => write!(f, "No Google refresh token on file"),
            TokenFailure::RefreshFailed(detail) => {
                write!(f, "Token refresh rejected: {}", detail)
            }
            TokenFailure::StoreWriteFailed(e) => {
                write!(f, "Failed to persist refreshed token: {}", e)
            }
            TokenFailure::OperationFailed(e) => write!(f, "Wrapped call failed: {}", e),
        }
    }
}

impl std::error::Error for TokenFailure {}

/// Error surfaced by a wrapped provider operation.
#[derive(Debug)]
pub enum OperationError {
    /// The provider rejected the bearer token (401/403).
    Unauthorized(String),
    /// Any other transport or API failure.
    Other(anyhow::Error),
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationError::Unauthorized(detail) => write!(f, "Unauthorized: {}", detail),
            OperationError::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for OperationError {}

/// Retry behavior for [`TokenBroker::with_access_token`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Surface every operation failure unchanged.
    Never,
    /// On an authorization rejection, force one refresh (bypassing the
    /// freshness check) and retry the operation exactly once.
    RefreshOnAuthError,
}

/// A refreshed access token together with its absolute expiry.
#[derive(Debug)]
pub struct StoredToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Coordinates access-token freshness for user profiles.
///
/// Dependencies are injected at construction so tests can point the broker
/// at an in-memory store and a mock token endpoint.
pub struct TokenBroker {
    store: Arc<ProfileStore>,
    oauth: GoogleOAuthConfig,
    http_client: reqwest::Client,
}

impl TokenBroker {
    pub fn new(store: Arc<ProfileStore>, oauth: GoogleOAuthConfig) -> Self {
        Self {
            store,
            oauth,
            http_client: reqwest::Client::new(),
        }
    }

    /// Returns an access token valid for at least the freshness margin.
    ///
    /// Fresh cached tokens are returned without any network call. Stale or
    /// absent ones are rotated through the token endpoint and persisted.
    /// A failed persist does not discard the fresh token: it is still
    /// returned, and the write failure is logged.
    pub async fn ensure_valid_token(&self, user_id: &str) -> Result<String, TokenFailure> {
        self.acquire(user_id, false).await
    }

    /// Unconditionally refreshes the access token and persists it.
    ///
    /// Backs the internal refresh endpoint, whose callers already know the
    /// cached token is stale: there is no freshness short-circuit, and a
    /// failed persist is a hard error.
    pub async fn refresh_and_store(&self, user_id: &str) -> Result<StoredToken, TokenFailure> {
        let tokens = self.load(user_id)?;
        let refresh_token = tokens.refresh_token.ok_or(TokenFailure::NotLinked)?;

        let refreshed = self.refresh(user_id, &refresh_token).await?;
        self.store
            .store_access_token(user_id, &refreshed.access_token, refreshed.expires_at)
            .map_err(TokenFailure::StoreWriteFailed)?;

        Ok(StoredToken {
            access_token: refreshed.access_token,
            expires_at: refreshed.expires_at,
        })
    }

    /// Acquires a valid token and invokes `operation` with it.
    ///
    /// Token acquisition failures propagate unchanged and the operation is
    /// never invoked. Operation failures surface as
    /// [`TokenFailure::OperationFailed`], except under
    /// [`RetryPolicy::RefreshOnAuthError`] where an authorization rejection
    /// triggers one forced refresh and a single retry.
    pub async fn with_access_token<T, F, Fut>(
        &self,
        user_id: &str,
        policy: RetryPolicy,
        operation: F,
    ) -> Result<T, TokenFailure>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let access_token = self.acquire(user_id, false).await?;

        match operation(access_token).await {
            Ok(value) => Ok(value),
            Err(OperationError::Unauthorized(detail))
                if policy == RetryPolicy::RefreshOnAuthError =>
            {
                info!(
                    user_id = %user_id,
                    detail = %detail,
                    "Provider rejected token, forcing refresh and retrying once"
                );
                let access_token = self.acquire(user_id, true).await?;
                operation(access_token)
                    .await
                    .map_err(TokenFailure::OperationFailed)
            }
            Err(e) => Err(TokenFailure::OperationFailed(e)),
        }
    }

    async fn acquire(&self, user_id: &str, force_refresh: bool) -> Result<String, TokenFailure> {
        let tokens = self.load(user_id)?;

        if !force_refresh {
            if let (Some(access_token), Some(expires_at)) =
                (&tokens.access_token, tokens.expires_at)
            {
                let deadline = Utc::now() + Duration::seconds(FRESHNESS_MARGIN_SECS);
                if expires_at > deadline {
                    debug!(user_id = %user_id, "Cached access token still fresh");
                    return Ok(access_token.clone());
                }
            }
        }

        let refresh_token = tokens.refresh_token.ok_or(TokenFailure::NotLinked)?;
        let refreshed = self.refresh(user_id, &refresh_token).await?;

        // The fresh token is usable even when the cache write fails; the
        // write failure surfaces as a logged side effect only.
        if let Err(e) =
            self.store
                .store_access_token(user_id, &refreshed.access_token, refreshed.expires_at)
        {
            warn!(
                user_id = %user_id,
                error = %e,
                "Failed to persist refreshed access token"
            );
        }

        Ok(refreshed.access_token)
    }

    fn load(&self, user_id: &str) -> Result<GoogleTokens, TokenFailure> {
        match self.store.get(user_id) {
            Ok(Some(tokens)) => Ok(tokens),
            Ok(None) => Err(TokenFailure::RecordNotFound),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Profile store read failed");
                Err(TokenFailure::RecordNotFound)
            }
        }
    }

    async fn refresh(
        &self,
        user_id: &str,
        refresh_token: &str,
    ) -> Result<RefreshedToken, TokenFailure> {
        info!(user_id = %user_id, "Refreshing Google access token");
        refresh_access_token(&self.http_client, &self.oauth, refresh_token)
            .await
            .map_err(|e| TokenFailure::RefreshFailed(e.to_string()))
    }
}

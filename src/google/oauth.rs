//! Google OAuth2 token endpoint client.
//!
//! Covers both grants the service uses: `authorization_code` during linking
//! and `refresh_token` when rotating an expired access token.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested during linking: Classroom course and material access
/// plus the identity scopes.
const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/classroom.courses",
    "https://www.googleapis.com/auth/classroom.courses.readonly",
    "https://www.googleapis.com/auth/classroom.coursework.students.readonly",
    "https://www.googleapis.com/auth/classroom.courseworkmaterials",
    "https://www.googleapis.com/auth/classroom.topics",
    "https://www.googleapis.com/auth/classroom.topics.readonly",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "openid",
];

/// Google OAuth 2.0 client configuration
#[derive(Clone, Debug)]
pub struct GoogleOAuthConfig {
    /// Authorization endpoint URL
    pub auth_url: String,

    /// Token exchange endpoint URL
    pub token_url: String,

    /// Client ID (from environment variable)
    pub client_id: String,

    /// Client secret (from environment variable)
    pub client_secret: String,

    /// Redirect URI registered with Google, pointing back at the linking
    /// endpoint itself
    pub redirect_uri: String,

    /// Requested OAuth scopes
    pub scopes: Vec<String>,
}

impl GoogleOAuthConfig {
    /// Load client credentials from the environment; endpoints and scopes
    /// use the Google defaults.
    pub fn from_env(public_base_url: &str) -> Result<Self> {
        let client_id =
            std::env::var("GOOGLE_CLIENT_ID").context("GOOGLE_CLIENT_ID is required")?;
        let client_secret =
            std::env::var("GOOGLE_CLIENT_SECRET").context("GOOGLE_CLIENT_SECRET is required")?;

        Ok(Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            client_id,
            client_secret,
            redirect_uri: format!(
                "{}/google-oauth",
                public_base_url.trim_end_matches('/')
            ),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Build the authorization URL for the first phase of the linking flow.
    ///
    /// `access_type=offline` and `prompt=consent` force Google to issue a
    /// refresh token even when the user has authorized before. The caller's
    /// user id rides in `state` and comes back on the callback.
    pub fn build_authorize_url(&self, state: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }
}

/// Tokens returned by the authorization-code exchange.
#[derive(Debug)]
pub struct CodeGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token returned by a refresh-grant exchange. Google does not rotate the
/// refresh token on this path.
#[derive(Debug)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Raw token endpoint response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Exchange an authorization code for the full token triple.
///
/// # Returns
/// * `Ok(CodeGrant)` - Access token, refresh token, and absolute expiry
/// * `Err` - Non-2xx from the token endpoint (error body preserved), or a
///   response missing `refresh_token`/`expires_in`
pub async fn exchange_code(
    http_client: &reqwest::Client,
    config: &GoogleOAuthConfig,
    code: &str,
) -> Result<CodeGrant> {
    let mut form = HashMap::new();
    form.insert("grant_type", "authorization_code");
    form.insert("code", code);
    form.insert("redirect_uri", config.redirect_uri.as_str());
    form.insert("client_id", config.client_id.as_str());
    form.insert("client_secret", config.client_secret.as_str());

    tracing::debug!("Exchanging authorization code at {}", config.token_url);

    let response = http_client
        .post(&config.token_url)
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await
        .context("Failed to send code exchange request")?;

    let token_response = parse_token_response(response).await?;

    // Without a refresh token the link cannot be maintained; treat the
    // exchange as failed rather than storing a half-linked profile.
    let refresh_token = token_response.refresh_token.ok_or_else(|| {
        anyhow!("Token response is missing refresh_token (was access_type=offline dropped?)")
    })?;
    let expires_in = token_response
        .expires_in
        .ok_or_else(|| anyhow!("Token response is missing expires_in"))?;

    tracing::debug!(expires_in, "Code exchange successful");

    Ok(CodeGrant {
        access_token: token_response.access_token,
        refresh_token,
        expires_at: Utc::now() + Duration::seconds(expires_in),
    })
}

/// Exchange a stored refresh token for a new access token.
///
/// # Returns
/// * `Ok(RefreshedToken)` - New access token and absolute expiry
/// * `Err` - Non-2xx from the token endpoint (error body preserved), or a
///   response missing `expires_in`
pub async fn refresh_access_token(
    http_client: &reqwest::Client,
    config: &GoogleOAuthConfig,
    refresh_token: &str,
) -> Result<RefreshedToken> {
    let mut form = HashMap::new();
    form.insert("grant_type", "refresh_token");
    form.insert("refresh_token", refresh_token);
    form.insert("client_id", config.client_id.as_str());
    form.insert("client_secret", config.client_secret.as_str());

    tracing::debug!("Refreshing access token at {}", config.token_url);

    let response = http_client
        .post(&config.token_url)
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await
        .context("Failed to send token refresh request")?;

    let token_response = parse_token_response(response).await?;

    let expires_in = token_response
        .expires_in
        .ok_or_else(|| anyhow!("Token response is missing expires_in"))?;

    Ok(RefreshedToken {
        access_token: token_response.access_token,
        expires_at: Utc::now() + Duration::seconds(expires_in),
    })
}

/// Check status and parse the token endpoint response. The error body is
/// kept verbatim so callers can surface the provider's own message.
async fn parse_token_response(response: reqwest::Response) -> Result<TokenResponse> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        return Err(anyhow!("Token endpoint returned {}: {}", status, body));
    }

    response
        .json()
        .await
        .context("Failed to parse token response")
}

use anyhow::{Context, Result};

/// Service configuration, read from the environment at process start.
#[derive(Debug, Clone)]
pub struct ClasslinkConfig {
    /// Port the HTTP API binds to.
    pub bind_port: u16,

    /// Path to the SQLite profile database.
    pub database_path: String,

    /// Base64-encoded 32-byte master key for token encryption.
    pub encryption_key: String,

    /// Externally reachable base URL of this service. The Google redirect
    /// URI is derived from it.
    pub public_base_url: String,

    /// Where the browser is sent after a successful link.
    pub post_link_redirect: String,

    /// Bearer token required on internal endpoints. None disables auth
    /// (local development only).
    pub service_token: Option<String>,
}

impl ClasslinkConfig {
    /// Build from env vars, falling back to defaults where sensible.
    pub fn from_env() -> Result<Self> {
        let bind_port: u16 = std::env::var("CLASSLINK_PORT")
            .unwrap_or_else(|_| "8787".to_string())
            .parse()
            .context("CLASSLINK_PORT must be a valid port number")?;

        let database_path =
            std::env::var("CLASSLINK_DB").unwrap_or_else(|_| "profiles.db".to_string());

        let encryption_key = std::env::var("CLASSLINK_ENCRYPTION_KEY")
            .context("CLASSLINK_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

        let public_base_url = std::env::var("CLASSLINK_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", bind_port));

        let post_link_redirect = std::env::var("CLASSLINK_POST_LINK_URL")
            .unwrap_or_else(|_| "http://localhost:8080/dashboard".to_string());

        let service_token = std::env::var("CLASSLINK_SERVICE_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        Ok(Self {
            bind_port,
            database_path,
            encryption_key,
            public_base_url,
            post_link_redirect,
            service_token,
        })
    }
}

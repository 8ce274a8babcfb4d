use anyhow::{Context, Result};
use classlink::api::{
    create_classroom_router, create_oauth_router, create_refresh_router, ClassroomAppState,
    OAuthAppState, RefreshAppState,
};
use classlink::config::ClasslinkConfig;
use classlink::google::{ClassroomClient, GoogleOAuthConfig};
use classlink::profiles::ProfileStore;
use classlink::tokens::TokenBroker;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "classlink=info".into()),
        )
        .init();

    info!("Classlink starting...");

    let config = ClasslinkConfig::from_env()?;
    let oauth = GoogleOAuthConfig::from_env(&config.public_base_url)?;

    info!(
        port = config.bind_port,
        database = %config.database_path,
        redirect_uri = %oauth.redirect_uri,
        auth_enabled = config.service_token.is_some(),
        "Configuration loaded"
    );

    let profile_store = Arc::new(
        ProfileStore::new(&config.database_path, &config.encryption_key)
            .context("Failed to initialize profile store")?,
    );
    info!("Profile store initialized");

    let broker = Arc::new(TokenBroker::new(
        Arc::clone(&profile_store),
        oauth.clone(),
    ));

    let router = create_oauth_router(OAuthAppState {
        profile_store: Arc::clone(&profile_store),
        oauth,
        http_client: reqwest::Client::new(),
        post_link_redirect: config.post_link_redirect.clone(),
    })
    .merge(create_refresh_router(RefreshAppState {
        broker: Arc::clone(&broker),
        service_token: config.service_token.clone(),
    }))
    .merge(create_classroom_router(ClassroomAppState {
        broker,
        classroom: Arc::new(ClassroomClient::new()),
        service_token: config.service_token.clone(),
    }));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.bind_port))
        .await
        .context("Failed to bind API port")?;
    info!(port = config.bind_port, "Classlink API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Classlink stopped");

    Ok(())
}

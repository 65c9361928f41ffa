//! Tandem session server.
//!
//! Wires the configuration, credential store, password check and session
//! endpoints into an Axum application.

pub mod config;
pub mod observability;
pub mod verifier;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{Router, extract::DefaultBodyLimit};
use tandem_auth::http::{HttpState, router};
use tandem_auth::{CredentialStore, MemoryCredentialStore, SessionService};
use tandem_auth_redis::RedisCredentialStore;
use tower_http::trace::TraceLayer;

pub use config::AppConfig;
pub use verifier::ConfiguredUsers;

/// Picks the credential store the configuration asks for.
///
/// With Redis disabled an in-process store is used and a sweeper task
/// removes expired entries every `server.purge_interval_secs`.
pub async fn create_credential_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn CredentialStore>> {
    if cfg.redis.enabled {
        let store = RedisCredentialStore::connect(&cfg.redis)
            .await
            .context("failed to connect to Redis credential store")?;
        return Ok(Arc::new(store));
    }

    tracing::info!("Redis disabled, using in-process credential store");
    let store = MemoryCredentialStore::new();
    let sweeper = store.clone();
    let every = Duration::from_secs(cfg.server.purge_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            sweeper.purge_expired();
        }
    });
    Ok(Arc::new(store))
}

/// Builds the application router from a validated configuration.
pub async fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let store = create_credential_store(cfg).await?;
    let service = SessionService::from_config(cfg.auth.clone(), store)
        .context("invalid session configuration")?;

    let users = ConfiguredUsers::new(&cfg.users).context("invalid [[users]] entry")?;
    if users.is_empty() {
        tracing::warn!("no users configured, every login will be rejected");
    } else {
        tracing::info!(users = users.len(), "login accounts loaded");
    }

    let state = HttpState::new(service, Arc::new(users));
    Ok(router(state)
        .layer(DefaultBodyLimit::max(cfg.server.body_limit_bytes))
        .layer(TraceLayer::new_for_http()))
}

/// Binds the configured address and serves until Ctrl+C.
pub async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let app = build_app(&cfg).await?;
    let listener = tokio::net::TcpListener::bind(cfg.addr())
        .await
        .with_context(|| format!("failed to bind {}", cfg.addr()))?;
    tracing::info!("listening on {}", cfg.addr());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

// ABOUTME: Identity server binary wiring configuration, keys, stores, and HTTP routes
// ABOUTME: Runs rate limit, key maintenance, and retention tasks alongside the server until ctrl-c
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Identity Server Binary
//!
//! Loads configuration from the environment, builds every component once,
//! and serves the HTTP surface with graceful shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use identity_core::permissions::Role;
use identity_server::{
    config::{RateLimitBackend, ServerConfig},
    keys::{spawn_key_maintenance, KeyManager},
    logging::{LogFormat, LoggingConfig},
    rate_limiting::{spawn_sweeper, LocalRateLimitStore, RateLimitStore},
    resources::{ServerResources, Stores},
    routes,
    store::{spawn_retention_sweeper, MemoryStore},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "identity-server")]
#[command(about = "Identity provider security core: tokens, keys, clients, consent, sessions")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override log format (json, pretty, compact)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    let mut logging = LoggingConfig::from_env();
    if let Some(format) = args.log_format {
        logging = logging.with_format(format);
    }
    logging.init()?;

    info!("Starting identity server");
    info!("{}", config.summary());

    let keys = load_signing_keys(&config).await?;
    let rate_limit_store = rate_limit_store(&config).await?;

    let store = MemoryStore::new();
    if let Some(admin) = config.bootstrap_admin_user.as_deref() {
        store.upsert_user(admin, Role::SuperAdmin);
        warn!(user_id = %admin, "Bootstrap super admin registered in the user directory");
    }

    let config = Arc::new(config);
    let resources = Arc::new(ServerResources::new(
        config.clone(),
        Stores::memory(&store),
        keys,
        rate_limit_store,
    )?);

    let sweeper = spawn_sweeper(
        resources.rate_limiter.clone(),
        Duration::from_secs(config.rate_limits.sweep_interval_secs),
    );
    let maintenance = spawn_key_maintenance(
        resources.keys.clone(),
        resources.audit.clone(),
        Duration::from_secs(config.keys.maintenance_interval_secs),
    );
    let retention = spawn_retention_sweeper(
        resources.retention.clone(),
        Duration::from_secs(config.retention.sweep_interval_secs),
    );

    let app = routes::router(&resources).into_make_service_with_connect_info::<SocketAddr>();
    let addr = format!("{}:{}", config.host, config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "HTTP server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    for task in [sweeper, maintenance, retention] {
        let name = task.name();
        task.shutdown().await;
        info!(task = name, "Background task stopped");
    }

    if let Err(e) = served {
        error!(error = %e, "HTTP server failed");
        return Err(e.into());
    }
    info!("Identity server stopped");
    Ok(())
}

/// Load the configured PEM or generate a fresh key on the blocking pool
async fn load_signing_keys(config: &ServerConfig) -> Result<KeyManager> {
    let key_config = config.key_manager_config()?;
    if let Some(path) = config.keys.private_key_path.as_ref() {
        let pem = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read signing key from {}", path.display()))?;
        let manager = KeyManager::from_pem(key_config, &pem)?;
        info!(path = %path.display(), kid = %manager.active_kid(), "Signing key loaded from file");
        return Ok(manager);
    }

    info!(
        bits = key_config.key_size_bits,
        "Generating signing key; set SIGNING_KEY_PATH to keep keys across restarts"
    );
    let manager = tokio::task::spawn_blocking(move || KeyManager::new(key_config))
        .await
        .context("Key generation task failed")??;
    Ok(manager)
}

#[cfg_attr(not(feature = "redis-rate-limit"), allow(clippy::unused_async))]
async fn rate_limit_store(config: &ServerConfig) -> Result<Arc<dyn RateLimitStore>> {
    match config.rate_limits.backend {
        RateLimitBackend::Local => Ok(Arc::new(LocalRateLimitStore::new())),
        #[cfg(feature = "redis-rate-limit")]
        RateLimitBackend::Redis => redis_store(config).await,
        #[cfg(not(feature = "redis-rate-limit"))]
        RateLimitBackend::Redis => anyhow::bail!(
            "RATE_LIMIT_BACKEND=redis requires building with the redis-rate-limit feature"
        ),
    }
}

#[cfg(feature = "redis-rate-limit")]
async fn redis_store(config: &ServerConfig) -> Result<Arc<dyn RateLimitStore>> {
    use identity_server::rate_limiting::{redis::RedisRateLimitConfig, RedisRateLimitStore};

    let redis = config
        .redis
        .as_ref()
        .context("RATE_LIMIT_BACKEND=redis requires REDIS_URL")?;
    let store = RedisRateLimitStore::connect(&RedisRateLimitConfig {
        url: redis.url.clone(),
        connection_timeout: Duration::from_secs(redis.connection_timeout_secs),
        response_timeout: Duration::from_secs(redis.response_timeout_secs),
        initial_connection_retries: redis.initial_connection_retries,
        initial_retry_delay_ms: redis.initial_retry_delay_ms,
        max_retry_delay_ms: redis.max_retry_delay_ms,
    })
    .await?;
    Ok(Arc::new(store))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}

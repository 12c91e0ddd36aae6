// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! web-init API Server
//!
//! Backend for a starter dashboard: sign-in (credentials, Google, GitHub),
//! registration, password recovery requests and profile editing with
//! avatars stored in an S3-compatible bucket.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use web_init::{config::Config, db::MemoryUserStore, services::S3StorageProvider, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting web-init API");

    // Initialize object storage
    let storage = S3StorageProvider::new(&config.storage);
    if let Err(e) = storage.ensure_bucket().await {
        tracing::warn!(error = %e, "Could not verify storage bucket, continuing anyway");
    }

    // In-memory user store, shared by all handlers
    let users = Arc::new(MemoryUserStore::new());

    let demo_user = config.demo_user.clone();
    let state = Arc::new(AppState::new(config.clone(), users, Arc::new(storage)));

    if let Some(demo) = demo_user {
        state
            .auth_service
            .seed_user(&demo)
            .await
            .expect("Failed to seed demo account");
    }

    tracing::info!(
        google = config.google.is_some(),
        github = config.github.is_some(),
        "OAuth providers configured"
    );

    // Build router
    let app = web_init::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("web_init=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}

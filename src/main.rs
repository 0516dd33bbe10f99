// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trackboard API Server
//!
//! Timed activity tracking with per-activity statistics and leaderboards.

use std::sync::Arc;
use trackboard::{
    config::{Config, StoreBackend},
    db::{Db, FirestoreDb, MemoryDb},
    time_utils::SystemClock,
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        backend = ?config.store_backend,
        "Starting Trackboard API"
    );

    let db = match config.store_backend {
        StoreBackend::Firestore => Db::new(Arc::new(
            FirestoreDb::new(&config.gcp_project_id).await?,
        )),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data will not survive restarts");
            Db::new(Arc::new(MemoryDb::new()))
        }
    };

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), db, Arc::new(SystemClock)));

    // Build router
    let app = trackboard::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trackboard=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();

    Ok(())
}

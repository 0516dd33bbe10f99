// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP route handlers.
//!
//! Three groups share one router: public, authenticated (`/api/*`) and
//! admin (`/admin/*`, authenticated plus admin role).

pub mod admin;
pub mod api;

use crate::middleware::auth::{require_admin, require_auth};
use crate::middleware::security::add_security_headers;
use crate::AppState;
use axum::extract::State;
use axum::http::{header, request::Parts, HeaderValue, Method};
use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Origins accepted besides the configured frontend (local dev servers).
const DEV_ORIGIN_PREFIXES: [&str; 2] = ["http://localhost", "http://127.0.0.1"];

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HealthResponse {
    pub status: String,
    pub build_id: String,
    pub store: String,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        build_id: option_env!("BUILD_ID").unwrap_or("unknown").to_string(),
        store: state.config.store_backend.as_str().to_string(),
    })
}

/// Credentialed CORS for the frontend and local dev servers.
fn cors_layer(frontend_url: String) -> CorsLayer {
    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
        let Ok(origin) = origin.to_str() else {
            return false;
        };
        origin == frontend_url
            || DEV_ORIGIN_PREFIXES
                .iter()
                .any(|prefix| origin.starts_with(prefix))
    });

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let auth = middleware::from_fn_with_state(state.clone(), require_auth);

    // route_layer wraps outside-in, so auth runs before the role check
    let admin_routes = admin::routes()
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .route_layer(auth.clone());

    let user_routes = api::routes().route_layer(auth);

    Router::new()
        .route("/health", get(health_check))
        .merge(user_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn(add_security_headers))
        .layer(cors_layer(state.config.frontend_url.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

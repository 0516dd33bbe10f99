// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Activity, ActivityStats, Role, Tracking};
use crate::services::{LeaderboardEntry, TrackingCursor};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me).put(update_me))
        .route("/api/activities", get(list_activities))
        .route("/api/trackings", get(list_trackings).post(start_tracking))
        .route("/api/trackings/active", get(get_active_tracking))
        .route("/api/trackings/active/stop", post(stop_tracking))
        .route("/api/trackings/{id}", patch(annotate_tracking))
        .route("/api/stats/activities", get(get_activity_stats))
        .route("/api/leaderboard", get(get_leaderboard))
        .route(
            "/api/leaderboard/activities/{id}",
            get(get_activity_leaderboard),
        )
        .route("/api/leaderboard/stream", get(leaderboard_stream))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MeResponse {
    pub user_id: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub role: Role,
    /// Total tracked time (ms)
    pub tracked_time: i64,
    pub total_trackings: i64,
    pub active_tracking: Option<Tracking>,
}

/// Get current user profile, aggregates and open session.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    // Users who never saved a session or edited their profile have no document yet
    let profile = state
        .db
        .get_user(&user.user_id)
        .await?
        .unwrap_or_default();

    Ok(Json(MeResponse {
        active_tracking: live_active_tracking(&state, &user.user_id),
        user_id: user.user_id,
        display_name: profile.display_name,
        photo_url: profile.photo_url,
        role: profile.role,
        tracked_time: profile.tracked_time,
        total_trackings: profile.total_trackings,
    }))
}

#[derive(Deserialize, Validate)]
struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 50))]
    display_name: Option<String>,
    #[validate(url, length(max = 2048))]
    photo_url: Option<String>,
}

/// Update display name and/or photo. Counters are never written here.
async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<MeResponse>> {
    payload.validate()?;

    state
        .db
        .update_user_profile(
            &user.user_id,
            payload.display_name.as_deref(),
            payload.photo_url.as_deref(),
        )
        .await?;

    get_me(State(state), Extension(user)).await
}

// ─── Activities ──────────────────────────────────────────────

/// Activities users may track.
async fn list_activities(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Activity>>> {
    let activities = state
        .db
        .list_activities()
        .await?
        .into_iter()
        .filter(|a| a.active)
        .collect();
    Ok(Json(activities))
}

// ─── Trackings ───────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct StartTrackingRequest {
    #[validate(length(min = 1, max = 100))]
    activity_id: String,
}

/// The open session with its duration computed as of now.
fn live_active_tracking(state: &AppState, user_id: &str) -> Option<Tracking> {
    state.tracking_service.active_tracking(user_id).map(|mut t| {
        t.duration = t.live_duration_at(state.tracking_service.now());
        t
    })
}

async fn start_tracking(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<StartTrackingRequest>,
) -> Result<(StatusCode, Json<Tracking>)> {
    payload.validate()?;

    let tracking = state
        .tracking_service
        .start_tracking(&user.user_id, &payload.activity_id)
        .await?;

    Ok((StatusCode::CREATED, Json(tracking)))
}

async fn get_active_tracking(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Tracking>> {
    live_active_tracking(&state, &user.user_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No active tracking session".to_string()))
}

async fn stop_tracking(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Tracking>> {
    let saved = state.tracking_service.stop_tracking(&user.user_id).await?;
    Ok(Json(saved))
}

#[derive(Deserialize, Validate)]
struct AnnotateRequest {
    #[validate(length(max = 2000))]
    notes: Option<String>,
    #[validate(url, length(max = 2048))]
    image_url: Option<String>,
}

/// Replace the notes and image of a saved tracking.
async fn annotate_tracking(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(tracking_id): Path<String>,
    Json(payload): Json<AnnotateRequest>,
) -> Result<Json<Tracking>> {
    payload.validate()?;

    let tracking = state
        .tracking_service
        .annotate_tracking(
            &user.user_id,
            &tracking_id,
            payload.notes,
            payload.image_url,
        )
        .await?;

    Ok(Json(tracking))
}

#[derive(Deserialize)]
struct TrackingsQuery {
    /// Cursor for forward pagination (opaque token).
    cursor: Option<String>,
    /// Pagination: items per page
    #[serde(default = "default_per_page")]
    per_page: u32,
}

fn default_per_page() -> u32 {
    50
}

const MAX_PER_PAGE: u32 = 100;

fn parse_cursor(cursor: Option<&str>) -> Result<Option<TrackingCursor>> {
    cursor
        .map(|raw| {
            let invalid_cursor = || AppError::BadRequest("Invalid 'cursor' parameter".to_string());

            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            let decoded_str = std::str::from_utf8(&decoded).map_err(|_| invalid_cursor())?;

            let mut parts = decoded_str.splitn(3, ':');
            let seconds = parts
                .next()
                .and_then(|p| p.parse::<i64>().ok())
                .ok_or_else(invalid_cursor)?;
            let nanos = parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(invalid_cursor)?;
            let tracking_id = parts
                .next()
                .filter(|p| !p.is_empty())
                .ok_or_else(invalid_cursor)?;
            let start_date =
                chrono::DateTime::from_timestamp(seconds, nanos).ok_or_else(invalid_cursor)?;

            Ok(TrackingCursor {
                start_date,
                tracking_id: tracking_id.to_string(),
            })
        })
        .transpose()
}

fn encode_cursor(cursor: &TrackingCursor) -> String {
    let payload = format!(
        "{}:{}:{}",
        cursor.start_date.timestamp(),
        cursor.start_date.timestamp_subsec_nanos(),
        cursor.tracking_id
    );
    URL_SAFE_NO_PAD.encode(payload)
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TrackingsResponse {
    pub trackings: Vec<Tracking>,
    pub per_page: u32,
    pub next_cursor: Option<String>,
}

/// Get the user's saved trackings, newest first.
async fn list_trackings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<TrackingsQuery>,
) -> Result<Json<TrackingsResponse>> {
    if params.per_page < 1 {
        return Err(AppError::BadRequest(
            "per_page must be greater than 0".to_string(),
        ));
    }
    let limit = params.per_page.min(MAX_PER_PAGE);
    let cursor = parse_cursor(params.cursor.as_deref())?;

    tracing::debug!(
        user_id = %user.user_id,
        cursor = ?params.cursor,
        limit,
        "Fetching trackings"
    );

    let page = state
        .tracking_service
        .list_trackings(&user.user_id, cursor.as_ref(), limit as usize)
        .await?;

    Ok(Json(TrackingsResponse {
        trackings: page.trackings,
        per_page: limit,
        next_cursor: page.next_cursor.as_ref().map(encode_cursor),
    }))
}

// ─── Stats ───────────────────────────────────────────────────

/// Time tracked per activity for the current user, most first.
async fn get_activity_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ActivityStats>>> {
    let mut stats = state
        .db
        .list_activity_stats_for_user(&user.user_id)
        .await?;
    stats.sort_by(|a, b| {
        b.tracked_time
            .cmp(&a.tracked_time)
            .then_with(|| a.activity_reference.cmp(&b.activity_reference))
    });
    Ok(Json(stats))
}

// ─── Leaderboard ─────────────────────────────────────────────

async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<LeaderboardEntry>>> {
    Ok(Json(state.leaderboard_service.leaderboard().await?))
}

async fn get_activity_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(activity_id): Path<String>,
) -> Result<Json<Vec<LeaderboardEntry>>> {
    if state.db.get_activity(&activity_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Activity {} not found",
            activity_id
        )));
    }

    Ok(Json(
        state
            .leaderboard_service
            .activity_leaderboard(&activity_id)
            .await?,
    ))
}

/// Server-sent events: the current leaderboard, then a fresh snapshot
/// each time a user aggregate changes.
async fn leaderboard_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let service = state.leaderboard_service.clone();
    let watch = service.subscribe();

    let stream = futures_util::stream::unfold(
        (service, watch, true),
        |(service, mut watch, first)| async move {
            if !first && !watch.changed().await {
                return None;
            }

            let event = match service.leaderboard().await {
                Ok(board) => Event::default()
                    .event("leaderboard")
                    .json_data(&board)
                    .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())),
                Err(e) => Event::default().event("error").data(e.code()),
            };

            Some((Ok(event), (service, watch, false)))
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::default())
}

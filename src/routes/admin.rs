// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin routes: activity definitions and user roles.
//!
//! Auth and role middleware are applied in routes/mod.rs.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Activity, Role, UserProfile};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::{Validate, ValidationError};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/admin/activities",
            get(list_activities).post(create_activity),
        )
        .route(
            "/admin/activities/{id}",
            put(update_activity).delete(delete_activity),
        )
        .route("/admin/users/{id}/role", put(update_user_role))
}

#[derive(Deserialize, Validate)]
struct ActivityRequest {
    /// Optional slug for new activities; a UUID is generated otherwise
    #[validate(length(min = 1, max = 100), custom(function = "validate_activity_id"))]
    id: Option<String>,
    #[validate(length(min = 1, max = 100))]
    title: String,
    #[validate(length(max = 100))]
    icon: Option<String>,
    #[validate(length(max = 2000))]
    description: Option<String>,
    #[validate(url, length(max = 2048))]
    image: Option<String>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

/// Activity ids are ASCII letters, digits and `-` only.
fn validate_activity_id(id: &str) -> std::result::Result<(), ValidationError> {
    if id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        Ok(())
    } else {
        Err(ValidationError::new("activity_id_charset"))
    }
}

impl ActivityRequest {
    fn into_activity(self, id: String) -> Activity {
        Activity {
            id,
            title: self.title,
            icon: self.icon,
            description: self.description,
            image: self.image,
            active: self.active,
        }
    }
}

/// All activities, including inactive ones.
async fn list_activities(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Activity>>> {
    Ok(Json(state.db.list_activities().await?))
}

async fn create_activity(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Json(payload): Json<ActivityRequest>,
) -> Result<(StatusCode, Json<Activity>)> {
    payload.validate()?;

    let id = payload
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if state.db.get_activity(&id).await?.is_some() {
        return Err(AppError::Conflict(format!("Activity {} already exists", id)));
    }

    let activity = payload.into_activity(id);
    state.db.upsert_activity(&activity).await?;

    tracing::info!(
        admin = %admin.user_id,
        activity_id = %activity.id,
        "Activity created"
    );

    Ok((StatusCode::CREATED, Json(activity)))
}

async fn update_activity(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(activity_id): Path<String>,
    Json(payload): Json<ActivityRequest>,
) -> Result<Json<Activity>> {
    payload.validate()?;

    if payload.id.as_deref().is_some_and(|id| id != activity_id) {
        return Err(AppError::BadRequest(
            "Activity id cannot be changed".to_string(),
        ));
    }

    if state.db.get_activity(&activity_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Activity {} not found",
            activity_id
        )));
    }

    let activity = payload.into_activity(activity_id);
    state.db.upsert_activity(&activity).await?;

    tracing::info!(
        admin = %admin.user_id,
        activity_id = %activity.id,
        active = activity.active,
        "Activity updated"
    );

    Ok(Json(activity))
}

/// Delete an activity definition. Saved trackings and aggregates keep
/// their references.
async fn delete_activity(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(activity_id): Path<String>,
) -> Result<StatusCode> {
    if state.db.get_activity(&activity_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Activity {} not found",
            activity_id
        )));
    }

    state.db.delete_activity(&activity_id).await?;

    tracing::info!(admin = %admin.user_id, activity_id = %activity_id, "Activity deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct RoleRequest {
    role: Role,
}

async fn update_user_role(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<String>,
    Json(payload): Json<RoleRequest>,
) -> Result<Json<UserProfile>> {
    if user_id == admin.user_id && payload.role != Role::Admin {
        return Err(AppError::BadRequest(
            "Admins cannot remove their own admin role".to_string(),
        ));
    }

    if state.db.get_user(&user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
    }

    state.db.set_user_role(&user_id, payload.role).await?;

    tracing::info!(
        admin = %admin.user_id,
        user_id = %user_id,
        role = ?payload.role,
        "User role updated"
    );

    let profile = state
        .db
        .get_user(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

    Ok(Json(profile))
}

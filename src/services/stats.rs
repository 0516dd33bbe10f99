// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Statistics updater.
//!
//! Saving a finished tracking is one atomic batch:
//! 1. Upsert the tracking document (full snapshot with computed duration)
//! 2. Increment the per-user-per-activity `trackedTime`
//! 3. Increment the user's `trackedTime` and `total_trackings`

use crate::db::{collections, to_value, Db, SetMode, WriteBatch};
use crate::error::{AppError, Result};
use crate::models::stats::activity_stats_doc_id;
use crate::models::Tracking;
use chrono::{DateTime, Utc};
use serde_json::json;

/// Persists trackings and keeps the aggregates in step with them.
#[derive(Clone)]
pub struct StatsUpdater {
    db: Db,
}

impl StatsUpdater {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Save `tracking` and apply its duration to the aggregates.
    ///
    /// The duration is computed as of `now` and written back into the
    /// returned snapshot. Fails with `MissingReference` before any write
    /// when the owner or activity is unset. No retry is attempted.
    pub async fn save_to_db(&self, tracking: &Tracking, now: DateTime<Utc>) -> Result<Tracking> {
        let (user_id, activity_id) = tracking.references()?;
        let (user_id, activity_id) = (user_id.to_string(), activity_id.to_string());

        let mut snapshot = tracking.clone();
        snapshot.duration = snapshot.duration_at(now);
        let duration = snapshot.duration;

        let stats_id = activity_stats_doc_id(&user_id, &activity_id);

        let mut batch = WriteBatch::new();
        batch
            .set(
                collections::TRACKINGS,
                &snapshot.id,
                to_value(&snapshot)?,
                SetMode::Overwrite,
            )
            .set(
                collections::USER_ACTIVITY_STATS,
                &stats_id,
                json!({
                    "userReference": user_id,
                    "activityReference": activity_id,
                }),
                SetMode::Merge,
            )
            .increment(
                collections::USER_ACTIVITY_STATS,
                &stats_id,
                &[("trackedTime", duration)],
            )
            .increment(
                collections::USERS,
                &user_id,
                &[("trackedTime", duration), ("total_trackings", 1)],
            );

        if let Err(e) = self.db.commit(batch).await {
            tracing::error!(
                error = %e,
                tracking_id = %snapshot.id,
                user_id = %user_id,
                activity_id = %activity_id,
                "Failed to save tracking"
            );
            return Err(match e {
                AppError::Persistence(_) => e,
                other => AppError::Persistence(other.to_string()),
            });
        }

        tracing::info!(
            tracking_id = %snapshot.id,
            user_id = %user_id,
            activity_id = %activity_id,
            duration_ms = duration,
            "Tracking saved"
        );

        Ok(snapshot)
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tracking session service.
//!
//! Open sessions live in an in-memory registry keyed by user id, which
//! enforces at most one active session per user. Stopping a session hands
//! it to the [`StatsUpdater`] for the atomic save; the entry stays in the
//! registry, marked as closing, until that save commits.

use crate::db::Db;
use crate::error::{AppError, Result};
use crate::models::Tracking;
use crate::services::StatsUpdater;
use crate::time_utils::Clock;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Page of saved trackings plus the position to continue from.
#[derive(Debug)]
pub struct TrackingPage {
    pub trackings: Vec<Tracking>,
    pub next_cursor: Option<TrackingCursor>,
}

/// Position in a user's tracking history (newest first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingCursor {
    pub start_date: DateTime<Utc>,
    pub tracking_id: String,
}

/// Registry entry for an open session.
#[derive(Debug, Clone)]
struct ActiveSession {
    tracking: Tracking,
    /// Set while a stop is saving this session.
    closing: bool,
}

/// Clears the closing marker when dropped, unless the session is gone.
///
/// Covers both a failed save and a stop future dropped mid-save.
struct ClosingMarker<'a> {
    active: &'a DashMap<String, ActiveSession>,
    user_id: &'a str,
    tracking_id: String,
}

impl Drop for ClosingMarker<'_> {
    fn drop(&mut self) {
        if let Some(mut session) = self.active.get_mut(self.user_id) {
            if session.tracking.id == self.tracking_id {
                session.closing = false;
            }
        }
    }
}

#[derive(Clone)]
pub struct TrackingService {
    db: Db,
    stats: StatsUpdater,
    clock: Arc<dyn Clock>,
    active: Arc<DashMap<String, ActiveSession>>,
}

impl TrackingService {
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self {
            stats: StatsUpdater::new(db.clone()),
            db,
            clock,
            active: Arc::new(DashMap::new()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Start tracking `activity_id` for `user_id`.
    ///
    /// Rejects with `Conflict` if the user already has an open session,
    /// including one whose stop is still saving.
    pub async fn start_tracking(&self, user_id: &str, activity_id: &str) -> Result<Tracking> {
        let activity = self
            .db
            .get_activity(activity_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Activity {} not found", activity_id)))?;

        if !activity.active {
            return Err(AppError::BadRequest(format!(
                "Activity {} is not active",
                activity_id
            )));
        }

        let tracking = Tracking::start(user_id, &activity.id, self.clock.now())?;

        match self.active.entry(user_id.to_string()) {
            Entry::Occupied(existing) => {
                tracing::debug!(
                    user_id,
                    active_tracking = %existing.get().tracking.id,
                    closing = existing.get().closing,
                    "Rejecting start while a session is active"
                );
                Err(AppError::Conflict(
                    "A tracking session is already active".to_string(),
                ))
            }
            Entry::Vacant(slot) => {
                slot.insert(ActiveSession {
                    tracking: tracking.clone(),
                    closing: false,
                });
                tracing::info!(
                    user_id,
                    activity_id,
                    tracking_id = %tracking.id,
                    "Tracking started"
                );
                Ok(tracking)
            }
        }
    }

    /// The user's open session, if any.
    pub fn active_tracking(&self, user_id: &str) -> Option<Tracking> {
        self.active
            .get(user_id)
            .map(|entry| entry.value().tracking.clone())
    }

    /// Stop the user's open session and save it.
    ///
    /// The session stays registered while the save runs, so concurrent
    /// starts and stops get `Conflict`. It is removed only once the save
    /// commits; on failure it is left open for a retry.
    pub async fn stop_tracking(&self, user_id: &str) -> Result<Tracking> {
        let open = {
            let mut session = self
                .active
                .get_mut(user_id)
                .ok_or_else(|| AppError::NotFound("No active tracking session".to_string()))?;
            if session.closing {
                return Err(AppError::Conflict(
                    "Tracking session is already being stopped".to_string(),
                ));
            }
            session.closing = true;
            session.tracking.clone()
        };
        let _marker = ClosingMarker {
            active: &self.active,
            user_id,
            tracking_id: open.id.clone(),
        };

        let now = self.clock.now();
        let mut closed = open.clone();
        closed.stop(now)?;

        match self.stats.save_to_db(&closed, now).await {
            Ok(saved) => {
                self.active
                    .remove_if(user_id, |_, session| session.tracking.id == open.id);
                Ok(saved)
            }
            Err(e) => {
                tracing::warn!(
                    user_id,
                    tracking_id = %open.id,
                    "Keeping active session after failed save"
                );
                Err(e)
            }
        }
    }

    /// Replace the annotation of a saved tracking owned by `user_id`.
    ///
    /// Only the tracking document is rewritten; aggregates are untouched.
    pub async fn annotate_tracking(
        &self,
        user_id: &str,
        tracking_id: &str,
        notes: Option<String>,
        image_url: Option<String>,
    ) -> Result<Tracking> {
        let mut tracking = self
            .db
            .get_tracking(tracking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Tracking {} not found", tracking_id)))?;

        if tracking.user_reference.as_deref() != Some(user_id) {
            return Err(AppError::Forbidden(
                "Tracking belongs to another user".to_string(),
            ));
        }

        tracking.notes = notes;
        tracking.image_url = image_url;

        self.db
            .update_tracking_annotation(
                tracking_id,
                tracking.notes.as_deref(),
                tracking.image_url.as_deref(),
            )
            .await?;

        tracing::debug!(user_id, tracking_id, "Tracking annotation updated");
        Ok(tracking)
    }

    /// Saved trackings for `user_id`, newest first, after `cursor`.
    pub async fn list_trackings(
        &self,
        user_id: &str,
        cursor: Option<&TrackingCursor>,
        limit: usize,
    ) -> Result<TrackingPage> {
        let all = self.db.list_trackings_for_user(user_id).await?;

        let mut remaining: Vec<Tracking> = match cursor {
            Some(cursor) => all
                .into_iter()
                .filter(|t| {
                    let start = t.start_date.unwrap_or(DateTime::<Utc>::MIN_UTC);
                    start < cursor.start_date
                        || (start == cursor.start_date && t.id < cursor.tracking_id)
                })
                .collect(),
            None => all,
        };

        let has_more = remaining.len() > limit;
        remaining.truncate(limit);

        let next_cursor = if has_more {
            remaining.last().map(|t| TrackingCursor {
                start_date: t.start_date.unwrap_or(DateTime::<Utc>::MIN_UTC),
                tracking_id: t.id.clone(),
            })
        } else {
            None
        };

        Ok(TrackingPage {
            trackings: remaining,
            next_cursor,
        })
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tracking session model and duration accounting.

use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Longest duration a single session may contribute (3 hours).
pub const MAX_TRACKING_DURATION_MS: i64 = 3 * 60 * 60 * 1000;

/// Lifecycle state of a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Active,
    Closed,
}

/// One timed session of a user performing an activity.
///
/// Stored at: `trackings/{id}` once the session is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Tracking {
    pub id: String,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub user_reference: Option<String>,
    #[serde(default)]
    pub activity_reference: Option<String>,
    /// Snapshot of the computed duration (ms), written at save time.
    #[serde(default)]
    pub duration: i64,
}

impl Tracking {
    /// Open a new session for `user_id` on `activity_id` starting at `now`.
    pub fn start(user_id: &str, activity_id: &str, now: DateTime<Utc>) -> Result<Self> {
        if user_id.is_empty() {
            return Err(AppError::MissingReference("user"));
        }
        if activity_id.is_empty() {
            return Err(AppError::MissingReference("activity"));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            start_date: Some(now),
            end_date: None,
            is_active: true,
            notes: None,
            image_url: None,
            user_reference: Some(user_id.to_string()),
            activity_reference: Some(activity_id.to_string()),
            duration: 0,
        })
    }

    /// Close the session at `now`.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.references()?;
        self.end_date = Some(now);
        self.is_active = false;
        Ok(())
    }

    pub fn state(&self) -> TrackingState {
        if self.is_active {
            TrackingState::Active
        } else if self.end_date.is_some() {
            TrackingState::Closed
        } else {
            TrackingState::Idle
        }
    }

    /// Owner and activity ids, or `MissingReference` if either is unset.
    pub fn references(&self) -> Result<(&str, &str)> {
        let user = self
            .user_reference
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or(AppError::MissingReference("user"))?;
        let activity = self
            .activity_reference
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or(AppError::MissingReference("activity"))?;
        Ok((user, activity))
    }

    /// Duration in milliseconds as of the system clock.
    pub fn duration(&self) -> i64 {
        self.duration_at(Utc::now())
    }

    /// Duration in milliseconds as of `now`, capped at
    /// [`MAX_TRACKING_DURATION_MS`]. Logs a warning when the cap applies.
    pub fn duration_at(&self, now: DateTime<Utc>) -> i64 {
        let elapsed = self.elapsed_at(now);
        if elapsed > MAX_TRACKING_DURATION_MS {
            tracing::warn!(
                tracking_id = %self.id,
                elapsed_ms = elapsed,
                cap_ms = MAX_TRACKING_DURATION_MS,
                "Tracking duration exceeded cap, clamping"
            );
            return MAX_TRACKING_DURATION_MS;
        }

        elapsed
    }

    /// Same value as [`Tracking::duration_at`] without the cap warning.
    /// For polling views of an open session.
    pub fn live_duration_at(&self, now: DateTime<Utc>) -> i64 {
        self.elapsed_at(now).min(MAX_TRACKING_DURATION_MS)
    }

    /// Uncapped elapsed milliseconds; negative spans count as 0.
    fn elapsed_at(&self, now: DateTime<Utc>) -> i64 {
        let Some(start) = self.start_date else {
            return 0;
        };

        let end = match self.end_date {
            Some(end) => end,
            None if self.is_active => now,
            None => return 0,
        };

        (end - start).num_milliseconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn count_warnings<F: FnOnce()>(f: F) -> usize {
        let count = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(count.clone()));
        tracing::subscriber::with_default(subscriber, f);
        count.load(Ordering::SeqCst)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> Tracking {
        let mut tracking = Tracking::start("user-1", "cycling", start).unwrap();
        tracking.stop(end).unwrap();
        tracking
    }

    #[test]
    fn test_no_start_date_is_zero() {
        let mut tracking = Tracking::start("user-1", "cycling", t0()).unwrap();
        tracking.start_date = None;
        assert_eq!(tracking.duration_at(t0() + Duration::hours(1)), 0);

        tracking.is_active = false;
        tracking.end_date = Some(t0() + Duration::hours(1));
        assert_eq!(tracking.duration_at(t0() + Duration::hours(2)), 0);
    }

    #[test]
    fn test_inactive_without_end_date_is_zero() {
        let mut tracking = Tracking::start("user-1", "cycling", t0()).unwrap();
        tracking.is_active = false;
        assert_eq!(tracking.state(), TrackingState::Idle);
        assert_eq!(tracking.duration_at(t0() + Duration::minutes(30)), 0);
    }

    #[test]
    fn test_two_hour_session() {
        let tracking = closed(t0(), t0() + Duration::hours(2));
        assert_eq!(tracking.duration_at(t0() + Duration::days(1)), 7_200_000);
        assert_eq!(tracking.state(), TrackingState::Closed);
    }

    #[test]
    fn test_four_hour_session_is_capped_with_warning() {
        let tracking = closed(t0(), t0() + Duration::hours(4));
        let mut duration = 0;
        let warnings = count_warnings(|| duration = tracking.duration_at(t0()));

        assert_eq!(duration, 10_800_000);
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_exactly_at_cap_does_not_warn() {
        let tracking = closed(t0(), t0() + Duration::hours(3));
        let mut duration = 0;
        let warnings = count_warnings(|| duration = tracking.duration_at(t0()));

        assert_eq!(duration, MAX_TRACKING_DURATION_MS);
        assert_eq!(warnings, 0);
    }

    #[test]
    fn test_active_session_grows_then_pins_at_cap() {
        let tracking = Tracking::start("user-1", "cycling", t0()).unwrap();
        assert_eq!(tracking.state(), TrackingState::Active);

        let mut previous = 0;
        for minutes in [0, 1, 30, 90, 179, 180, 181, 240, 600] {
            let now = t0() + Duration::minutes(minutes);
            let duration = tracking.duration_at(now);
            assert!(duration >= previous, "duration must not decrease");
            assert_eq!(
                duration,
                (minutes * 60 * 1000).min(MAX_TRACKING_DURATION_MS)
            );
            previous = duration;
        }
    }

    #[test]
    fn test_live_duration_clamps_without_warning() {
        let tracking = Tracking::start("user-1", "cycling", t0()).unwrap();
        let now = t0() + Duration::hours(5);

        let mut live = 0;
        let warnings = count_warnings(|| {
            for _ in 0..3 {
                live = tracking.live_duration_at(now);
            }
        });

        assert_eq!(live, MAX_TRACKING_DURATION_MS);
        assert_eq!(warnings, 0);
        assert_eq!(
            tracking.live_duration_at(t0() + Duration::minutes(20)),
            tracking.duration_at(t0() + Duration::minutes(20))
        );
    }

    #[test]
    fn test_end_before_start_is_zero() {
        let tracking = closed(t0(), t0() - Duration::minutes(5));
        assert_eq!(tracking.duration_at(t0()), 0);
    }

    #[test]
    fn test_stop_requires_references() {
        let mut tracking = Tracking::start("user-1", "cycling", t0()).unwrap();
        tracking.user_reference = None;

        let err = tracking.stop(t0() + Duration::minutes(1)).unwrap_err();
        assert!(matches!(err, AppError::MissingReference("user")));
        assert!(tracking.is_active);
        assert!(tracking.end_date.is_none());
    }

    #[test]
    fn test_start_rejects_empty_references() {
        assert!(matches!(
            Tracking::start("", "cycling", t0()),
            Err(AppError::MissingReference("user"))
        ));
        assert!(matches!(
            Tracking::start("user-1", "", t0()),
            Err(AppError::MissingReference("activity"))
        ));
    }

    #[test]
    fn test_serializes_with_stored_field_names() {
        let tracking = closed(t0(), t0() + Duration::hours(1));
        let value = serde_json::to_value(&tracking).unwrap();

        for field in [
            "startDate",
            "endDate",
            "isActive",
            "userReference",
            "activityReference",
            "imageUrl",
        ] {
            assert!(value.get(field).is_some(), "missing field {}", field);
        }
    }
}

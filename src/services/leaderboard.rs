// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Leaderboard projection.
//!
//! Rankings are recomputed from the aggregates on every read; there is no
//! incremental index. Callers that want live updates subscribe to the
//! change feed and re-read when a user aggregate changes.

use crate::db::{collections, ChangeEvent, Db};
use crate::error::Result;
use crate::models::UserProfile;
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Anything that can be ranked by tracked time.
pub trait Ranked {
    fn tracked_time(&self) -> i64;
}

impl Ranked for UserProfile {
    fn tracked_time(&self) -> i64 {
        self.tracked_time
    }
}

impl Ranked for crate::models::ActivityStats {
    fn tracked_time(&self) -> i64 {
        self.tracked_time
    }
}

/// Display marker for a leaderboard position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMarker {
    First,
    Second,
    Third,
    /// 1-based position from fourth place down
    Numbered(usize),
}

impl fmt::Display for RankMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankMarker::First => write!(f, "🥇"),
            RankMarker::Second => write!(f, "🥈"),
            RankMarker::Third => write!(f, "🥉"),
            RankMarker::Numbered(n) => write!(f, "#{}", n),
        }
    }
}

/// Marker for the 0-based leaderboard `index`.
pub fn rank_marker(index: usize) -> RankMarker {
    match index {
        0 => RankMarker::First,
        1 => RankMarker::Second,
        2 => RankMarker::Third,
        n => RankMarker::Numbered(n + 1),
    }
}

/// Sort by descending tracked time. Ties keep their input order.
pub fn project<T: Ranked>(mut items: Vec<T>) -> Vec<T> {
    items.sort_by(|a, b| b.tracked_time().cmp(&a.tracked_time()));
    items
}

/// One row of a leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LeaderboardEntry {
    /// 1-based position
    pub rank: usize,
    pub marker: String,
    pub user_id: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    /// Tracked time (ms)
    pub tracked_time: i64,
    /// Only present on the global leaderboard
    pub total_trackings: Option<i64>,
}

#[derive(Clone)]
pub struct LeaderboardService {
    db: Db,
}

impl LeaderboardService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Global ranking of all users by cumulative tracked time.
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        let mut users = self.db.list_users().await?;
        // Stable projection over id order makes ties deterministic
        users.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(project(users)
            .into_iter()
            .enumerate()
            .map(|(index, user)| LeaderboardEntry {
                rank: index + 1,
                marker: rank_marker(index).to_string(),
                user_id: user.id,
                display_name: user.display_name,
                photo_url: user.photo_url,
                tracked_time: user.tracked_time,
                total_trackings: Some(user.total_trackings),
            })
            .collect())
    }

    /// Ranking of users by time tracked on one activity.
    pub async fn activity_leaderboard(&self, activity_id: &str) -> Result<Vec<LeaderboardEntry>> {
        let mut stats = self.db.list_activity_stats_for_activity(activity_id).await?;
        stats.sort_by(|a, b| a.user_reference.cmp(&b.user_reference));

        let mut entries = Vec::with_capacity(stats.len());
        for (index, stat) in project(stats).into_iter().enumerate() {
            let profile = self.db.get_user(&stat.user_reference).await?;
            let (display_name, photo_url) = profile
                .map(|p| (p.display_name, p.photo_url))
                .unwrap_or_default();
            entries.push(LeaderboardEntry {
                rank: index + 1,
                marker: rank_marker(index).to_string(),
                user_id: stat.user_reference,
                display_name,
                photo_url,
                tracked_time: stat.tracked_time,
                total_trackings: None,
            });
        }

        Ok(entries)
    }

    /// Watch for changes that can affect the global leaderboard.
    pub fn subscribe(&self) -> LeaderboardWatch {
        LeaderboardWatch {
            rx: self.db.subscribe(),
        }
    }
}

/// Change notifications relevant to the global leaderboard.
pub struct LeaderboardWatch {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl LeaderboardWatch {
    /// Wait until a user aggregate changes.
    ///
    /// Returns `false` once the change feed is closed. Lagging counts as a
    /// change since events were dropped.
    pub async fn changed(&mut self) -> bool {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.collection == collections::USERS => return true,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Leaderboard watcher lagged");
                    return true;
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DocumentStore;

    fn profile(id: &str, tracked_time: i64) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            tracked_time,
            ..Default::default()
        }
    }

    #[test]
    fn test_project_sorts_descending() {
        let ranked = project(vec![
            profile("a", 100),
            profile("b", 300),
            profile("c", 200),
        ]);
        let times: Vec<i64> = ranked.iter().map(|p| p.tracked_time).collect();
        assert_eq!(times, vec![300, 200, 100]);
    }

    #[test]
    fn test_project_ties_keep_input_order() {
        let ranked = project(vec![profile("z", 5), profile("a", 5), profile("m", 9)]);
        let ids: Vec<&str> = ranked.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["m", "z", "a"]);
    }

    #[test]
    fn test_rank_markers() {
        assert_eq!(rank_marker(0), RankMarker::First);
        assert_eq!(rank_marker(1), RankMarker::Second);
        assert_eq!(rank_marker(2), RankMarker::Third);
        assert_eq!(rank_marker(3), RankMarker::Numbered(4));
        assert_eq!(rank_marker(3).to_string(), "#4");
        assert_eq!(rank_marker(41).to_string(), "#42");
    }

    #[tokio::test]
    async fn test_leaderboard_ranks_users() {
        let db = Db::memory();
        for (id, time) in [("u1", 100), ("u2", 300), ("u3", 200), ("u4", 50)] {
            db.store()
                .increment(
                    collections::USERS,
                    id,
                    &[("trackedTime", time), ("total_trackings", 1)],
                )
                .await
                .unwrap();
        }
        db.update_user_profile("u2", Some("Grace"), None)
            .await
            .unwrap();

        let board = LeaderboardService::new(db).leaderboard().await.unwrap();

        let ids: Vec<&str> = board.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u2", "u3", "u1", "u4"]);
        assert_eq!(board[0].marker, "🥇");
        assert_eq!(board[0].display_name.as_deref(), Some("Grace"));
        assert_eq!(board[3].marker, "#4");
        assert_eq!(board[3].rank, 4);
    }

    #[tokio::test]
    async fn test_activity_leaderboard_only_counts_that_activity() {
        use crate::models::Tracking;
        use crate::services::StatsUpdater;
        use chrono::{Duration, TimeZone, Utc};

        let db = Db::memory();
        let updater = StatsUpdater::new(db.clone());
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();

        for (user, activity, minutes) in [
            ("u1", "cycling", 30),
            ("u2", "cycling", 90),
            ("u1", "yoga", 600),
        ] {
            let mut tracking = Tracking::start(user, activity, t0).unwrap();
            tracking.stop(t0 + Duration::minutes(minutes)).unwrap();
            updater.save_to_db(&tracking, t0).await.unwrap();
        }

        let board = LeaderboardService::new(db)
            .activity_leaderboard("cycling")
            .await
            .unwrap();

        assert_eq!(board.len(), 2);
        assert_eq!(board[0].user_id, "u2");
        assert_eq!(board[0].tracked_time, 90 * 60 * 1000);
        assert_eq!(board[1].user_id, "u1");
        assert_eq!(board[1].tracked_time, 30 * 60 * 1000);
        assert!(board[0].total_trackings.is_none());
    }

    #[tokio::test]
    async fn test_watch_ignores_other_collections() {
        let db = Db::memory();
        let service = LeaderboardService::new(db.clone());
        let mut watch = service.subscribe();

        db.store()
            .increment(collections::USER_ACTIVITY_STATS, "u1_a", &[("trackedTime", 1)])
            .await
            .unwrap();
        db.store()
            .increment(collections::USERS, "u1", &[("trackedTime", 1)])
            .await
            .unwrap();

        assert!(watch.changed().await);
    }
}

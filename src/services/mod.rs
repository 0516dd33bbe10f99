// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod leaderboard;
pub mod stats;
pub mod tracking;

pub use leaderboard::{LeaderboardEntry, LeaderboardService, LeaderboardWatch};
pub use stats::StatsUpdater;
pub use tracking::{TrackingCursor, TrackingPage, TrackingService};

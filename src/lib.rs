// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Trackboard: timed activity tracking with leaderboards
//!
//! This crate provides the backend API for starting and stopping tracking
//! sessions, keeping per-user and per-activity time aggregates, and ranking
//! users by tracked time.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Db;
use services::{LeaderboardService, TrackingService};
use std::sync::Arc;
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Db,
    pub tracking_service: TrackingService,
    pub leaderboard_service: LeaderboardService,
}

impl AppState {
    pub fn new(config: Config, db: Db, clock: Arc<dyn Clock>) -> Self {
        Self {
            tracking_service: TrackingService::new(db.clone(), clock),
            leaderboard_service: LeaderboardService::new(db.clone()),
            config,
            db,
        }
    }
}

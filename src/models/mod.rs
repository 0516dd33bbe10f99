// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod stats;
pub mod tracking;
pub mod user;

pub use activity::Activity;
pub use stats::ActivityStats;
pub use tracking::{Tracking, TrackingState, MAX_TRACKING_DURATION_MS};
pub use user::{Role, UserProfile};

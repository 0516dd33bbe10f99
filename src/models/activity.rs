// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity definitions managed by administrators.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A trackable category (e.g. "Cycling").
///
/// Stored at: `activities/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Activity {
    /// Document ID
    pub id: String,
    pub title: String,
    /// Icon name understood by the client
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Cover image URL
    #[serde(default)]
    pub image: Option<String>,
    /// Inactive activities are hidden from users and cannot be tracked
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

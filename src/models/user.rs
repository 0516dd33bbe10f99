//! User profile model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Role controlling access to the admin routes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Public user profile and global tracking aggregate.
///
/// Stored at: `users/{id}`. The counters are only ever changed through
/// atomic increments; profile edits merge the other fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserProfile {
    /// Document ID (identity provider uid)
    #[serde(default)]
    pub id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(rename = "photoUrl", default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub role: Role,
    /// Sum of all session durations (ms)
    #[serde(rename = "trackedTime", default)]
    pub tracked_time: i64,
    /// Number of sessions saved
    #[serde(default)]
    pub total_trackings: i64,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

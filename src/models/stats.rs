//! Per-user-per-activity aggregates.
//!
//! Maintained by atomic increments when a tracking is saved, so ranking
//! time per activity is a single collection read.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Time a user has tracked on one activity.
///
/// Stored at: `user_activity_stats/{user_id}_{activity_id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivityStats {
    #[serde(rename = "userReference", default)]
    pub user_reference: String,
    #[serde(rename = "activityReference", default)]
    pub activity_reference: String,
    /// Total tracked time on this activity (ms)
    #[serde(rename = "trackedTime", default)]
    pub tracked_time: i64,
}

/// Document ID for a per-user-per-activity aggregate.
///
/// Both parts are escaped with [`escape_id_part`], so neither contains the
/// `_` separator and distinct pairs always map to distinct ids.
pub fn activity_stats_doc_id(user_id: &str, activity_id: &str) -> String {
    format!("{}_{}", escape_id_part(user_id), escape_id_part(activity_id))
}

/// Percent-encode `part`, including `_`, which `urlencoding` leaves as is.
fn escape_id_part(part: &str) -> String {
    urlencoding::encode(part).replace('_', "%5F")
}

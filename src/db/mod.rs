//! Database layer: store interface, backends and typed access.

pub mod firestore;
pub mod memory;
pub mod store;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;
pub use store::{ChangeEvent, Document, DocumentStore, SetMode, WriteBatch, WriteOp};

use crate::error::{AppError, Result};
use crate::models::{Activity, ActivityStats, Role, Tracking, UserProfile};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Collection names as constants.
pub mod collections {
    /// Public profiles and global aggregates (keyed by user id)
    pub const USERS: &str = "users";
    pub const ACTIVITIES: &str = "activities";
    pub const TRACKINGS: &str = "trackings";
    /// Per-user-per-activity aggregates (keyed by `{user}_{activity}`)
    pub const USER_ACTIVITY_STATS: &str = "user_activity_stats";
}

/// Serialize a model into a store document body.
pub fn to_value<T: Serialize>(model: &T) -> Result<Value> {
    serde_json::to_value(model)
        .map_err(|e| AppError::Persistence(format!("Failed to encode document: {}", e)))
}

fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    serde_json::from_value(doc.data).map_err(|e| {
        AppError::Persistence(format!("Failed to decode document {}: {}", doc.id, e))
    })
}

/// Typed access to the document store.
#[derive(Clone)]
pub struct Db {
    store: Arc<dyn DocumentStore>,
}

impl Db {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Backed by a fresh in-memory store.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryDb::new()))
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.store.commit(batch).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.store.subscribe()
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user profile. The id is filled from the document id.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.store
            .get(collections::USERS, user_id)
            .await?
            .map(user_from_document)
            .transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>> {
        self.store
            .list(collections::USERS)
            .await?
            .into_iter()
            .map(user_from_document)
            .collect()
    }

    /// Merge profile fields without touching the counters.
    pub async fn update_user_profile(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<()> {
        let mut fields = serde_json::Map::new();
        if let Some(name) = display_name {
            fields.insert("displayName".to_string(), json!(name));
        }
        if let Some(url) = photo_url {
            fields.insert("photoUrl".to_string(), json!(url));
        }
        if fields.is_empty() {
            return Ok(());
        }

        self.store
            .set(
                collections::USERS,
                user_id,
                Value::Object(fields),
                SetMode::Merge,
            )
            .await
    }

    pub async fn set_user_role(&self, user_id: &str, role: Role) -> Result<()> {
        self.store
            .set(
                collections::USERS,
                user_id,
                json!({ "role": role }),
                SetMode::Merge,
            )
            .await
    }

    // ─── Activity Operations ─────────────────────────────────────

    pub async fn get_activity(&self, activity_id: &str) -> Result<Option<Activity>> {
        self.store
            .get(collections::ACTIVITIES, activity_id)
            .await?
            .map(from_document)
            .transpose()
    }

    /// All activity definitions, ordered by title.
    pub async fn list_activities(&self) -> Result<Vec<Activity>> {
        let mut activities: Vec<Activity> = self
            .store
            .list(collections::ACTIVITIES)
            .await?
            .into_iter()
            .map(from_document)
            .collect::<Result<_>>()?;
        activities.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        Ok(activities)
    }

    pub async fn upsert_activity(&self, activity: &Activity) -> Result<()> {
        self.store
            .set(
                collections::ACTIVITIES,
                &activity.id,
                to_value(activity)?,
                SetMode::Overwrite,
            )
            .await
    }

    pub async fn delete_activity(&self, activity_id: &str) -> Result<()> {
        self.store
            .delete(collections::ACTIVITIES, activity_id)
            .await
    }

    // ─── Tracking Operations ─────────────────────────────────────

    pub async fn get_tracking(&self, tracking_id: &str) -> Result<Option<Tracking>> {
        self.store
            .get(collections::TRACKINGS, tracking_id)
            .await?
            .map(from_document)
            .transpose()
    }

    /// All saved trackings for a user, newest first.
    pub async fn list_trackings_for_user(&self, user_id: &str) -> Result<Vec<Tracking>> {
        let mut trackings: Vec<Tracking> = self
            .store
            .find_eq(collections::TRACKINGS, "userReference", user_id)
            .await?
            .into_iter()
            .map(from_document)
            .collect::<Result<_>>()?;
        trackings.sort_by(|a, b| {
            b.start_date
                .cmp(&a.start_date)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(trackings)
    }

    /// Overwrite only the annotation fields of a saved tracking.
    pub async fn update_tracking_annotation(
        &self,
        tracking_id: &str,
        notes: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<()> {
        self.store
            .set(
                collections::TRACKINGS,
                tracking_id,
                json!({ "notes": notes, "imageUrl": image_url }),
                SetMode::Merge,
            )
            .await
    }

    // ─── Activity Stats Operations ───────────────────────────────

    pub async fn list_activity_stats_for_user(&self, user_id: &str) -> Result<Vec<ActivityStats>> {
        self.store
            .find_eq(collections::USER_ACTIVITY_STATS, "userReference", user_id)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn list_activity_stats_for_activity(
        &self,
        activity_id: &str,
    ) -> Result<Vec<ActivityStats>> {
        self.store
            .find_eq(
                collections::USER_ACTIVITY_STATS,
                "activityReference",
                activity_id,
            )
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }
}

fn user_from_document(doc: Document) -> Result<UserProfile> {
    let id = doc.id.clone();
    let mut user: UserProfile = from_document(doc)?;
    user.id = id;
    Ok(user)
}

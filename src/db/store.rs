// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Backend-neutral document store interface.
//!
//! Documents are JSON objects addressed by collection and document id.
//! Multi-document writes go through [`WriteBatch`], which every backend
//! must commit all-or-nothing.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

/// A stored document together with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// How a `set` treats fields already present in the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Replace the whole document.
    Overwrite,
    /// Only write the top-level fields present in the new value.
    Merge,
}

/// One write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set {
        collection: String,
        id: String,
        data: Value,
        mode: SetMode,
    },
    /// Add integer deltas to numeric fields, creating the document and
    /// fields as needed.
    Increment {
        collection: String,
        id: String,
        fields: Vec<(String, i64)>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Set { collection, .. }
            | WriteOp::Increment { collection, .. }
            | WriteOp::Delete { collection, .. } => collection,
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            WriteOp::Set { id, .. } | WriteOp::Increment { id, .. } | WriteOp::Delete { id, .. } => {
                id
            }
        }
    }
}

/// Ordered set of writes committed atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, collection: &str, id: &str, data: Value, mode: SetMode) -> &mut Self {
        self.ops.push(WriteOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
            mode,
        });
        self
    }

    pub fn increment(&mut self, collection: &str, id: &str, fields: &[(&str, i64)]) -> &mut Self {
        self.ops.push(WriteOp::Increment {
            collection: collection.to_string(),
            id: id.to_string(),
            fields: fields
                .iter()
                .map(|(name, delta)| (name.to_string(), *delta))
                .collect(),
        });
        self
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Notification that a document was written or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: String,
    pub document_id: String,
}

/// Change feed capacity. Slow subscribers lag and skip ahead.
pub const CHANGE_FEED_CAPACITY: usize = 256;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    async fn list(&self, collection: &str) -> Result<Vec<Document>>;

    /// Documents whose string field `field` equals `value`.
    async fn find_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Document>>;

    /// Commit every write in `batch` or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Subscribe to change events for writes committed through this store.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;

    async fn set(&self, collection: &str, id: &str, data: Value, mode: SetMode) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.set(collection, id, data, mode);
        self.commit(batch).await
    }

    async fn increment(&self, collection: &str, id: &str, fields: &[(&str, i64)]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.increment(collection, id, fields);
        self.commit(batch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(collection, id);
        self.commit(batch).await
    }
}

/// Change events produced by committing `ops`, one per touched document.
pub(crate) fn change_events(ops: &[WriteOp]) -> Vec<ChangeEvent> {
    let mut events: Vec<ChangeEvent> = Vec::with_capacity(ops.len());
    for op in ops {
        let event = ChangeEvent {
            collection: op.collection().to_string(),
            document_id: op.document_id().to_string(),
        };
        if !events.contains(&event) {
            events.push(event);
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_keeps_order() {
        let mut batch = WriteBatch::new();
        batch
            .set("trackings", "t1", json!({ "duration": 5 }), SetMode::Overwrite)
            .increment("users", "u1", &[("trackedTime", 5), ("total_trackings", 1)])
            .delete("activities", "old");

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.ops()[0].collection(), "trackings");
        assert_eq!(batch.ops()[1].document_id(), "u1");
        assert!(matches!(batch.ops()[2], WriteOp::Delete { .. }));
    }

    #[test]
    fn test_change_events_dedupe_same_document() {
        let mut batch = WriteBatch::new();
        batch
            .set("stats", "u1_a", json!({ "userReference": "u1" }), SetMode::Merge)
            .increment("stats", "u1_a", &[("trackedTime", 10)])
            .increment("users", "u1", &[("trackedTime", 10)]);

        let events = change_events(batch.ops());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].document_id, "u1_a");
        assert_eq!(events[1].collection, "users");
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store.
//!
//! Used for local development (`STORE_BACKEND=memory`) and tests. Batches
//! are applied to a staged copy of the touched collections and swapped in
//! only once every operation has succeeded.

use crate::db::store::{
    change_events, ChangeEvent, Document, DocumentStore, SetMode, WriteBatch, WriteOp,
    CHANGE_FEED_CAPACITY,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

type Collection = BTreeMap<String, Value>;

/// Sentinel for "no failure injected".
const NO_FAILURE: usize = usize::MAX;

/// In-memory document store.
#[derive(Clone)]
pub struct MemoryDb {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
    changes: broadcast::Sender<ChangeEvent>,
    fail_commit_after: Arc<AtomicUsize>,
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDb {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            changes,
            fail_commit_after: Arc::new(AtomicUsize::new(NO_FAILURE)),
        }
    }

    /// Make the next commit fail after applying `ops` operations to its
    /// staged copy. The injected failure fires once.
    pub fn fail_next_commit_after(&self, ops: usize) {
        self.fail_commit_after.store(ops, Ordering::SeqCst);
    }

    /// Number of documents currently stored in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

fn apply(staged: &mut Collection, op: WriteOp) -> Result<()> {
    match op {
        WriteOp::Set { id, data, mode, .. } => {
            let Value::Object(fields) = data else {
                return Err(AppError::Persistence(format!(
                    "Document {} must be a JSON object",
                    id
                )));
            };
            if mode == SetMode::Merge {
                if let Some(Value::Object(existing)) = staged.get_mut(&id) {
                    existing.extend(fields);
                    return Ok(());
                }
            }
            staged.insert(id, Value::Object(fields));
        }
        WriteOp::Increment { id, fields, .. } => {
            let doc = staged
                .entry(id.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            let Value::Object(doc) = doc else {
                return Err(AppError::Persistence(format!(
                    "Document {} is not an object",
                    id
                )));
            };
            for (field, delta) in fields {
                let current = match doc.get(&field) {
                    None | Some(Value::Null) => 0,
                    Some(value) => value.as_i64().ok_or_else(|| {
                        AppError::Persistence(format!(
                            "Cannot increment non-integer field {} on {}",
                            field, id
                        ))
                    })?,
                };
                let next = current.checked_add(delta).ok_or_else(|| {
                    AppError::Persistence(format!("Increment overflow on {}.{}", id, field))
                })?;
                doc.insert(field, Value::from(next));
            }
        }
        WriteOp::Delete { id, .. } => {
            staged.remove(&id);
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryDb {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Document>> {
        let docs = self.list(collection).await?;
        Ok(docs
            .into_iter()
            .filter(|doc| doc.data.get(field).and_then(Value::as_str) == Some(value))
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        let ops = batch.into_ops();
        let events = change_events(&ops);
        let fail_after = self.fail_commit_after.swap(NO_FAILURE, Ordering::SeqCst);

        let mut collections = self.collections.write().await;

        // Stage copies of every touched collection
        let mut staged: HashMap<String, Collection> = HashMap::new();
        for op in &ops {
            staged
                .entry(op.collection().to_string())
                .or_insert_with(|| collections.get(op.collection()).cloned().unwrap_or_default());
        }

        for (applied, op) in ops.into_iter().enumerate() {
            if applied == fail_after {
                tracing::warn!(applied, "Injected commit failure");
                return Err(AppError::Persistence(
                    "Injected commit failure".to_string(),
                ));
            }
            let target = staged
                .get_mut(op.collection())
                .ok_or_else(|| AppError::Persistence("Collection not staged".to_string()))?;
            apply(target, op)?;
        }

        collections.extend(staged);
        drop(collections);

        for event in events {
            // No receivers is fine
            let _ = self.changes.send(event);
        }

        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

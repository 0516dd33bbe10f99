// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore backend for the document store.
//!
//! Batches commit as a single Firestore transaction and counters use
//! server-side increment transforms, so concurrent writers never lose
//! updates.

use crate::db::store::{
    change_events, ChangeEvent, Document, DocumentStore, SetMode, WriteBatch, WriteOp,
    CHANGE_FEED_CAPACITY,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use gcloud_sdk::google::firestore::v1::Document as FirestoreDocument;
use serde_json::Value;
use tokio::sync::broadcast;

// Firestore limits batch/transaction writes to 500 operations.
const MAX_BATCH_OPS: usize = 500;

/// Prefix of the metadata fields the firestore crate adds on read.
const METADATA_PREFIX: &str = "_firestore_";

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // The emulator rejects real credentials; use an unauthenticated connection.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Persistence(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self::with_client(Some(client)))
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Persistence(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self::with_client(Some(client)))
    }

    /// Create an offline client. Every operation returns a persistence error.
    pub fn new_mock() -> Self {
        Self::with_client(None)
    }

    fn with_client(client: Option<firestore::FirestoreDb>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { client, changes }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client.as_ref().ok_or_else(|| {
            AppError::Persistence("Database not connected (offline mode)".to_string())
        })
    }

    /// Queue one write on an open transaction.
    fn add_op(
        client: &firestore::FirestoreDb,
        transaction: &mut firestore::FirestoreTransaction<'_>,
        op: &WriteOp,
    ) -> std::result::Result<(), firestore::errors::FirestoreError> {
        match op {
            WriteOp::Set {
                collection,
                id,
                data,
                mode: SetMode::Overwrite,
            } => {
                client
                    .fluent()
                    .update()
                    .in_col(collection)
                    .document_id(id)
                    .object(data)
                    .add_to_transaction(transaction)?;
            }
            WriteOp::Set {
                collection,
                id,
                data,
                mode: SetMode::Merge,
            } => {
                let fields: Vec<String> = data
                    .as_object()
                    .map(|obj| obj.keys().cloned().collect())
                    .unwrap_or_default();
                client
                    .fluent()
                    .update()
                    .fields(fields)
                    .in_col(collection)
                    .document_id(id)
                    .object(data)
                    .add_to_transaction(transaction)?;
            }
            WriteOp::Increment {
                collection,
                id,
                fields,
            } => {
                client
                    .fluent()
                    .update()
                    .in_col(collection)
                    .document_id(id)
                    .transforms(|t| {
                        let increments: Vec<_> = fields
                            .iter()
                            .map(|(field, delta)| t.field(field.as_str()).increment(*delta))
                            .collect();
                        t.fields(increments)
                    })
                    .only_transform()
                    .add_to_transaction(transaction)?;
            }
            WriteOp::Delete { collection, id } => {
                client
                    .fluent()
                    .delete()
                    .from(collection.as_str())
                    .document_id(id)
                    .add_to_transaction(transaction)?;
            }
        }
        Ok(())
    }
}

/// Convert a raw Firestore document into a store document.
fn to_document(doc: &FirestoreDocument) -> Result<Document> {
    let id = doc
        .name
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();

    let mut data: Value = firestore::FirestoreDb::deserialize_doc_to(doc)
        .map_err(|e| AppError::Persistence(format!("Failed to decode document {}: {}", id, e)))?;

    if let Value::Object(fields) = &mut data {
        fields.retain(|key, _| !key.starts_with(METADATA_PREFIX));
    }

    Ok(Document { id, data })
}

#[async_trait]
impl DocumentStore for FirestoreDb {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let doc = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .one(id)
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;

        doc.as_ref().map(to_document).transpose()
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let docs = self
            .get_client()?
            .fluent()
            .select()
            .from(collection)
            .query()
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;

        docs.iter().map(to_document).collect()
    }

    async fn find_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Document>> {
        let docs = self
            .get_client()?
            .fluent()
            .select()
            .from(collection)
            .filter(|q| q.for_all([q.field(field).eq(value)]))
            .query()
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;

        docs.iter().map(to_document).collect()
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.len() > MAX_BATCH_OPS {
            return Err(AppError::Persistence(format!(
                "Batch of {} writes exceeds Firestore limit of {}",
                batch.len(),
                MAX_BATCH_OPS
            )));
        }

        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Persistence(format!("Failed to begin transaction: {}", e)))?;

        for op in batch.ops() {
            if let Err(e) = Self::add_op(client, &mut transaction, op) {
                let _ = transaction.rollback().await;
                return Err(AppError::Persistence(format!(
                    "Failed to add write on {}/{} to transaction: {}",
                    op.collection(),
                    op.document_id(),
                    e
                )));
            }
        }

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Persistence(format!("Transaction commit failed: {}", e)))?;

        tracing::debug!(writes = batch.len(), "Batch committed");

        for event in change_events(batch.ops()) {
            let _ = self.changes.send(event);
        }

        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

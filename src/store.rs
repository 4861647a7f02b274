// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Snapshot archive.
//!
//! Every pushed snapshot is first stored in an archive collection of the
//! operational store, keyed by a string `_id`. The same identity is later
//! used as the search store document id, so the archive can be replayed
//! (reindex) and the search store can be copied back into it (reverse).
//!
//! [`SnapshotStore`] is the seam; [`MongoSnapshotStore`] is the production
//! implementation and [`MemorySnapshotStore`] keeps documents in-process.

use crate::aggregation::connect_database;
use crate::codec::ID_FIELD;
use crate::error::QueryError;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use mongodb::Collection;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use tracing::{debug, info};

/// Boxed future returned by [`SnapshotStore`] calls.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueryError>> + Send + 'a>>;

/// Stream of archived documents, in store order.
pub type DocumentStream = BoxStream<'static, Result<Document, QueryError>>;

/// Archive of snapshot documents keyed by string identity.
pub trait SnapshotStore: Send + Sync + 'static {
    /// Store a new document and return its identity.
    ///
    /// A non-empty string `_id` already in the document is kept; otherwise a
    /// fresh one is generated.
    fn insert(&self, doc: Document) -> StoreFuture<'_, String>;

    /// Replace the document with this identity, creating it if absent.
    fn upsert(&self, id: &str, doc: Document) -> StoreFuture<'_, ()>;

    /// Every archived document.
    fn scan(&self) -> StoreFuture<'_, DocumentStream>;
}

/// Set `_id` on a document that lacks a usable one. Returns the identity.
pub fn assign_identity(doc: &mut Document) -> String {
    match doc.get(ID_FIELD) {
        Some(Bson::String(id)) if !id.is_empty() => id.clone(),
        _ => {
            let id = ObjectId::new().to_hex();
            doc.insert(ID_FIELD, id.clone());
            id
        }
    }
}

/// Archive collection in MongoDB.
#[derive(Clone)]
pub struct MongoSnapshotStore {
    collection: Collection<Document>,
}

impl MongoSnapshotStore {
    pub fn new(collection: Collection<Document>) -> Self {
        Self { collection }
    }

    /// Connect using a `mongodb://host/<database>` URL and a collection name.
    pub async fn connect(url: &str, collection: &str) -> Result<Self, QueryError> {
        let db = connect_database(url).await?;
        info!(database = %db.name(), collection, "Connected to snapshot archive");
        Ok(Self::new(db.collection(collection)))
    }

    async fn insert_document(&self, mut doc: Document) -> Result<String, QueryError> {
        let id = assign_identity(&mut doc);
        self.collection
            .insert_one(doc)
            .await
            .map_err(|e| QueryError::mongo("archive.insert", e))?;
        debug!(id = %id, "Archived snapshot");
        Ok(id)
    }

    async fn upsert_document(&self, id: String, mut doc: Document) -> Result<(), QueryError> {
        doc.insert(ID_FIELD, id.clone());
        self.collection
            .replace_one(doc! { ID_FIELD: &id }, doc)
            .upsert(true)
            .await
            .map_err(|e| QueryError::mongo("archive.upsert", e))?;
        debug!(id = %id, "Upserted archived snapshot");
        Ok(())
    }

    async fn scan_documents(&self) -> Result<DocumentStream, QueryError> {
        let cursor = self
            .collection
            .find(doc! {})
            .await
            .map_err(|e| QueryError::mongo("archive.scan", e))?;
        Ok(cursor
            .map_err(|e| QueryError::mongo("archive.scan", e))
            .boxed())
    }
}

impl SnapshotStore for MongoSnapshotStore {
    fn insert(&self, doc: Document) -> StoreFuture<'_, String> {
        Box::pin(self.insert_document(doc))
    }

    fn upsert(&self, id: &str, doc: Document) -> StoreFuture<'_, ()> {
        Box::pin(self.upsert_document(id.to_string(), doc))
    }

    fn scan(&self) -> StoreFuture<'_, DocumentStream> {
        Box::pin(self.scan_documents())
    }
}

/// In-process archive, ordered by identity.
#[derive(Default)]
pub struct MemorySnapshotStore {
    documents: Mutex<BTreeMap<String, Document>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.lock().get(id).cloned()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Document>> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn insert(&self, mut doc: Document) -> StoreFuture<'_, String> {
        let id = assign_identity(&mut doc);
        let result = {
            let mut documents = self.lock();
            if documents.contains_key(&id) {
                Err(QueryError::msg("archive.insert", format!("duplicate _id {}", id)))
            } else {
                documents.insert(id.clone(), doc);
                Ok(id)
            }
        };
        Box::pin(async move { result })
    }

    fn upsert(&self, id: &str, mut doc: Document) -> StoreFuture<'_, ()> {
        doc.insert(ID_FIELD, id);
        self.lock().insert(id.to_string(), doc);
        Box::pin(async { Ok(()) })
    }

    fn scan(&self) -> StoreFuture<'_, DocumentStream> {
        let documents: Vec<Result<Document, QueryError>> =
            self.documents().into_iter().map(Ok).collect();
        Box::pin(async move { Ok(stream::iter(documents).boxed()) })
    }
}

//! In-memory storage for fast, deterministic tests
//!
//! - [`InMemoryDocumentStore`]: `BTreeMap`-backed document store
//! - [`InMemoryFileStore`]: `HashMap`-backed file store
//!
//! Both are cheap to clone; clones share the same data so a test can keep
//! a handle for assertions after passing one into an environment.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Poisoned locks only happen after a test already failed

use chrono::{DateTime, Utc};
use eventhaiti_core::documents::{
    DocumentError, DocumentFuture, DocumentPath, DocumentStore, StoredDocument,
};
use eventhaiti_core::files::{FileFuture, FileStore, FileStoreError, StoragePath, StoredFile};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory document store.
///
/// # Example
///
/// ```
/// use eventhaiti_testing::InMemoryDocumentStore;
/// use eventhaiti_core::documents::{DocumentPath, DocumentStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryDocumentStore::new();
/// let path = DocumentPath::new("events", "evt_1");
///
/// store.set(path.clone(), serde_json::json!({ "title": "Kanaval" })).await?;
/// assert!(store.get(path).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryDocumentStore {
    documents: Arc<RwLock<BTreeMap<(String, String), (serde_json::Value, DateTime<Utc>)>>>,
    fail_writes: Arc<AtomicBool>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(BTreeMap::new())),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every subsequent `set`/`delete` fail with a database error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Insert a raw document, bypassing validation and failure injection
    pub fn insert(&self, path: &DocumentPath, data: serde_json::Value) {
        self.documents.write().unwrap().insert(
            (path.collection().to_string(), path.id().to_string()),
            (data, Utc::now()),
        );
    }

    /// Raw document body, if present
    #[must_use]
    pub fn raw(&self, path: &DocumentPath) -> Option<serde_json::Value> {
        self.documents
            .read()
            .unwrap()
            .get(&(path.collection().to_string(), path.id().to_string()))
            .map(|(data, _)| data.clone())
    }

    /// Number of documents in a collection
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.documents
            .read()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == collection)
            .count()
    }

    /// Clear all documents (for test isolation)
    pub fn clear(&self) {
        self.documents.write().unwrap().clear();
    }

    fn check_writable(&self) -> Result<(), DocumentError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DocumentError::Database("injected write failure".to_string()));
        }
        Ok(())
    }

    fn matching<F>(&self, collection: &str, keep: F) -> Vec<StoredDocument>
    where
        F: Fn(&serde_json::Value) -> bool,
    {
        self.documents
            .read()
            .unwrap()
            .iter()
            .filter(|((c, _), (data, _))| c == collection && keep(data))
            .map(|((c, id), (data, updated_at))| StoredDocument {
                path: DocumentPath::new(c.clone(), id.clone()),
                data: data.clone(),
                updated_at: *updated_at,
            })
            .collect()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, path: DocumentPath) -> DocumentFuture<'_, Option<StoredDocument>> {
        Box::pin(async move {
            let documents = self.documents.read().unwrap();
            Ok(documents
                .get(&(path.collection().to_string(), path.id().to_string()))
                .map(|(data, updated_at)| StoredDocument {
                    path: path.clone(),
                    data: data.clone(),
                    updated_at: *updated_at,
                }))
        })
    }

    fn set(&self, path: DocumentPath, data: serde_json::Value) -> DocumentFuture<'_, ()> {
        Box::pin(async move {
            self.check_writable()?;
            path.validate()?;
            self.insert(&path, data);
            Ok(())
        })
    }

    fn delete(&self, path: DocumentPath) -> DocumentFuture<'_, bool> {
        Box::pin(async move {
            self.check_writable()?;
            Ok(self
                .documents
                .write()
                .unwrap()
                .remove(&(path.collection().to_string(), path.id().to_string()))
                .is_some())
        })
    }

    fn list(&self, collection: String) -> DocumentFuture<'_, Vec<StoredDocument>> {
        Box::pin(async move { Ok(self.matching(&collection, |_| true)) })
    }

    fn query(
        &self,
        collection: String,
        field: String,
        value: serde_json::Value,
    ) -> DocumentFuture<'_, Vec<StoredDocument>> {
        Box::pin(async move {
            Ok(self.matching(&collection, |data| data.get(&field) == Some(&value)))
        })
    }
}

/// In-memory file store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryFileStore {
    files: Arc<RwLock<HashMap<StoragePath, (Vec<u8>, String)>>>,
}

impl InMemoryFileStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.read().unwrap().len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.read().unwrap().is_empty()
    }

    /// Stored bytes at `path`
    #[must_use]
    pub fn bytes(&self, path: &StoragePath) -> Option<Vec<u8>> {
        self.files.read().unwrap().get(path).map(|(bytes, _)| bytes.clone())
    }

    /// All stored paths, sorted
    #[must_use]
    pub fn paths(&self) -> Vec<StoragePath> {
        let mut paths: Vec<_> = self.files.read().unwrap().keys().cloned().collect();
        paths.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        paths
    }
}

impl FileStore for InMemoryFileStore {
    fn put(&self, path: StoragePath, bytes: Vec<u8>, content_type: String) -> FileFuture<'_, StoredFile> {
        Box::pin(async move {
            eventhaiti_core::files::check_upload_size(bytes.len())?;
            let stored = StoredFile {
                path: path.clone(),
                size: bytes.len(),
                content_type: content_type.clone(),
            };
            self.files.write().unwrap().insert(path, (bytes, content_type));
            Ok(stored)
        })
    }

    fn delete(&self, path: StoragePath) -> FileFuture<'_, ()> {
        Box::pin(async move {
            self.files.write().unwrap().remove(&path);
            Ok::<(), FileStoreError>(())
        })
    }

    fn exists(&self, path: StoragePath) -> FileFuture<'_, bool> {
        Box::pin(async move { Ok(self.files.read().unwrap().contains_key(&path)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventhaiti_core::documents;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get() {
        let store = InMemoryDocumentStore::new();
        let path = DocumentPath::new("events", "evt_1");
        store.set(path.clone(), json!({ "title": "Jazz" })).await.unwrap();

        let document = store.get(path).await.unwrap().unwrap();
        assert_eq!(document.data["title"], "Jazz");
    }

    #[tokio::test]
    async fn query_matches_top_level_fields_in_id_order() {
        let store = InMemoryDocumentStore::new();
        store.insert(&DocumentPath::new("tickets", "t2"), json!({ "eventId": "e1" }));
        store.insert(&DocumentPath::new("tickets", "t1"), json!({ "eventId": "e1" }));
        store.insert(&DocumentPath::new("tickets", "t3"), json!({ "eventId": "e2" }));
        store.insert(&DocumentPath::new("events", "e1"), json!({ "eventId": "e1" }));

        let found: Vec<(String, serde_json::Value)> =
            documents::query(&store, "tickets", "eventId", json!("e1")).await.unwrap();
        let ids: Vec<_> = found.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn injected_failures_block_writes_only() {
        let store = InMemoryDocumentStore::new();
        let path = DocumentPath::new("events", "evt_1");
        store.insert(&path, json!({}));
        store.fail_writes(true);

        assert!(store.set(path.clone(), json!({})).await.is_err());
        assert!(store.get(path).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn file_store_round_trip_and_delete() {
        let files = InMemoryFileStore::new();
        let path = StoragePath::new("verification/u1/selfie_1.jpg");
        files
            .put(path.clone(), vec![1, 2, 3], "image/jpeg".to_string())
            .await
            .unwrap();
        assert!(files.exists(path.clone()).await.unwrap());
        assert_eq!(files.bytes(&path), Some(vec![1, 2, 3]));

        files.delete(path.clone()).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn empty_uploads_are_refused() {
        let files = InMemoryFileStore::new();
        let result = files
            .put(StoragePath::new("x/y"), Vec::new(), "image/png".to_string())
            .await;
        assert_eq!(result.unwrap_err(), FileStoreError::Empty);
    }
}

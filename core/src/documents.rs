//! Document store trait and typed helpers.
//!
//! Every piece of marketplace state is a JSON document addressed by a
//! collection path and a document id, with last-write-wins semantics per
//! document. No cross-document transactions are offered.
//!
//! # Implementations
//!
//! - `PostgresDocumentStore` (in `eventhaiti-postgres`): Production implementation
//! - `InMemoryDocumentStore` (in `eventhaiti-testing`): Fast, deterministic testing
//!
//! Raw documents are `serde_json::Value`s. Callers go through [`load`],
//! [`save`] and [`query`] so that shape errors surface as
//! [`DocumentError::Serialization`] at the I/O boundary instead of deep
//! inside business logic.
//!
//! # Example
//!
//! ```no_run
//! use eventhaiti_core::documents::{self, DocumentPath, DocumentStore, DocumentError};
//! # #[derive(serde::Serialize, serde::Deserialize)]
//! # struct Event { title: String }
//!
//! async fn rename(store: &dyn DocumentStore) -> Result<(), DocumentError> {
//!     let path = DocumentPath::new("events", "evt_1");
//!     if let Some(mut event) = documents::load::<Event>(store, &path).await? {
//!         event.title = "Kanaval".to_string();
//!         documents::save(store, &path, &event).await?;
//!     }
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`DocumentStore`] methods.
pub type DocumentFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DocumentError>> + Send + 'a>>;

/// Errors that can occur during document store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// Stored data does not match the expected document shape.
    #[error("Malformed document at {path}: {message}")]
    Serialization {
        /// Path of the offending document.
        path: String,
        /// Decoder message.
        message: String,
    },

    /// Invalid collection or document id.
    #[error("Invalid document path: {0}")]
    InvalidPath(String),
}

/// Address of a single document: `collection/id`.
///
/// Sub-collections are expressed with a slash-separated collection, e.g.
/// `organizers/org_1/payoutProfiles`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    collection: String,
    id: String,
}

impl DocumentPath {
    /// Top-level document path.
    #[must_use]
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Document inside a sub-collection of another document.
    #[must_use]
    pub fn nested(
        parent_collection: &str,
        parent_id: &str,
        collection: &str,
        id: impl Into<String>,
    ) -> Self {
        Self {
            collection: format!("{parent_collection}/{parent_id}/{collection}"),
            id: id.into(),
        }
    }

    /// Collection part of the path.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Document id part of the path.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reject empty segments and ids containing `/`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidPath`] when the path cannot address a document.
    pub fn validate(&self) -> Result<(), DocumentError> {
        let bad_collection = self.collection.is_empty()
            || self.collection.split('/').any(str::is_empty)
            || self.collection.split('/').count() % 2 == 0;
        if bad_collection || self.id.is_empty() || self.id.contains('/') {
            return Err(DocumentError::InvalidPath(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A raw document as returned by a store.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredDocument {
    /// Where the document lives.
    pub path: DocumentPath,
    /// Document body.
    pub data: serde_json::Value,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}

/// Document store abstraction.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the store can be shared as
/// `Arc<dyn DocumentStore>` and captured by reducer effects.
pub trait DocumentStore: Send + Sync {
    /// Fetch one document. Missing documents are `Ok(None)`.
    fn get(&self, path: DocumentPath) -> DocumentFuture<'_, Option<StoredDocument>>;

    /// Create or overwrite a document (last write wins).
    fn set(&self, path: DocumentPath, data: serde_json::Value) -> DocumentFuture<'_, ()>;

    /// Delete a document. Returns whether it existed.
    fn delete(&self, path: DocumentPath) -> DocumentFuture<'_, bool>;

    /// All documents of a collection, ordered by id.
    fn list(&self, collection: String) -> DocumentFuture<'_, Vec<StoredDocument>>;

    /// Documents of a collection whose top-level `field` equals `value`, ordered by id.
    fn query(
        &self,
        collection: String,
        field: String,
        value: serde_json::Value,
    ) -> DocumentFuture<'_, Vec<StoredDocument>>;
}

fn decode<T: DeserializeOwned>(document: StoredDocument) -> Result<T, DocumentError> {
    serde_json::from_value(document.data).map_err(|e| DocumentError::Serialization {
        path: document.path.to_string(),
        message: e.to_string(),
    })
}

/// Load and decode a document.
///
/// # Errors
///
/// Returns [`DocumentError::Serialization`] if the stored shape does not
/// decode into `T`, or the store's own error.
pub async fn load<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    path: &DocumentPath,
) -> Result<Option<T>, DocumentError> {
    store.get(path.clone()).await?.map(decode).transpose()
}

/// Encode and write a document.
///
/// # Errors
///
/// Returns [`DocumentError::Serialization`] if `document` cannot be encoded,
/// or the store's own error.
pub async fn save<T: Serialize + Sync>(
    store: &dyn DocumentStore,
    path: &DocumentPath,
    document: &T,
) -> Result<(), DocumentError> {
    path.validate()?;
    let data = serde_json::to_value(document).map_err(|e| DocumentError::Serialization {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    store.set(path.clone(), data).await
}

/// Query by field equality and decode every match as `(id, document)`.
///
/// # Errors
///
/// Fails on the first document that does not decode into `T`.
pub async fn query<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    field: &str,
    value: serde_json::Value,
) -> Result<Vec<(String, T)>, DocumentError> {
    store
        .query(collection.to_string(), field.to_string(), value)
        .await?
        .into_iter()
        .map(|document| {
            let id = document.path.id().to_string();
            decode(document).map(|decoded| (id, decoded))
        })
        .collect()
}

/// Decode every document of a collection as `(id, document)`.
///
/// # Errors
///
/// Fails on the first document that does not decode into `T`.
pub async fn list<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<Vec<(String, T)>, DocumentError> {
    store
        .list(collection.to_string())
        .await?
        .into_iter()
        .map(|document| {
            let id = document.path.id().to_string();
            decode(document).map(|decoded| (id, decoded))
        })
        .collect()
}

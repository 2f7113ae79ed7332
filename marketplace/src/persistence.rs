//! Document write effects.
//!
//! Reducers describe the documents an action changed as a list of
//! [`DocumentWrite`]s; [`write_documents`] turns that list into one effect
//! that applies the writes in order and reports back a single action.

use eventhaiti_core::documents::{DocumentError, DocumentPath, DocumentStore};
use eventhaiti_core::effect::Effect;
use eventhaiti_runtime::metrics::MarketplaceMetrics;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug)]
enum WriteOp {
    Set(Result<serde_json::Value, DocumentError>),
    Delete,
}

/// One pending document write.
#[derive(Debug)]
pub struct DocumentWrite {
    path: DocumentPath,
    op: WriteOp,
}

impl DocumentWrite {
    /// Create or overwrite `path` with `document`.
    ///
    /// Encoding errors surface when the effect runs.
    pub fn set<T: Serialize>(path: DocumentPath, document: &T) -> Self {
        let data = serde_json::to_value(document).map_err(|e| DocumentError::Serialization {
            path: path.to_string(),
            message: e.to_string(),
        });
        Self {
            path,
            op: WriteOp::Set(data),
        }
    }

    /// Delete `path`.
    #[must_use]
    pub const fn delete(path: DocumentPath) -> Self {
        Self {
            path,
            op: WriteOp::Delete,
        }
    }

    /// Target path.
    #[must_use]
    pub const fn path(&self) -> &DocumentPath {
        &self.path
    }
}

/// Apply `writes` in order, stopping at the first failure.
///
/// Produces `on_success` when every write landed, otherwise
/// `on_failure(error)`. Earlier writes are not rolled back.
pub fn write_documents<A, F>(
    documents: &Arc<dyn DocumentStore>,
    writes: Vec<DocumentWrite>,
    on_success: A,
    on_failure: F,
) -> Effect<A>
where
    A: Send + 'static,
    F: FnOnce(DocumentError) -> A + Send + 'static,
{
    let documents = Arc::clone(documents);
    Effect::future(async move {
        for write in writes {
            let result = match write.op {
                WriteOp::Set(Ok(data)) => documents.set(write.path.clone(), data).await,
                WriteOp::Set(Err(e)) => Err(e),
                WriteOp::Delete => documents.delete(write.path.clone()).await.map(|_| ()),
            };

            if let Err(error) = result {
                tracing::error!(path = %write.path, %error, "Document write failed");
                MarketplaceMetrics::record_effect_failure();
                return Some(on_failure(error));
            }
            tracing::debug!(path = %write.path, "Document written");
        }
        Some(on_success)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use eventhaiti_testing::InMemoryDocumentStore;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    enum Outcome {
        Saved,
        Failed(DocumentError),
    }

    async fn run(effect: Effect<Outcome>) -> Outcome {
        match effect {
            Effect::Future(future) => future.await.unwrap(),
            other => panic!("expected a future effect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn writes_apply_in_order() {
        let memory = InMemoryDocumentStore::new();
        let store: Arc<dyn DocumentStore> = Arc::new(memory.clone());
        let path = DocumentPath::new("events", "e1");

        let effect = write_documents(
            &store,
            vec![
                DocumentWrite::set(path.clone(), &json!({ "title": "first" })),
                DocumentWrite::set(path.clone(), &json!({ "title": "second" })),
            ],
            Outcome::Saved,
            Outcome::Failed,
        );

        assert_eq!(run(effect).await, Outcome::Saved);
        assert_eq!(memory.raw(&path).unwrap()["title"], "second");
    }

    #[tokio::test]
    async fn deletes_are_applied() {
        let memory = InMemoryDocumentStore::new();
        let path = DocumentPath::nested("events", "e1", "members", "u1");
        memory.insert(&path, json!({}));
        let store: Arc<dyn DocumentStore> = Arc::new(memory.clone());

        let effect = write_documents(&store, vec![DocumentWrite::delete(path.clone())], Outcome::Saved, Outcome::Failed);

        assert_eq!(run(effect).await, Outcome::Saved);
        assert!(memory.raw(&path).is_none());
    }

    #[tokio::test]
    async fn failures_are_reported() {
        let memory = InMemoryDocumentStore::new();
        memory.fail_writes(true);
        let store: Arc<dyn DocumentStore> = Arc::new(memory);

        let effect = write_documents(
            &store,
            vec![DocumentWrite::set(DocumentPath::new("events", "e1"), &json!({}))],
            Outcome::Saved,
            Outcome::Failed,
        );

        assert!(matches!(run(effect).await, Outcome::Failed(DocumentError::Database(_))));
    }
}

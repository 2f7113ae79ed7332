//! `PostgreSQL` document store for EventHaiti.
//!
//! Implements [`DocumentStore`] over a single `documents` table holding
//! JSONB bodies keyed by `(collection, doc_id)`:
//!
//! ```sql
//! CREATE TABLE documents (
//!     collection TEXT NOT NULL,
//!     doc_id TEXT NOT NULL,
//!     data JSONB NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     PRIMARY KEY (collection, doc_id)
//! );
//! ```
//!
//! Writes are upserts: the last write to a document wins.
//!
//! # Example
//!
//! ```ignore
//! use eventhaiti_postgres::{PoolSettings, PostgresDocumentStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresDocumentStore::connect("postgres://localhost/eventhaiti", &PoolSettings::default()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use eventhaiti_core::documents::{
    DocumentError, DocumentFuture, DocumentPath, DocumentStore, StoredDocument,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Connection pool sizing.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Upper bound on open connections
    pub max_connections: u32,
    /// Connections kept open when idle
    pub min_connections: u32,
    /// How long to wait for a free connection
    pub connect_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

type DocumentRow = (String, String, serde_json::Value, DateTime<Utc>);

fn into_document((collection, id, data, updated_at): DocumentRow) -> StoredDocument {
    StoredDocument {
        path: DocumentPath::new(collection, id),
        data,
        updated_at,
    }
}

fn database_error(operation: &str, e: &sqlx::Error) -> DocumentError {
    tracing::error!(operation, error = %e, "Document store query failed");
    DocumentError::Database(format!("Failed to {operation}: {e}"))
}

/// PostgreSQL-backed document store.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a new connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Database`] if the database is unreachable.
    pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<Self, DocumentError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| DocumentError::Database(format!("Failed to connect: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Create the `documents` table if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), DocumentError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DocumentError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Round-trip a trivial query.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Database`] when the database does not answer.
    pub async fn ping(&self) -> Result<(), DocumentError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| database_error("ping", &e))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl DocumentStore for PostgresDocumentStore {
    fn get(&self, path: DocumentPath) -> DocumentFuture<'_, Option<StoredDocument>> {
        Box::pin(async move {
            let row: Option<DocumentRow> = sqlx::query_as(
                "SELECT collection, doc_id, data, updated_at FROM documents
                 WHERE collection = $1 AND doc_id = $2",
            )
            .bind(path.collection())
            .bind(path.id())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| database_error("get document", &e))?;

            Ok(row.map(into_document))
        })
    }

    fn set(&self, path: DocumentPath, data: serde_json::Value) -> DocumentFuture<'_, ()> {
        Box::pin(async move {
            path.validate()?;
            sqlx::query(
                "INSERT INTO documents (collection, doc_id, data, updated_at)
                 VALUES ($1, $2, $3, now())
                 ON CONFLICT (collection, doc_id) DO UPDATE
                 SET data = EXCLUDED.data, updated_at = now()",
            )
            .bind(path.collection())
            .bind(path.id())
            .bind(&data)
            .execute(&self.pool)
            .await
            .map_err(|e| database_error("set document", &e))?;

            tracing::debug!(%path, "Document written");
            Ok(())
        })
    }

    fn delete(&self, path: DocumentPath) -> DocumentFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND doc_id = $2")
                .bind(path.collection())
                .bind(path.id())
                .execute(&self.pool)
                .await
                .map_err(|e| database_error("delete document", &e))?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn list(&self, collection: String) -> DocumentFuture<'_, Vec<StoredDocument>> {
        Box::pin(async move {
            let rows: Vec<DocumentRow> = sqlx::query_as(
                "SELECT collection, doc_id, data, updated_at FROM documents
                 WHERE collection = $1 ORDER BY doc_id",
            )
            .bind(&collection)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error("list documents", &e))?;

            Ok(rows.into_iter().map(into_document).collect())
        })
    }

    fn query(
        &self,
        collection: String,
        field: String,
        value: serde_json::Value,
    ) -> DocumentFuture<'_, Vec<StoredDocument>> {
        Box::pin(async move {
            let rows: Vec<DocumentRow> = sqlx::query_as(
                "SELECT collection, doc_id, data, updated_at FROM documents
                 WHERE collection = $1 AND data -> $2 = $3
                 ORDER BY doc_id",
            )
            .bind(&collection)
            .bind(&field)
            .bind(&value)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error("query documents", &e))?;

            Ok(rows.into_iter().map(into_document).collect())
        })
    }
}

//! Axum integration for the EventHaiti backend.
//!
//! Implements the imperative shell around the marketplace reducers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Imperative Shell (Axum)         │  ← HTTP, JSON, multipart
//! │  - Identity extraction                  │  ← Bearer, X-Firebase-Token, __session
//! │  - Response serialization               │  ← Logging, metrics
//! ├─────────────────────────────────────────┤
//! │         Functional Core                 │
//! │  - Marketplace reducers                 │  ← Testable at memory speed
//! │  - Effect descriptions (values)         │  ← Document and file I/O
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Request Flow
//!
//! 1. **Identify** the caller ([`AuthenticatedUser`] / [`AdminUser`])
//! 2. **Load** the documents the action touches
//! 3. **Dispatch** the action through a `Store`
//! 4. **Map** the state's `last_error` or result to an HTTP response

#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod identity;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{ClientIp, CorrelationId};
pub use identity::{
    AdminUser, AuthenticatedUser, FIREBASE_TOKEN_HEADER, Identity, IdentityError, IdentityVerifier,
    SESSION_COOKIE,
};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

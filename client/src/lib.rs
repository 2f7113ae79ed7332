//! # EventHaiti Backend Client
//!
//! Rust client for the EventHaiti REST API with ID-token auth, session
//! cookie fallback and typed endpoint calls.
//!
//! ## Example
//!
//! ```no_run
//! use eventhaiti_client::{BackendClient, StaticTokenSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tokens = Arc::new(StaticTokenSource::signed_in("user_1", "<id_token>"));
//!     let client = BackendClient::new("http://localhost:8080", tokens);
//!
//!     let verification = client.get_verification().await?;
//!     println!("{}% complete", verification.completion_percentage);
//!     Ok(())
//! }
//! ```
//!
//! ## Auth
//!
//! Every call waits (up to 1.5 s) for the [`TokenSource`] to resolve, then
//! sends `Authorization: Bearer` plus `X-Firebase-Token`. A 401 triggers one
//! retry with a force-refreshed token, then one retry with a `__session`
//! cookie minted from that token.

pub mod api;
pub mod client;
pub mod error;
pub mod tokens;

// Re-export main types for convenience
pub use client::{AUTH_WAIT, BackendClient, FilePart, MultipartBody, RequestBody};
pub use error::ClientError;
pub use tokens::{StaticTokenSource, TokenFuture, TokenSource};

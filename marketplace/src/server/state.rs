//! Application state for the EventHaiti HTTP server.
//!
//! Contains all shared resources needed by HTTP handlers:
//! - Document and file stores
//! - Clock, id and secret generators (injected into reducer environments)
//! - SMS and push delivery
//! - Token service (identity verification and session cookies)

use crate::auth::JwtService;
use crate::earnings::PayoutPolicy;
use crate::push::PushNotifier;
use crate::secrets::SecretGenerator;
use crate::sms::SmsSender;
use axum::extract::FromRef;
use eventhaiti_core::documents::DocumentStore;
use eventhaiti_core::environment::{Clock, IdGenerator};
use eventhaiti_core::files::FileStore;
use eventhaiti_web::IdentityVerifier;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via `Arc`) for each request. Handlers build a fresh
/// reducer environment from it and run one `Store` per request.
#[derive(Clone)]
pub struct AppState {
    /// Document database
    pub documents: Arc<dyn DocumentStore>,
    /// Uploaded files
    pub files: Arc<dyn FileStore>,
    /// Timestamps
    pub clock: Arc<dyn Clock>,
    /// Document ids
    pub ids: Arc<dyn IdGenerator>,
    /// Invite tokens and phone codes
    pub secrets: Arc<dyn SecretGenerator>,
    /// Phone verification delivery
    pub sms: Arc<dyn SmsSender>,
    /// Push delivery
    pub push: Arc<dyn PushNotifier>,
    /// ID tokens and session cookies
    pub jwt: Arc<JwtService>,
    /// Withdrawal limits
    pub policy: PayoutPolicy,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        files: Arc<dyn FileStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        secrets: Arc<dyn SecretGenerator>,
        sms: Arc<dyn SmsSender>,
        push: Arc<dyn PushNotifier>,
        jwt: Arc<JwtService>,
        policy: PayoutPolicy,
    ) -> Self {
        Self {
            documents,
            files,
            clock,
            ids,
            secrets,
            sms,
            push,
            jwt,
            policy,
        }
    }
}

// Lets `AuthenticatedUser` and `AdminUser` find the verifier
impl FromRef<AppState> for Arc<dyn IdentityVerifier> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.jwt.clone()
    }
}

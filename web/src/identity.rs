//! Caller identity extraction.
//!
//! Requests authenticate with an ID token, sent either as
//! `Authorization: Bearer <token>` or `X-Firebase-Token: <token>`, or with
//! a `__session` cookie minted by the session endpoint. Token checking is
//! delegated to an [`IdentityVerifier`] pulled out of the router state via
//! [`FromRef`].
//!
//! # Example
//!
//! ```ignore
//! async fn my_earnings(
//!     AuthenticatedUser(identity): AuthenticatedUser,
//!     State(state): State<AppState>,
//! ) -> Result<Json<Earnings>, AppError> {
//!     tracing::info!(uid = %identity.uid, "Loading earnings");
//!     // ...
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use std::sync::Arc;
use thiserror::Error;

/// Header carrying the raw ID token alongside `Authorization`.
pub const FIREBASE_TOKEN_HEADER: &str = "X-Firebase-Token";

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "__session";

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user id.
    pub uid: String,
    /// Whether the caller holds the admin claim.
    pub is_admin: bool,
}

/// Why a credential was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// No credential was presented.
    #[error("Authentication required")]
    Missing,

    /// The credential is past its expiry.
    #[error("Token expired")]
    Expired,

    /// Bad signature, wrong issuer, or malformed token.
    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// Checks ID tokens and session cookies.
pub trait IdentityVerifier: Send + Sync {
    /// Verify a short-lived ID token.
    ///
    /// # Errors
    ///
    /// [`IdentityError::Expired`] or [`IdentityError::Invalid`].
    fn verify_id_token(&self, token: &str) -> Result<Identity, IdentityError>;

    /// Verify a session cookie value.
    ///
    /// # Errors
    ///
    /// [`IdentityError::Expired`] or [`IdentityError::Invalid`].
    fn verify_session_cookie(&self, cookie: &str) -> Result<Identity, IdentityError>;
}

/// Credential found on a request, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Token from `Authorization: Bearer` or `X-Firebase-Token`.
    IdToken(String),
    /// Value of the `__session` cookie.
    SessionCookie(String),
}

/// Pick the credential to check: bearer token, then `X-Firebase-Token`,
/// then the session cookie.
#[must_use]
pub fn credential_from_headers(headers: &HeaderMap) -> Option<Credential> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(Credential::IdToken(token.to_string()));
    }

    let firebase = headers
        .get(FIREBASE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = firebase {
        return Some(Credential::IdToken(token.to_string()));
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| Credential::SessionCookie(value.to_string()))
}

fn verify(verifier: &dyn IdentityVerifier, headers: &HeaderMap) -> Result<Identity, AppError> {
    let credential = credential_from_headers(headers).ok_or(IdentityError::Missing);
    let result = credential.and_then(|credential| match credential {
        Credential::IdToken(token) => verifier.verify_id_token(&token),
        Credential::SessionCookie(cookie) => verifier.verify_session_cookie(&cookie),
    });

    result.map_err(|e| {
        tracing::debug!(error = %e, "Rejected credential");
        AppError::unauthorized(e.to_string())
    })
}

/// Extractor for any signed-in caller. Rejects with 401.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn IdentityVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<dyn IdentityVerifier>::from_ref(state);
        verify(verifier.as_ref(), &parts.headers).map(Self)
    }
}

/// Extractor for callers with the admin claim. Rejects with 401 or 403.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    Arc<dyn IdentityVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<dyn IdentityVerifier>::from_ref(state);
        let identity = verify(verifier.as_ref(), &parts.headers)?;
        if !identity.is_admin {
            return Err(AppError::forbidden("Admin access required"));
        }
        Ok(Self(identity))
    }
}

//! Sources of ID tokens.

use crate::error::ClientError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Boxed future returned by [`TokenSource`] methods.
pub type TokenFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where the client gets the signed-in user's ID token.
///
/// Mobile apps back this with their auth SDK; tests and scripts use
/// [`StaticTokenSource`].
pub trait TokenSource: Send + Sync {
    /// Resolves once the auth state is known, with the user id when signed in.
    fn current_user(&self) -> TokenFuture<'_, Option<String>>;

    /// ID token of the current user. `force_refresh` skips any cached token.
    fn id_token(&self, force_refresh: bool) -> TokenFuture<'_, Result<String, ClientError>>;
}

/// Fixed user and tokens.
///
/// The first call returns `token`; forced refreshes return `refreshed`
/// when set. Counts refreshes so tests can assert on them.
#[derive(Debug, Default)]
pub struct StaticTokenSource {
    user: Option<String>,
    token: String,
    refreshed: Option<String>,
    refreshes: AtomicUsize,
}

impl StaticTokenSource {
    /// A signed-in user with a token that never changes.
    #[must_use]
    pub fn signed_in(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            token: token.into(),
            ..Self::default()
        }
    }

    /// No user.
    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Token handed out on forced refresh.
    #[must_use]
    pub fn with_refreshed(mut self, token: impl Into<String>) -> Self {
        self.refreshed = Some(token.into());
        self
    }

    /// Number of forced refreshes so far.
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl TokenSource for StaticTokenSource {
    fn current_user(&self) -> TokenFuture<'_, Option<String>> {
        Box::pin(async move { self.user.clone() })
    }

    fn id_token(&self, force_refresh: bool) -> TokenFuture<'_, Result<String, ClientError>> {
        Box::pin(async move {
            if self.user.is_none() {
                return Err(ClientError::Token("no signed-in user".to_string()));
            }
            if force_refresh {
                self.refreshes.fetch_add(1, Ordering::SeqCst);
                if let Some(token) = &self.refreshed {
                    return Ok(token.clone());
                }
            }
            Ok(self.token.clone())
        })
    }
}

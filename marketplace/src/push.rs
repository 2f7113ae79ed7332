//! Expo push notifications.
//!
//! Devices register their Expo push token on the user document. Notifications
//! are best effort: [`notify_user`] logs delivery failures and never returns
//! them.

use crate::types::{UserId, collections};
use eventhaiti_core::documents::{self, DocumentError, DocumentPath, DocumentStore};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Expo accepts at most this many messages per request.
pub const MAX_BATCH: usize = 100;

/// Public Expo push endpoint host.
pub const EXPO_API_URL: &str = "https://exp.host";

/// Boxed future returned by [`PushNotifier::send`].
pub type PushFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PushError>> + Send + 'a>>;

/// Push delivery and registration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// Not an Expo push token.
    #[error("Invalid Expo push token")]
    InvalidToken,

    /// HTTP request failed.
    #[error("Push request failed: {0}")]
    RequestFailed(String),

    /// Expo refused the request or some tickets.
    #[error("Expo push error (status {status}): {message}")]
    Provider {
        /// HTTP status code
        status: u16,
        /// Error body or ticket errors
        message: String,
    },

    /// User document could not be read or written.
    #[error(transparent)]
    Storage(#[from] DocumentError),
}

/// Whether `token` looks like `ExponentPushToken[...]` or `ExpoPushToken[...]`.
#[must_use]
pub fn is_expo_push_token(token: &str) -> bool {
    ["ExponentPushToken[", "ExpoPushToken["].iter().any(|prefix| {
        token
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(']'))
            .is_some_and(|inner| !inner.is_empty() && !inner.contains(['[', ']']))
    })
}

// ============================================================================
// User documents
// ============================================================================

/// `users/{userId}`, restricted to the fields this backend manages.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    /// Registered Expo tokens
    #[serde(default)]
    pub push_tokens: Vec<String>,
    /// Profile fields owned by other writers
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserDocument {
    /// Document path.
    #[must_use]
    pub fn path(user: &UserId) -> DocumentPath {
        DocumentPath::new(collections::USERS, user.as_str())
    }
}

/// Add `token` to `user`'s devices. Returns `false` when it was already known.
///
/// # Errors
///
/// [`PushError::InvalidToken`] and store failures.
pub async fn register_push_token(store: &dyn DocumentStore, user: &UserId, token: &str) -> Result<bool, PushError> {
    let token = token.trim();
    if !is_expo_push_token(token) {
        return Err(PushError::InvalidToken);
    }

    let path = UserDocument::path(user);
    let mut doc: UserDocument = documents::load(store, &path).await?.unwrap_or_default();
    if doc.push_tokens.iter().any(|t| t == token) {
        return Ok(false);
    }
    doc.push_tokens.push(token.to_string());
    documents::save(store, &path, &doc).await?;
    tracing::info!(%user, devices = doc.push_tokens.len(), "Push token registered");
    Ok(true)
}

// ============================================================================
// Delivery
// ============================================================================

/// Notification content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushMessage {
    /// Title line
    pub title: String,
    /// Body text
    pub body: String,
    /// Payload for the app, usually a deep link
    pub data: serde_json::Value,
}

impl PushMessage {
    /// Message with a `url` payload the app opens on tap.
    #[must_use]
    pub fn with_link(title: impl Into<String>, body: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: serde_json::json!({ "url": url.into() }),
        }
    }
}

/// Delivers notifications to device tokens.
pub trait PushNotifier: Send + Sync {
    /// Send `message` to every token.
    fn send(&self, tokens: Vec<String>, message: PushMessage) -> PushFuture<'_>;
}

/// Drops every notification. Used when push is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPushNotifier;

impl PushNotifier for DisabledPushNotifier {
    fn send(&self, tokens: Vec<String>, message: PushMessage) -> PushFuture<'_> {
        Box::pin(async move {
            tracing::debug!(devices = tokens.len(), title = %message.title, "Push disabled, notification dropped");
            Ok(())
        })
    }
}

#[derive(Debug, Serialize)]
struct ExpoMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a serde_json::Value,
    sound: &'static str,
}

#[derive(Debug, Deserialize)]
struct ExpoResponse {
    #[serde(default)]
    data: Vec<ExpoTicket>,
}

#[derive(Debug, Deserialize)]
struct ExpoTicket {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the Expo push API.
#[derive(Clone)]
pub struct ExpoPushClient {
    client: Client,
    access_token: Option<String>,
    api_url: String,
}

impl ExpoPushClient {
    /// Client against the public Expo API. The access token raises rate limits.
    #[must_use]
    pub fn new(access_token: Option<String>) -> Self {
        Self::with_api_url(access_token, EXPO_API_URL)
    }

    /// Client against another base URL (tests, proxies).
    #[must_use]
    pub fn with_api_url(access_token: Option<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            access_token,
            api_url: api_url.into(),
        }
    }

    async fn send_batch(&self, tokens: &[String], message: &PushMessage) -> Result<(), PushError> {
        let batch: Vec<ExpoMessage<'_>> = tokens
            .iter()
            .map(|to| ExpoMessage {
                to,
                title: &message.title,
                body: &message.body,
                data: &message.data,
                sound: "default",
            })
            .collect();

        let mut request = self.client.post(format!("{}/--/api/v2/push/send", self.api_url)).json(&batch);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| PushError::RequestFailed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PushError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ExpoResponse = response
            .json()
            .await
            .map_err(|e| PushError::RequestFailed(e.to_string()))?;
        let failures: Vec<String> = parsed
            .data
            .into_iter()
            .filter(|ticket| ticket.status == "error")
            .map(|ticket| ticket.message.unwrap_or_else(|| "unknown error".to_string()))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PushError::Provider {
                status: status.as_u16(),
                message: failures.join("; "),
            })
        }
    }
}

impl PushNotifier for ExpoPushClient {
    fn send(&self, tokens: Vec<String>, message: PushMessage) -> PushFuture<'_> {
        Box::pin(async move {
            let mut first_error = None;
            for chunk in tokens.chunks(MAX_BATCH) {
                if let Err(e) = self.send_batch(chunk, &message).await {
                    tracing::warn!(devices = chunk.len(), error = %e, "Expo push batch failed");
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }
}

/// Send `message` to every device of `user`. Failures are logged only.
pub async fn notify_user(store: &dyn DocumentStore, notifier: &dyn PushNotifier, user: &UserId, message: PushMessage) {
    let doc: Option<UserDocument> = match documents::load(store, &UserDocument::path(user)).await {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(%user, error = %e, "Could not load push tokens");
            return;
        },
    };
    let tokens = doc.map(|d| d.push_tokens).unwrap_or_default();
    if tokens.is_empty() {
        tracing::debug!(%user, "No push devices registered");
        return;
    }

    match notifier.send(tokens, message).await {
        Ok(()) => tracing::debug!(%user, "Push notification sent"),
        Err(e) => tracing::warn!(%user, error = %e, "Push notification failed"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use eventhaiti_testing::InMemoryDocumentStore;
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "ExponentPushToken[xxxxxxxxxxxxxxxxxxxxxx]";

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(Vec<String>, PushMessage)>>,
    }

    impl PushNotifier for RecordingNotifier {
        fn send(&self, tokens: Vec<String>, message: PushMessage) -> PushFuture<'_> {
            self.sent.lock().unwrap().push((tokens, message));
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn token_format() {
        assert!(is_expo_push_token(TOKEN));
        assert!(is_expo_push_token("ExpoPushToken[abc]"));
        for bad in ["", "ExponentPushToken[]", "ExponentPushToken[abc", "fcm:abc", "ExpoPushToken[a]b]"] {
            assert!(!is_expo_push_token(bad), "{bad}");
        }
    }

    #[tokio::test]
    async fn registration_deduplicates_and_keeps_profile_fields() {
        let store = InMemoryDocumentStore::new();
        let user = UserId::new("u_1");
        store.insert(&UserDocument::path(&user), serde_json::json!({ "displayName": "Ti Jo" }));

        assert!(register_push_token(&store, &user, TOKEN).await.unwrap());
        assert!(!register_push_token(&store, &user, &format!(" {TOKEN} ")).await.unwrap());
        assert_eq!(
            register_push_token(&store, &user, "apns-token").await.unwrap_err(),
            PushError::InvalidToken
        );

        let raw = store.raw(&UserDocument::path(&user)).unwrap();
        assert_eq!(raw["pushTokens"], serde_json::json!([TOKEN]));
        assert_eq!(raw["displayName"], "Ti Jo");
    }

    #[tokio::test]
    async fn notify_user_skips_users_without_devices() {
        let store = InMemoryDocumentStore::new();
        let notifier = RecordingNotifier::default();
        let message = PushMessage::with_link("Hi", "there", "eventhaiti://event/e1");

        notify_user(&store, &notifier, &UserId::new("nobody"), message.clone()).await;
        assert!(notifier.sent.lock().unwrap().is_empty());

        register_push_token(&store, &UserId::new("u_1"), TOKEN).await.unwrap();
        notify_user(&store, &notifier, &UserId::new("u_1"), message.clone()).await;
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, vec![TOKEN.to_string()]);
        assert_eq!(sent[0].1.data["url"], "eventhaiti://event/e1");
    }

    #[tokio::test]
    async fn expo_client_posts_messages_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/--/api/v2/push/send"))
            .and(header("authorization", "Bearer expo-secret"))
            .and(body_partial_json(serde_json::json!([{ "to": TOKEN, "title": "Payout approved" }])))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "status": "ok", "id": "ticket-1" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ExpoPushClient::with_api_url(Some("expo-secret".to_string()), server.uri());
        client
            .send(
                vec![TOKEN.to_string()],
                PushMessage::with_link("Payout approved", "Your bank account is verified", "eventhaiti://payouts"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expo_ticket_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "status": "error", "message": "DeviceNotRegistered" }]
            })))
            .mount(&server)
            .await;

        let client = ExpoPushClient::with_api_url(None, server.uri());
        let err = client
            .send(vec![TOKEN.to_string()], PushMessage::with_link("a", "b", "c"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PushError::Provider {
                status: 200,
                message: "DeviceNotRegistered".to_string()
            }
        );
    }
}

//! Backend client implementation

use crate::error::ClientError;
use crate::tokens::TokenSource;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How long a call waits for the token source to report the auth state.
pub const AUTH_WAIT: Duration = Duration::from_millis(1500);

const FIREBASE_TOKEN_HEADER: &str = "X-Firebase-Token";
const SESSION_COOKIE: &str = "__session";
const SESSION_PATH: &str = "/api/auth/session";

/// Body of a backend call. Kept rebuildable so a call can be retried.
#[derive(Clone, Debug, Default)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// JSON body
    Json(serde_json::Value),
    /// `multipart/form-data` body
    Multipart(MultipartBody),
}

/// A file inside a multipart body.
#[derive(Clone)]
pub struct FilePart {
    /// Original file name
    pub file_name: String,
    /// MIME type
    pub content_type: String,
    /// Contents
    pub bytes: Vec<u8>,
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Text fields plus an optional `file` part.
#[derive(Clone, Debug, Default)]
pub struct MultipartBody {
    /// Text fields in order
    pub fields: Vec<(String, String)>,
    /// The `file` part
    pub file: Option<FilePart>,
}

impl MultipartBody {
    /// Empty form.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Attach the file.
    #[must_use]
    pub fn file(mut self, file: FilePart) -> Self {
        self.file = Some(file);
        self
    }

    fn to_form(&self) -> Result<Form, ClientError> {
        let mut form = Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        if let Some(file) = &self.file {
            let part = Part::bytes(file.bytes.clone())
                .file_name(file.file_name.clone())
                .mime_str(&file.content_type)
                .map_err(|e| ClientError::Network {
                    message: format!("Invalid content type {}: {e}", file.content_type),
                    hint: None,
                })?;
            form = form.part("file", part);
        }
        Ok(form)
    }
}

/// EventHaiti backend client
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
    session: Arc<Mutex<Option<String>>>,
    auth_wait: Duration,
}

impl fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.base_url)
            .field("auth_wait", &self.auth_wait)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Create a client for the backend at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            session: Arc::new(Mutex::new(None)),
            auth_wait: AUTH_WAIT,
        }
    }

    /// Override the auth-state wait.
    #[must_use]
    pub const fn with_auth_wait(mut self, wait: Duration) -> Self {
        self.auth_wait = wait;
        self
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn tokens(&self) -> &dyn TokenSource {
        self.tokens.as_ref()
    }

    /// `__session=...` pair held for cookie auth, if any.
    pub async fn session_cookie(&self) -> Option<String> {
        self.session.lock().await.clone()
    }

    /// Forget the held session cookie.
    pub async fn clear_session(&self) {
        *self.session.lock().await = None;
    }

    /// Call the backend with auth headers and the 401 retry chain.
    ///
    /// 1. Wait up to [`AUTH_WAIT`] for the auth state; attach the ID token
    ///    (`Authorization` and `X-Firebase-Token`) when signed in, plus the
    ///    session cookie when one is held.
    /// 2. On 401, force-refresh the token and retry once.
    /// 3. On another 401, mint a session cookie and retry once more.
    ///
    /// # Errors
    ///
    /// Transport failures, token failures and non-2xx responses.
    #[tracing::instrument(skip(self, body), fields(method = %method))]
    pub async fn backend_fetch(&self, method: Method, path: &str, body: RequestBody) -> Result<Response, ClientError> {
        let user = self.wait_for_user().await;
        let token = match &user {
            Some(_) => Some(self.tokens.id_token(false).await?),
            None => None,
        };

        let response = self.send(&method, path, &body, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED || user.is_none() {
            return Self::check(response).await;
        }

        tracing::debug!("Unauthorized, retrying with a refreshed token");
        let refreshed = self.tokens.id_token(true).await?;
        let response = self.send(&method, path, &body, Some(&refreshed)).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check(response).await;
        }

        tracing::debug!("Still unauthorized, retrying with a session cookie");
        self.create_session(&refreshed).await?;
        let response = self.send(&method, path, &body, Some(&refreshed)).await?;
        Self::check(response).await
    }

    /// [`backend_fetch`](Self::backend_fetch) and decode the JSON body.
    ///
    /// # Errors
    ///
    /// As `backend_fetch`, plus bodies that do not decode as `T`.
    pub async fn backend_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<T, ClientError> {
        let response = self.backend_fetch(method, path, body).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::ResponseParseFailed(e.to_string()))
    }

    /// Exchange `id_token` for a `__session` cookie and keep it.
    ///
    /// # Errors
    ///
    /// Transport failures, refusals, and responses without the cookie.
    pub async fn create_session(&self, id_token: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(format!("{}{SESSION_PATH}", self.base_url))
            .bearer_auth(id_token)
            .header(FIREBASE_TOKEN_HEADER, id_token)
            .json(&serde_json::json!({ "idToken": id_token }))
            .send()
            .await
            .map_err(|e| ClientError::network(&e))?;
        let response = Self::check(response).await?;

        let cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .map(str::trim)
            .find(|pair| pair.strip_prefix(SESSION_COOKIE).is_some_and(|rest| rest.starts_with('=')))
            .map(str::to_string)
            .ok_or_else(|| ClientError::ResponseParseFailed("session response had no __session cookie".to_string()))?;

        *self.session.lock().await = Some(cookie);
        tracing::debug!("Session cookie stored");
        Ok(())
    }

    async fn wait_for_user(&self) -> Option<String> {
        match tokio::time::timeout(self.auth_wait, self.tokens.current_user()).await {
            Ok(user) => user,
            Err(_) => {
                tracing::debug!(wait_ms = self.auth_wait.as_millis(), "Auth state unresolved, sending without a token");
                None
            },
        }
    }

    async fn send(
        &self,
        method: &Method,
        path: &str,
        body: &RequestBody,
        token: Option<&str>,
    ) -> Result<Response, ClientError> {
        let mut request = self.client.request(method.clone(), format!("{}{path}", self.base_url));
        if let Some(token) = token {
            request = request.bearer_auth(token).header(FIREBASE_TOKEN_HEADER, token);
        }
        if let Some(cookie) = self.session_cookie().await {
            request = request.header(COOKIE, cookie);
        }
        request = match body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(value),
            RequestBody::Multipart(form) => request.multipart(form.to_form()?),
        };
        request.send().await.map_err(|e| ClientError::network(&e))
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::from_response(status.as_u16(), &body))
    }
}

//! Error types for the EventHaiti backend client

use thiserror::Error;

/// Substrings of transport errors that mean the backend was not reachable.
const CONNECTIVITY_HINTS: [&str; 6] = [
    "error sending request",
    "connection refused",
    "dns error",
    "failed to lookup address",
    "network is unreachable",
    "timed out",
];

/// Errors that can occur when calling the backend
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend could not be reached
    #[error("Network request failed: {message}{}", .hint.map(|h| format!(" ({h})")).unwrap_or_default())]
    Network {
        /// Transport error text
        message: String,
        /// Set when the failure looks like a wrong base URL or offline backend
        hint: Option<&'static str>,
    },

    /// Response body could not be parsed
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// The token source could not produce a token
    #[error("Token unavailable: {0}")]
    Token(String),

    /// Backend returned a non-2xx status
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Machine-readable code, when the body had one
        code: Option<String>,
        /// `error` or `message` from the body, else the raw body
        message: String,
        /// Structured context from the body
        details: Option<serde_json::Value>,
    },
}

impl ClientError {
    /// Wrap a transport failure, adding a hint for connectivity problems.
    #[must_use]
    pub fn network(err: &reqwest::Error) -> Self {
        let message = err.to_string();
        let lowered = message.to_ascii_lowercase();
        let unreachable = err.is_connect()
            || err.is_timeout()
            || CONNECTIVITY_HINTS.iter().any(|hint| lowered.contains(hint));
        Self::Network {
            message,
            hint: unreachable.then_some("check your API URL and that the backend is running"),
        }
    }

    /// Build an API error from a status and raw body.
    ///
    /// JSON bodies contribute `error` (or `message`), `code` and `details`.
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let field = |name: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.get(name))
                .and_then(serde_json::Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let message = field("error")
            .or_else(|| field("message"))
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("Request failed with status {status}")
                } else {
                    body.to_string()
                }
            });
        Self::Api {
            status,
            code: field("code"),
            message,
            details: parsed.as_ref().and_then(|v| v.get("details")).cloned(),
        }
    }

    /// HTTP status of an API error. A 401 here means every credential was refused.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

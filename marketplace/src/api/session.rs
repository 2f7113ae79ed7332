//! Session cookie endpoint.
//!
//! - POST /api/auth/session - Exchange an ID token for an HTTP-only `__session` cookie

use crate::server::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use eventhaiti_web::AppError;
use eventhaiti_web::identity::{Credential, credential_from_headers};
use serde::{Deserialize, Serialize};

/// Optional body; the token may come from the auth headers instead.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    /// ID token to exchange
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Response after minting a cookie.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// Always `"ok"`
    pub status: &'static str,
    /// Cookie lifetime in seconds
    pub expires_in: i64,
}

/// Mint a session cookie.
///
/// Reads the ID token from the JSON body, else from `Authorization` /
/// `X-Firebase-Token`. A presented session cookie is not accepted here.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/auth/session \
///   -H "Authorization: Bearer <id_token>"
/// ```
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<SessionRequest>>,
) -> Result<Response, AppError> {
    let from_body = body.and_then(|Json(b)| b.id_token).filter(|t| !t.trim().is_empty());
    let token = match (from_body, credential_from_headers(&headers)) {
        (Some(token), _) | (None, Some(Credential::IdToken(token))) => token,
        _ => return Err(AppError::unauthorized("An ID token is required")),
    };

    let cookie = state.jwt.create_session_cookie(token.trim(), state.clock.now())?;
    let set_cookie = HeaderValue::from_str(&cookie.header_value())
        .map_err(|e| AppError::internal("Could not build session cookie").with_source(e.into()))?;

    let body = SessionResponse {
        status: "ok",
        expires_in: cookie.max_age.num_seconds(),
    };
    Ok(([(header::SET_COOKIE, set_cookie)], Json(body)).into_response())
}

//! Device registration.
//!
//! - POST /api/push/register-expo - Store an Expo push token for the caller

use super::caller;
use crate::push::register_push_token;
use crate::server::state::AppState;
use axum::{Json, extract::State};
use eventhaiti_web::{AppError, AuthenticatedUser};
use serde::{Deserialize, Serialize};

/// Body of a registration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTokenRequest {
    /// `ExponentPushToken[...]`
    pub token: String,
}

/// Result of a registration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTokenResponse {
    /// False when the token was already registered
    pub added: bool,
}

/// Register a device for push notifications.
pub async fn register_expo_token(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<RegisterTokenRequest>,
) -> Result<Json<RegisterTokenResponse>, AppError> {
    let added = register_push_token(state.documents.as_ref(), &caller(&identity), &request.token).await?;
    Ok(Json(RegisterTokenResponse { added }))
}

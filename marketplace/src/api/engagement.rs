//! Follow, favorite and waitlist endpoints.
//!
//! - POST /api/organizers/follow - Toggle following an organizer
//! - POST /api/events/:event_id/favorite - Toggle a favorite
//! - POST /api/waitlist/join - Join an event's waitlist
//! - POST /api/waitlist/leave - Leave it

use super::caller;
use crate::engagement::{self, WaitlistPosition};
use crate::server::state::AppState;
use crate::types::{EventId, UserId};
use axum::{
    Json,
    extract::{Path, State},
};
use eventhaiti_web::{AppError, AuthenticatedUser};
use serde::{Deserialize, Serialize};

/// Body of a follow toggle.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequest {
    /// Organizer to follow or unfollow
    pub organizer_id: UserId,
}

/// Follow state after a toggle.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowResponse {
    /// Whether the caller now follows
    pub following: bool,
    /// Follower count of the organizer
    pub followers: usize,
}

/// Favorite state after a toggle.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteResponse {
    /// Whether the event is now a favorite
    pub favorited: bool,
}

/// Body of a waitlist call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistRequest {
    /// Event
    pub event_id: EventId,
}

/// Result of leaving a waitlist.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveResponse {
    /// False when the caller was not on it
    pub removed: bool,
}

/// Follow an organizer, or unfollow when already following.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/organizers/follow \
///   -H "Authorization: Bearer <id_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"organizerId": "org_1"}'
/// ```
pub async fn toggle_follow(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<FollowRequest>,
) -> Result<Json<FollowResponse>, AppError> {
    let following = engagement::toggle_follow(
        state.documents.as_ref(),
        state.clock.as_ref(),
        &caller(&identity),
        &request.organizer_id,
    )
    .await?;
    let followers = engagement::follower_count(state.documents.as_ref(), &request.organizer_id).await?;
    Ok(Json(FollowResponse { following, followers }))
}

/// Favorite an event, or unfavorite when already a favorite.
pub async fn toggle_favorite(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<FavoriteResponse>, AppError> {
    let favorited =
        engagement::toggle_favorite(state.documents.as_ref(), state.clock.as_ref(), &caller(&identity), &event_id)
            .await?;
    Ok(Json(FavoriteResponse { favorited }))
}

/// Join a waitlist. Joining twice keeps the original place.
pub async fn join_waitlist(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<WaitlistRequest>,
) -> Result<Json<WaitlistPosition>, AppError> {
    let position = engagement::join_waitlist(
        state.documents.as_ref(),
        state.clock.as_ref(),
        &request.event_id,
        &caller(&identity),
    )
    .await?;
    Ok(Json(position))
}

/// Leave a waitlist.
pub async fn leave_waitlist(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<WaitlistRequest>,
) -> Result<Json<LeaveResponse>, AppError> {
    let removed = engagement::leave_waitlist(state.documents.as_ref(), &request.event_id, &caller(&identity)).await?;
    Ok(Json(LeaveResponse { removed }))
}

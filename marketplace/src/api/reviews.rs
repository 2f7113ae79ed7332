//! Event review endpoints.
//!
//! - POST /api/reviews - Create or replace the caller's review
//! - GET /api/reviews?eventId= - Reviews of an event with the average rating

use super::caller;
use crate::reviews::{self, Review, ReviewSummary};
use crate::server::state::AppState;
use crate::types::EventId;
use axum::{
    Json,
    extract::{Query, State},
};
use eventhaiti_web::{AppError, AuthenticatedUser};
use serde::Deserialize;

/// Body of a review.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostReviewRequest {
    /// Reviewed event
    pub event_id: EventId,
    /// 1 to 5
    pub rating: u8,
    /// Optional text
    #[serde(default)]
    pub comment: String,
}

/// Query of a review listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewsQuery {
    /// Event
    pub event_id: EventId,
}

/// Create or replace a review. Only attendees of an ended event may post.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/reviews \
///   -H "Authorization: Bearer <id_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"eventId": "evt_123", "rating": 5, "comment": "Bèl fèt!"}'
/// ```
pub async fn post_review(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<PostReviewRequest>,
) -> Result<Json<Review>, AppError> {
    let review = reviews::post_review(
        state.documents.as_ref(),
        state.clock.as_ref(),
        &request.event_id,
        &caller(&identity),
        request.rating,
        &request.comment,
    )
    .await?;
    Ok(Json(review))
}

/// Reviews of an event. Public.
pub async fn list_reviews(
    State(state): State<AppState>,
    Query(query): Query<ReviewsQuery>,
) -> Result<Json<ReviewSummary>, AppError> {
    Ok(Json(reviews::event_reviews(state.documents.as_ref(), &query.event_id).await?))
}

//! Event reviews.
//!
//! One review per (event, user): posting again overwrites. Only holders of a
//! ticket that was not refunded or voided may review, and only once the event
//! is over.

use crate::types::{EventId, TicketStatus, UserId, collections, load_event, tickets_for_event};
use chrono::{DateTime, Utc};
use eventhaiti_core::documents::{self, DocumentError, DocumentPath, DocumentStore};
use eventhaiti_core::environment::Clock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted comment.
pub const MAX_COMMENT_LEN: usize = 2000;

/// `reviews/{eventId}_{userId}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Reviewed event
    pub event_id: EventId,
    /// Author
    pub user_id: UserId,
    /// 1 to 5
    pub rating: u8,
    /// Optional text
    #[serde(default)]
    pub comment: String,
    /// Last write
    pub updated_at: DateTime<Utc>,
}

impl Review {
    /// Document path of `user`'s review of `event`.
    #[must_use]
    pub fn path(event: &EventId, user: &UserId) -> DocumentPath {
        DocumentPath::new(collections::REVIEWS, format!("{event}_{user}"))
    }
}

/// Reviews of one event with the average rating.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    /// Number of reviews
    pub count: usize,
    /// Mean rating, rounded to one decimal; `None` without reviews
    pub average_rating: Option<f64>,
    /// Newest first
    pub reviews: Vec<Review>,
}

impl ReviewSummary {
    /// Summarize `reviews`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_reviews(mut reviews: Vec<Review>) -> Self {
        reviews.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.user_id.cmp(&b.user_id)));
        let count = reviews.len();
        let average_rating = (count > 0).then(|| {
            let total: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
            (f64::from(total) / count as f64 * 10.0).round() / 10.0
        });
        Self {
            count,
            average_rating,
            reviews,
        }
    }
}

/// Why a review was refused.
#[derive(Error, Debug)]
pub enum ReviewError {
    /// Rating outside 1..=5.
    #[error("Rating must be between 1 and 5")]
    InvalidRating,

    /// Comment too long.
    #[error("Comment must be at most {MAX_COMMENT_LEN} characters")]
    CommentTooLong,

    /// No such event.
    #[error("Event {0} not found")]
    EventNotFound(EventId),

    /// Event still running or upcoming.
    #[error("Reviews open once the event has ended")]
    EventNotEnded,

    /// Caller holds no eligible ticket.
    #[error("Only attendees can review this event")]
    NotAttendee,

    /// Store failure.
    #[error(transparent)]
    Storage(#[from] DocumentError),
}

/// Create or replace `user`'s review of `event`.
///
/// # Errors
///
/// Validation and eligibility failures, then store failures.
#[tracing::instrument(skip_all, fields(%event_id, %user, rating))]
pub async fn post_review(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    event_id: &EventId,
    user: &UserId,
    rating: u8,
    comment: &str,
) -> Result<Review, ReviewError> {
    if !(1..=5).contains(&rating) {
        return Err(ReviewError::InvalidRating);
    }
    let comment = comment.trim();
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(ReviewError::CommentTooLong);
    }

    let now = clock.now();
    let event = load_event(store, event_id)
        .await?
        .ok_or_else(|| ReviewError::EventNotFound(event_id.clone()))?;
    if !event.has_ended(now) {
        return Err(ReviewError::EventNotEnded);
    }

    let attended = tickets_for_event(store, event_id).await?.iter().any(|(_, ticket)| {
        &ticket.attendee_id == user && matches!(ticket.status, TicketStatus::Valid | TicketStatus::CheckedIn)
    });
    if !attended {
        return Err(ReviewError::NotAttendee);
    }

    let review = Review {
        event_id: event_id.clone(),
        user_id: user.clone(),
        rating,
        comment: comment.to_string(),
        updated_at: now,
    };
    documents::save(store, &Review::path(event_id, user), &review).await?;
    tracing::info!("Review saved");
    Ok(review)
}

/// Reviews of `event`.
///
/// # Errors
///
/// Store failures and malformed documents.
pub async fn event_reviews(store: &dyn DocumentStore, event: &EventId) -> Result<ReviewSummary, DocumentError> {
    let found =
        documents::query::<Review>(store, collections::REVIEWS, "eventId", serde_json::json!(event.as_str())).await?;
    Ok(ReviewSummary::from_reviews(found.into_iter().map(|(_, review)| review).collect()))
}

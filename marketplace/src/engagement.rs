//! Follows, favorites and waitlists.
//!
//! Each relation is one document keyed by both ids, so toggling is a
//! read followed by a set or a delete.

use crate::types::{Event, EventId, EventStatus, UserId, collections, load_event};
use chrono::{DateTime, Utc};
use eventhaiti_core::documents::{self, DocumentError, DocumentPath, DocumentStore};
use eventhaiti_core::environment::Clock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an engagement action failed.
#[derive(Error, Debug)]
pub enum EngagementError {
    /// Users cannot follow themselves.
    #[error("You cannot follow yourself")]
    SelfFollow,

    /// No such event.
    #[error("Event {0} not found")]
    EventNotFound(EventId),

    /// The event no longer takes sign-ups.
    #[error("Event {0} is closed")]
    EventClosed(EventId),

    /// Store failure.
    #[error(transparent)]
    Storage(#[from] DocumentError),
}

// ============================================================================
// Follows
// ============================================================================

/// `organizer_follows/{followerId}_{organizerId}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizerFollow {
    /// Who follows
    pub follower_id: UserId,
    /// Who is followed
    pub organizer_id: UserId,
    /// Since when
    pub created_at: DateTime<Utc>,
}

impl OrganizerFollow {
    /// Document path.
    #[must_use]
    pub fn path(follower: &UserId, organizer: &UserId) -> DocumentPath {
        DocumentPath::new(collections::ORGANIZER_FOLLOWS, format!("{follower}_{organizer}"))
    }
}

/// Follow `organizer`, or unfollow when already following. Returns whether
/// `follower` follows afterwards.
///
/// # Errors
///
/// [`EngagementError::SelfFollow`] and store failures.
pub async fn toggle_follow(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    follower: &UserId,
    organizer: &UserId,
) -> Result<bool, EngagementError> {
    if follower == organizer {
        return Err(EngagementError::SelfFollow);
    }
    let path = OrganizerFollow::path(follower, organizer);
    if store.get(path.clone()).await?.is_some() {
        store.delete(path).await?;
        tracing::debug!(%follower, %organizer, "Unfollowed organizer");
        return Ok(false);
    }

    let follow = OrganizerFollow {
        follower_id: follower.clone(),
        organizer_id: organizer.clone(),
        created_at: clock.now(),
    };
    documents::save(store, &path, &follow).await?;
    tracing::debug!(%follower, %organizer, "Followed organizer");
    Ok(true)
}

/// Number of followers of `organizer`.
///
/// # Errors
///
/// Store failures.
pub async fn follower_count(store: &dyn DocumentStore, organizer: &UserId) -> Result<usize, DocumentError> {
    let found = store
        .query(
            collections::ORGANIZER_FOLLOWS.to_string(),
            "organizerId".to_string(),
            serde_json::json!(organizer.as_str()),
        )
        .await?;
    Ok(found.len())
}

// ============================================================================
// Favorites
// ============================================================================

/// `event_favorites/{userId}_{eventId}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFavorite {
    /// Who saved it
    pub user_id: UserId,
    /// Saved event
    pub event_id: EventId,
    /// When
    pub created_at: DateTime<Utc>,
}

impl EventFavorite {
    /// Document path.
    #[must_use]
    pub fn path(user: &UserId, event: &EventId) -> DocumentPath {
        DocumentPath::new(collections::EVENT_FAVORITES, format!("{user}_{event}"))
    }
}

/// Save `event` for `user`, or remove it when already saved. Returns
/// whether it is a favorite afterwards.
///
/// # Errors
///
/// [`EngagementError::EventNotFound`] and store failures.
pub async fn toggle_favorite(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    user: &UserId,
    event: &EventId,
) -> Result<bool, EngagementError> {
    let path = EventFavorite::path(user, event);
    if store.get(path.clone()).await?.is_some() {
        store.delete(path).await?;
        return Ok(false);
    }
    if load_event(store, event).await?.is_none() {
        return Err(EngagementError::EventNotFound(event.clone()));
    }

    let favorite = EventFavorite {
        user_id: user.clone(),
        event_id: event.clone(),
        created_at: clock.now(),
    };
    documents::save(store, &path, &favorite).await?;
    Ok(true)
}

// ============================================================================
// Waitlist
// ============================================================================

/// `event_waitlist/{eventId}_{userId}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistEntry {
    /// Event
    pub event_id: EventId,
    /// Waiting user
    pub user_id: UserId,
    /// Join time; decides the order
    pub joined_at: DateTime<Utc>,
}

impl WaitlistEntry {
    /// Document path.
    #[must_use]
    pub fn path(event: &EventId, user: &UserId) -> DocumentPath {
        DocumentPath::new(collections::EVENT_WAITLIST, format!("{event}_{user}"))
    }
}

/// A user's place on a waitlist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistPosition {
    /// 1-based position
    pub position: usize,
    /// People waiting
    pub total: usize,
    /// False when this call added the user
    pub already_joined: bool,
}

async fn waitlist(store: &dyn DocumentStore, event: &EventId) -> Result<Vec<WaitlistEntry>, DocumentError> {
    let mut entries: Vec<WaitlistEntry> = documents::query::<WaitlistEntry>(
        store,
        collections::EVENT_WAITLIST,
        "eventId",
        serde_json::json!(event.as_str()),
    )
    .await?
    .into_iter()
    .map(|(_, entry)| entry)
    .collect();
    entries.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.user_id.cmp(&b.user_id)));
    Ok(entries)
}

fn position_of(entries: &[WaitlistEntry], user: &UserId, already_joined: bool) -> WaitlistPosition {
    let index = entries.iter().position(|e| &e.user_id == user).unwrap_or(entries.len());
    WaitlistPosition {
        position: index + 1,
        total: entries.len(),
        already_joined,
    }
}

fn ensure_open(event_id: &EventId, event: Option<Event>, now: DateTime<Utc>) -> Result<Event, EngagementError> {
    let event = event.ok_or_else(|| EngagementError::EventNotFound(event_id.clone()))?;
    if event.status == EventStatus::Cancelled || event.has_started(now) {
        return Err(EngagementError::EventClosed(event_id.clone()));
    }
    Ok(event)
}

/// Put `user` on the waitlist of `event`. Joining twice keeps the
/// original place.
///
/// # Errors
///
/// Unknown or closed events, and store failures.
pub async fn join_waitlist(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    event: &EventId,
    user: &UserId,
) -> Result<WaitlistPosition, EngagementError> {
    let now = clock.now();
    ensure_open(event, load_event(store, event).await?, now)?;

    let path = WaitlistEntry::path(event, user);
    let already_joined = store.get(path.clone()).await?.is_some();
    if !already_joined {
        let entry = WaitlistEntry {
            event_id: event.clone(),
            user_id: user.clone(),
            joined_at: now,
        };
        documents::save(store, &path, &entry).await?;
        tracing::info!(%event, %user, "Joined waitlist");
    }

    let entries = waitlist(store, event).await?;
    Ok(position_of(&entries, user, already_joined))
}

/// Take `user` off the waitlist. Returns whether they were on it.
///
/// # Errors
///
/// Store failures.
pub async fn leave_waitlist(store: &dyn DocumentStore, event: &EventId, user: &UserId) -> Result<bool, DocumentError> {
    store.delete(WaitlistEntry::path(event, user)).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::TicketTier;
    use chrono::Duration;
    use eventhaiti_testing::{FixedClock, InMemoryDocumentStore, test_clock};

    fn seed_event(store: &InMemoryDocumentStore, id: &str, status: EventStatus) {
        let now = test_clock().now();
        let event = Event {
            organizer_id: UserId::new("org_1"),
            title: "Festival".to_string(),
            description: String::new(),
            category: String::new(),
            venue: "Plage".to_string(),
            city: "Cap-Haïtien".to_string(),
            address: String::new(),
            country: "HT".to_string(),
            start_at: now + Duration::days(3),
            end_at: now + Duration::days(4),
            ticket_tiers: vec![TicketTier {
                name: "GA".to_string(),
                price_cents: crate::types::Cents::new(1000),
                quantity: 10,
            }],
            status,
            created_at: now,
        };
        store.insert(&Event::path(&EventId::new(id)), serde_json::to_value(event).unwrap());
    }

    #[tokio::test]
    async fn follow_toggles_and_counts() {
        let store = InMemoryDocumentStore::new();
        let clock = test_clock();
        let fan = UserId::new("fan");
        let org = UserId::new("org_1");

        assert!(toggle_follow(&store, &clock, &fan, &org).await.unwrap());
        assert_eq!(follower_count(&store, &org).await.unwrap(), 1);
        assert!(store.raw(&OrganizerFollow::path(&fan, &org)).is_some());

        assert!(!toggle_follow(&store, &clock, &fan, &org).await.unwrap());
        assert_eq!(follower_count(&store, &org).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn self_follow_is_refused() {
        let store = InMemoryDocumentStore::new();
        let me = UserId::new("org_1");
        let err = toggle_follow(&store, &test_clock(), &me, &me).await.unwrap_err();
        assert!(matches!(err, EngagementError::SelfFollow));
    }

    #[tokio::test]
    async fn favorites_need_an_existing_event() {
        let store = InMemoryDocumentStore::new();
        let clock = test_clock();
        let fan = UserId::new("fan");

        let err = toggle_favorite(&store, &clock, &fan, &EventId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, EngagementError::EventNotFound(_)));

        seed_event(&store, "evt_1", EventStatus::Published);
        assert!(toggle_favorite(&store, &clock, &fan, &EventId::new("evt_1")).await.unwrap());
        assert!(!toggle_favorite(&store, &clock, &fan, &EventId::new("evt_1")).await.unwrap());
        assert_eq!(store.count(collections::EVENT_FAVORITES), 0);
    }

    #[tokio::test]
    async fn waitlist_positions_follow_join_order() {
        let store = InMemoryDocumentStore::new();
        seed_event(&store, "evt_1", EventStatus::Published);
        let event = EventId::new("evt_1");
        let first_clock = test_clock();
        let later_clock = first_clock.advanced(Duration::minutes(5));

        // "zed" joins first even though "amy" sorts before it
        let zed = join_waitlist(&store, &first_clock, &event, &UserId::new("zed")).await.unwrap();
        let amy = join_waitlist(&store, &later_clock, &event, &UserId::new("amy")).await.unwrap();
        assert_eq!(zed.position, 1);
        assert_eq!(amy.position, 2);
        assert_eq!(amy.total, 2);

        let again = join_waitlist(&store, &later_clock, &event, &UserId::new("zed")).await.unwrap();
        assert_eq!(
            again,
            WaitlistPosition {
                position: 1,
                total: 2,
                already_joined: true
            }
        );

        assert!(leave_waitlist(&store, &event, &UserId::new("zed")).await.unwrap());
        let amy = join_waitlist(&store, &later_clock, &event, &UserId::new("amy")).await.unwrap();
        assert_eq!(amy.position, 1);
    }

    #[tokio::test]
    async fn closed_events_have_no_waitlist() {
        let store = InMemoryDocumentStore::new();
        seed_event(&store, "evt_1", EventStatus::Cancelled);
        let err = join_waitlist(&store, &test_clock(), &EventId::new("evt_1"), &UserId::new("fan"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngagementError::EventClosed(_)));

        seed_event(&store, "evt_2", EventStatus::Published);
        let after_start = FixedClock::new(test_clock().now() + Duration::days(3));
        let err = join_waitlist(&store, &after_start, &EventId::new("evt_2"), &UserId::new("fan"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngagementError::EventClosed(_)));
    }
}

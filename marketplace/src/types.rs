//! Domain types shared across the marketplace.
//!
//! Identifiers are opaque strings (document ids), money is integer cents,
//! and every stored document serializes in camelCase.

use chrono::{DateTime, Utc};
use eventhaiti_core::documents::{self, DocumentError, DocumentPath, DocumentStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing id.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Authenticated user id (attendee, organizer or admin).
    UserId
);
string_id!(
    /// Event document id.
    EventId
);
string_id!(
    /// Ticket document id.
    TicketId
);
string_id!(
    /// Payout destination document id.
    DestinationId
);
string_id!(
    /// Staff invite document id.
    InviteId
);
string_id!(
    /// Withdrawal document id.
    WithdrawalId
);

// ============================================================================
// Money
// ============================================================================

/// An amount in US cents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cents(pub i64);

impl Cents {
    /// Zero cents.
    pub const ZERO: Self = Self(0);

    /// Create from a cent amount.
    #[must_use]
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Create from whole dollars.
    #[must_use]
    pub const fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    /// Raw cent value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// `self - other`, floored at zero.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        let diff = self.0 - other.0;
        if diff < 0 { Self(0) } else { Self(diff) }
    }
}

impl Add for Cents {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Cents {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

// ============================================================================
// Collections
// ============================================================================

/// Top-level document collections.
pub mod collections {
    /// `events/{eventId}`
    pub const EVENTS: &str = "events";
    /// `tickets/{ticketId}`
    pub const TICKETS: &str = "tickets";
    /// `event_favorites/{userId}_{eventId}`
    pub const EVENT_FAVORITES: &str = "event_favorites";
    /// `event_waitlist/{eventId}_{userId}`
    pub const EVENT_WAITLIST: &str = "event_waitlist";
    /// `organizer_follows/{followerId}_{organizerId}`
    pub const ORGANIZER_FOLLOWS: &str = "organizer_follows";
    /// `verification_requests/{userId}`
    pub const VERIFICATION_REQUESTS: &str = "verification_requests";
    /// `organizers/{organizerId}`
    pub const ORGANIZERS: &str = "organizers";
    /// `refund_requests/{ticketId}`
    pub const REFUND_REQUESTS: &str = "refund_requests";
    /// `reviews/{eventId}_{userId}`
    pub const REVIEWS: &str = "reviews";
    /// `withdrawals/{withdrawalId}`
    pub const WITHDRAWALS: &str = "withdrawals";
    /// `users/{userId}`
    pub const USERS: &str = "users";
}

// ============================================================================
// Events
// ============================================================================

/// Lifecycle of a published event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Visible and on sale.
    Published,
    /// Called off by the organizer.
    Cancelled,
}

/// One price level of an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketTier {
    /// Display name ("General", "VIP")
    pub name: String,
    /// Price per ticket; zero for free tiers
    pub price_cents: Cents,
    /// Tickets available
    pub quantity: u32,
}

/// `events/{eventId}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Owner of the event
    pub organizer_id: UserId,
    /// Title
    pub title: String,
    /// Long description
    #[serde(default)]
    pub description: String,
    /// Category ("music", "conference", ...)
    #[serde(default)]
    pub category: String,
    /// Venue name
    pub venue: String,
    /// City
    pub city: String,
    /// Street address
    #[serde(default)]
    pub address: String,
    /// ISO country code
    pub country: String,
    /// Start time
    pub start_at: DateTime<Utc>,
    /// End time
    pub end_at: DateTime<Utc>,
    /// Price levels
    #[serde(default)]
    pub ticket_tiers: Vec<TicketTier>,
    /// Status
    pub status: EventStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Document path of an event.
    #[must_use]
    pub fn path(id: &EventId) -> DocumentPath {
        DocumentPath::new(collections::EVENTS, id.as_str())
    }

    /// Whether `user` owns this event.
    #[must_use]
    pub fn is_organizer(&self, user: &UserId) -> bool {
        &self.organizer_id == user
    }

    /// Whether the event has started at `now`.
    #[must_use]
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_at
    }

    /// Whether the event has ended at `now`.
    #[must_use]
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_at
    }
}

/// Load an event document.
///
/// # Errors
///
/// Store failures and malformed documents.
pub async fn load_event(store: &dyn DocumentStore, id: &EventId) -> Result<Option<Event>, DocumentError> {
    documents::load(store, &Event::path(id)).await
}

/// Events owned by `organizer`, ordered by id.
///
/// # Errors
///
/// Store failures and malformed documents.
pub async fn events_of_organizer(
    store: &dyn DocumentStore,
    organizer: &UserId,
) -> Result<Vec<(EventId, Event)>, DocumentError> {
    let found = documents::query::<Event>(
        store,
        collections::EVENTS,
        "organizerId",
        serde_json::json!(organizer.as_str()),
    )
    .await?;
    Ok(found.into_iter().map(|(id, event)| (EventId::new(id), event)).collect())
}

// ============================================================================
// Tickets
// ============================================================================

/// Ticket lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Paid and unused.
    Valid,
    /// Scanned at the door.
    CheckedIn,
    /// Money returned to the holder.
    Refunded,
    /// Voided without refund (event cancelled, fraud).
    Cancelled,
}

impl TicketStatus {
    /// Whether the ticket counts toward gross sales.
    #[must_use]
    pub const fn counts_toward_sales(self) -> bool {
        matches!(self, Self::Valid | Self::CheckedIn)
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::CheckedIn => "checked_in",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `tickets/{ticketId}`, written by the payment pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Event the ticket admits to
    pub event_id: EventId,
    /// Holder
    pub attendee_id: UserId,
    /// Tier purchased
    pub tier_name: String,
    /// Price paid
    pub price_cents: Cents,
    /// Status
    pub status: TicketStatus,
    /// Purchase time
    pub purchased_at: DateTime<Utc>,
    /// Scan time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Who scanned it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_in_by: Option<UserId>,
}

impl Ticket {
    /// Document path of a ticket.
    #[must_use]
    pub fn path(id: &TicketId) -> DocumentPath {
        DocumentPath::new(collections::TICKETS, id.as_str())
    }
}

/// Load a ticket document.
///
/// # Errors
///
/// Store failures and malformed documents.
pub async fn load_ticket(store: &dyn DocumentStore, id: &TicketId) -> Result<Option<Ticket>, DocumentError> {
    documents::load(store, &Ticket::path(id)).await
}

/// Every ticket sold for `event`, ordered by id.
///
/// # Errors
///
/// Store failures and malformed documents.
pub async fn tickets_for_event(
    store: &dyn DocumentStore,
    event: &EventId,
) -> Result<Vec<(TicketId, Ticket)>, DocumentError> {
    let found =
        documents::query::<Ticket>(store, collections::TICKETS, "eventId", serde_json::json!(event.as_str()))
            .await?;
    Ok(found.into_iter().map(|(id, ticket)| (TicketId::new(id), ticket)).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cents_display_as_dollars() {
        assert_eq!(Cents::new(8680).to_string(), "$86.80");
        assert_eq!(Cents::new(-5).to_string(), "-$0.05");
        assert_eq!(Cents::from_dollars(50).to_string(), "$50.00");
    }

    #[test]
    fn cents_saturating_sub_floors_at_zero() {
        assert_eq!(Cents::new(100).saturating_sub(Cents::new(250)), Cents::ZERO);
        assert_eq!(Cents::new(300).saturating_sub(Cents::new(250)), Cents::new(50));
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = EventId::new("evt_1");
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("evt_1"));
    }

    #[test]
    fn ticket_documents_use_camel_case() {
        let json = serde_json::json!({
            "eventId": "e1",
            "attendeeId": "u1",
            "tierName": "VIP",
            "priceCents": 2500,
            "status": "checked_in",
            "purchasedAt": "2025-01-01T00:00:00Z"
        });
        let ticket: Ticket = serde_json::from_value(json).unwrap();
        assert_eq!(ticket.status, TicketStatus::CheckedIn);
        assert_eq!(ticket.price_cents, Cents::new(2500));
        assert!(ticket.status.counts_toward_sales());
    }
}

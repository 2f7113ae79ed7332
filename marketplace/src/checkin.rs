//! Ticket scanning at the door.

use crate::staff::{can_scan, load_membership};
use crate::types::{EventId, Ticket, TicketId, TicketStatus, UserId, load_event, load_ticket};
use chrono::{DateTime, Utc};
use eventhaiti_core::documents::{self, DocumentError, DocumentStore};
use eventhaiti_core::environment::Clock;
use thiserror::Error;

/// Why a ticket was not admitted.
#[derive(Error, Debug)]
pub enum CheckInError {
    /// Caller is neither the organizer nor staff.
    #[error("You are not staff for this event")]
    Forbidden,

    /// No such event.
    #[error("Event {0} not found")]
    EventNotFound(EventId),

    /// No such ticket.
    #[error("Ticket {0} not found")]
    TicketNotFound(TicketId),

    /// Ticket belongs to a different event.
    #[error("Ticket is for a different event")]
    WrongEvent,

    /// Ticket was already scanned.
    #[error("Ticket already checked in at {0}")]
    AlreadyCheckedIn(DateTime<Utc>),

    /// Ticket was refunded.
    #[error("Ticket was refunded")]
    Refunded,

    /// Ticket was voided.
    #[error("Ticket was cancelled")]
    Cancelled,

    /// Store failure.
    #[error(transparent)]
    Storage(#[from] DocumentError),
}

/// Mark `ticket` as used for `event`.
///
/// # Errors
///
/// Tickets of other events, and tickets that are not `valid`.
pub fn check_in(
    ticket: &mut Ticket,
    event: &EventId,
    scanner: &UserId,
    now: DateTime<Utc>,
) -> Result<(), CheckInError> {
    if &ticket.event_id != event {
        return Err(CheckInError::WrongEvent);
    }
    match ticket.status {
        TicketStatus::Valid => {},
        TicketStatus::CheckedIn => {
            return Err(CheckInError::AlreadyCheckedIn(ticket.checked_in_at.unwrap_or(now)));
        },
        TicketStatus::Refunded => return Err(CheckInError::Refunded),
        TicketStatus::Cancelled => return Err(CheckInError::Cancelled),
    }

    ticket.status = TicketStatus::CheckedIn;
    ticket.checked_in_at = Some(now);
    ticket.checked_in_by = Some(scanner.clone());
    Ok(())
}

/// Load, check and save a scanned ticket. Returns the updated ticket.
///
/// # Errors
///
/// Permission, lookup and [`check_in`] failures.
#[tracing::instrument(skip_all, fields(%event_id, %ticket_id, %scanner))]
pub async fn scan_ticket(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    event_id: &EventId,
    ticket_id: &TicketId,
    scanner: &UserId,
) -> Result<Ticket, CheckInError> {
    let event = load_event(store, event_id)
        .await?
        .ok_or_else(|| CheckInError::EventNotFound(event_id.clone()))?;
    let membership = load_membership(store, event_id, scanner).await?;
    if !can_scan(&event, scanner, membership.as_ref()) {
        return Err(CheckInError::Forbidden);
    }

    let mut ticket = load_ticket(store, ticket_id)
        .await?
        .ok_or_else(|| CheckInError::TicketNotFound(ticket_id.clone()))?;
    check_in(&mut ticket, event_id, scanner, clock.now())?;
    documents::save(store, &Ticket::path(ticket_id), &ticket).await?;

    tracing::info!("Ticket checked in");
    Ok(ticket)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::staff::{StaffMember, StaffRole};
    use crate::types::{Cents, Event, EventStatus};
    use chrono::Duration;
    use eventhaiti_testing::{InMemoryDocumentStore, test_clock};

    fn ticket(status: TicketStatus) -> Ticket {
        Ticket {
            event_id: EventId::new("evt_1"),
            attendee_id: UserId::new("fan"),
            tier_name: "GA".to_string(),
            price_cents: Cents::new(1500),
            status,
            purchased_at: test_clock().now(),
            checked_in_at: None,
            checked_in_by: None,
        }
    }

    fn seed(store: &InMemoryDocumentStore) {
        let now = test_clock().now();
        let event = Event {
            organizer_id: UserId::new("org_1"),
            title: "Show".to_string(),
            description: String::new(),
            category: String::new(),
            venue: "Hall".to_string(),
            city: "Pétion-Ville".to_string(),
            address: String::new(),
            country: "HT".to_string(),
            start_at: now,
            end_at: now + Duration::hours(3),
            ticket_tiers: Vec::new(),
            status: EventStatus::Published,
            created_at: now,
        };
        store.insert(&Event::path(&EventId::new("evt_1")), serde_json::to_value(event).unwrap());
        store.insert(
            &Ticket::path(&TicketId::new("t_1")),
            serde_json::to_value(ticket(TicketStatus::Valid)).unwrap(),
        );
        let scanner = StaffMember {
            event_id: EventId::new("evt_1"),
            user_id: UserId::new("sam"),
            role: StaffRole::Scanner,
            invited_by: UserId::new("org_1"),
            joined_at: now,
        };
        store.insert(
            &StaffMember::path(&EventId::new("evt_1"), &UserId::new("sam")),
            serde_json::to_value(scanner).unwrap(),
        );
    }

    #[test]
    fn only_valid_tickets_of_the_event_are_admitted() {
        let now = test_clock().now();
        let event = EventId::new("evt_1");
        let sam = UserId::new("sam");

        let mut valid = ticket(TicketStatus::Valid);
        check_in(&mut valid, &event, &sam, now).unwrap();
        assert_eq!(valid.status, TicketStatus::CheckedIn);
        assert_eq!(valid.checked_in_by, Some(sam.clone()));

        assert!(matches!(
            check_in(&mut valid, &event, &sam, now),
            Err(CheckInError::AlreadyCheckedIn(at)) if at == now
        ));
        assert!(matches!(
            check_in(&mut ticket(TicketStatus::Refunded), &event, &sam, now),
            Err(CheckInError::Refunded)
        ));
        assert!(matches!(
            check_in(&mut ticket(TicketStatus::Cancelled), &event, &sam, now),
            Err(CheckInError::Cancelled)
        ));
        assert!(matches!(
            check_in(&mut ticket(TicketStatus::Valid), &EventId::new("other"), &sam, now),
            Err(CheckInError::WrongEvent)
        ));
    }

    #[tokio::test]
    async fn staff_scan_saves_the_ticket() {
        let store = InMemoryDocumentStore::new();
        seed(&store);

        let ticket = scan_ticket(
            &store,
            &test_clock(),
            &EventId::new("evt_1"),
            &TicketId::new("t_1"),
            &UserId::new("sam"),
        )
        .await
        .unwrap();

        assert_eq!(ticket.status, TicketStatus::CheckedIn);
        let stored = store.raw(&Ticket::path(&TicketId::new("t_1"))).unwrap();
        assert_eq!(stored["status"], "checked_in");
        assert_eq!(stored["checkedInBy"], "sam");
    }

    #[tokio::test]
    async fn strangers_cannot_scan() {
        let store = InMemoryDocumentStore::new();
        seed(&store);

        let err = scan_ticket(
            &store,
            &test_clock(),
            &EventId::new("evt_1"),
            &TicketId::new("t_1"),
            &UserId::new("eve"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CheckInError::Forbidden));
        assert_eq!(
            store.raw(&Ticket::path(&TicketId::new("t_1"))).unwrap()["status"],
            "valid"
        );
    }
}

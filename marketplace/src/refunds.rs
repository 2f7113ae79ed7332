//! Refund requests.
//!
//! A ticket holder asks for a refund before the event starts; the organizer
//! approves (the ticket becomes `refunded`) or denies it with a reason. A
//! denied request may be filed again. Moving the money back is the payment
//! provider's job and happens outside this module.

use crate::persistence::{DocumentWrite, write_documents};
use crate::types::{Cents, Event, EventId, Ticket, TicketId, TicketStatus, UserId, collections};
use chrono::{DateTime, Utc};
use eventhaiti_core::documents::{self, DocumentError, DocumentPath, DocumentStore};
use eventhaiti_core::effect::Effect;
use eventhaiti_core::environment::Clock;
use eventhaiti_core::reducer::Reducer;
use eventhaiti_core::{SmallVec, smallvec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Longest accepted reason.
pub const MAX_REASON_LEN: usize = 1000;

/// Outcome of a refund request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Waiting for the organizer
    Pending,
    /// Granted; the ticket is refunded
    Approved,
    /// Refused
    Denied,
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        })
    }
}

/// `refund_requests/{ticketId}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    /// Ticket to refund
    pub ticket_id: TicketId,
    /// Its event
    pub event_id: EventId,
    /// Ticket holder
    pub attendee_id: UserId,
    /// Event organizer, who decides
    pub organizer_id: UserId,
    /// Price paid
    pub amount: Cents,
    /// Holder's reason
    pub reason: String,
    /// Outcome
    pub status: RefundStatus,
    /// Filing time
    pub requested_at: DateTime<Utc>,
    /// Decision time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    /// Deciding user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<UserId>,
    /// Why it was denied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<String>,
}

impl RefundRequest {
    /// Document path.
    #[must_use]
    pub fn path(ticket: &TicketId) -> DocumentPath {
        DocumentPath::new(collections::REFUND_REQUESTS, ticket.as_str())
    }
}

/// Refund request of `ticket`, if one was filed.
///
/// # Errors
///
/// Store failures and malformed documents.
pub async fn load_refund_request(
    store: &dyn DocumentStore,
    ticket: &TicketId,
) -> Result<Option<RefundRequest>, DocumentError> {
    documents::load(store, &RefundRequest::path(ticket)).await
}

/// Why a refund action was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefundError {
    /// Only the holder can ask.
    #[error("Only the ticket holder can request a refund")]
    NotTicketHolder,

    /// Only the organizer can decide.
    #[error("Only the event organizer can process refunds")]
    NotOrganizer,

    /// The ticket is not `valid`.
    #[error("A {0} ticket cannot be refunded")]
    TicketNotRefundable(TicketStatus),

    /// Too late.
    #[error("Refunds close when the event starts")]
    EventStarted,

    /// A request is already open or granted.
    #[error("A refund request is already {0}")]
    AlreadyRequested(RefundStatus),

    /// Nothing to decide.
    #[error("No pending refund request for this ticket")]
    NoPendingRequest,

    /// Malformed input.
    #[error("{0}")]
    Validation(String),

    /// The documents could not be written.
    #[error("Failed to save refund: {0}")]
    Storage(String),
}

/// Actions for the refund reducer.
#[derive(Clone, Debug)]
pub enum RefundAction {
    /// Holder files a request.
    Request {
        /// Why
        reason: String,
    },
    /// Organizer grants it.
    Approve,
    /// Organizer refuses it.
    Deny {
        /// Why
        reason: String,
    },
    /// Documents written.
    Persisted,
    /// Documents could not be written.
    PersistFailed {
        /// Store message
        message: String,
    },
}

/// Refund state of one ticket, seen by one caller.
#[derive(Clone, Debug)]
pub struct RefundState {
    /// Caller
    pub actor: UserId,
    /// Ticket id
    pub ticket_id: TicketId,
    /// Ticket document
    pub ticket: Ticket,
    /// Its event
    pub event: Event,
    /// Existing request
    pub request: Option<RefundRequest>,
    /// Last refusal or failure
    pub last_error: Option<RefundError>,
}

impl RefundState {
    /// State for `actor` acting on `ticket`.
    #[must_use]
    pub const fn new(
        actor: UserId,
        ticket_id: TicketId,
        ticket: Ticket,
        event: Event,
        request: Option<RefundRequest>,
    ) -> Self {
        Self {
            actor,
            ticket_id,
            ticket,
            event,
            request,
            last_error: None,
        }
    }
}

/// Dependencies of the refund reducer.
#[derive(Clone)]
pub struct RefundEnvironment {
    /// Timestamps
    pub clock: Arc<dyn Clock>,
    /// Refund and ticket documents
    pub documents: Arc<dyn DocumentStore>,
}

impl RefundEnvironment {
    /// Bundle the dependencies.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { clock, documents }
    }
}

/// Reducer for refund requests.
#[derive(Clone, Debug, Default)]
pub struct RefundReducer;

type Effects = SmallVec<[Effect<RefundAction>; 4]>;

impl RefundReducer {
    /// Creates a new `RefundReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn fail(state: &mut RefundState, error: RefundError) -> Effects {
        tracing::debug!(ticket = %state.ticket_id, actor = %state.actor, %error, "Refund action refused");
        state.last_error = Some(error);
        SmallVec::new()
    }

    fn check_reason(reason: &str) -> Result<String, RefundError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(RefundError::Validation("A reason is required".to_string()));
        }
        if reason.chars().count() > MAX_REASON_LEN {
            return Err(RefundError::Validation(format!(
                "Reason must be at most {MAX_REASON_LEN} characters"
            )));
        }
        Ok(reason.to_string())
    }

    fn persist(env: &RefundEnvironment, writes: Vec<DocumentWrite>) -> Effects {
        smallvec![write_documents(&env.documents, writes, RefundAction::Persisted, |e| {
            RefundAction::PersistFailed { message: e.to_string() }
        })]
    }

    /// The pending request, when `state.actor` may decide it.
    fn decidable(state: &RefundState) -> Result<(), RefundError> {
        if !state.event.is_organizer(&state.actor) {
            return Err(RefundError::NotOrganizer);
        }
        match &state.request {
            Some(request) if request.status == RefundStatus::Pending => Ok(()),
            _ => Err(RefundError::NoPendingRequest),
        }
    }
}

impl Reducer for RefundReducer {
    type State = RefundState;
    type Action = RefundAction;
    type Environment = RefundEnvironment;

    fn reduce(&self, state: &mut Self::State, action: Self::Action, env: &Self::Environment) -> Effects {
        let now = env.clock.now();

        match action {
            // ========== Holder ==========
            RefundAction::Request { reason } => {
                state.last_error = None;
                if state.ticket.attendee_id != state.actor {
                    return Self::fail(state, RefundError::NotTicketHolder);
                }
                if state.ticket.status != TicketStatus::Valid {
                    let status = state.ticket.status;
                    return Self::fail(state, RefundError::TicketNotRefundable(status));
                }
                if state.event.has_started(now) {
                    return Self::fail(state, RefundError::EventStarted);
                }
                let open = state
                    .request
                    .as_ref()
                    .map(|existing| existing.status)
                    .filter(|status| *status != RefundStatus::Denied);
                if let Some(status) = open {
                    return Self::fail(state, RefundError::AlreadyRequested(status));
                }
                let reason = match Self::check_reason(&reason) {
                    Ok(reason) => reason,
                    Err(e) => return Self::fail(state, e),
                };

                let request = RefundRequest {
                    ticket_id: state.ticket_id.clone(),
                    event_id: state.ticket.event_id.clone(),
                    attendee_id: state.actor.clone(),
                    organizer_id: state.event.organizer_id.clone(),
                    amount: state.ticket.price_cents,
                    reason,
                    status: RefundStatus::Pending,
                    requested_at: now,
                    processed_at: None,
                    processed_by: None,
                    denial_reason: None,
                };
                tracing::info!(ticket = %state.ticket_id, amount = %request.amount, "Refund requested");
                let write = DocumentWrite::set(RefundRequest::path(&state.ticket_id), &request);
                state.request = Some(request);
                Self::persist(env, vec![write])
            },

            // ========== Organizer ==========
            RefundAction::Approve => {
                state.last_error = None;
                if let Err(e) = Self::decidable(state) {
                    return Self::fail(state, e);
                }
                if state.ticket.status != TicketStatus::Valid {
                    let status = state.ticket.status;
                    return Self::fail(state, RefundError::TicketNotRefundable(status));
                }
                let Some(request) = state.request.as_mut() else {
                    return Self::fail(state, RefundError::NoPendingRequest);
                };

                request.status = RefundStatus::Approved;
                request.processed_at = Some(now);
                request.processed_by = Some(state.actor.clone());
                state.ticket.status = TicketStatus::Refunded;
                tracing::info!(ticket = %state.ticket_id, "Refund approved");

                let writes = vec![
                    DocumentWrite::set(RefundRequest::path(&state.ticket_id), &*request),
                    DocumentWrite::set(Ticket::path(&state.ticket_id), &state.ticket),
                ];
                Self::persist(env, writes)
            },

            RefundAction::Deny { reason } => {
                state.last_error = None;
                if let Err(e) = Self::decidable(state) {
                    return Self::fail(state, e);
                }
                let reason = match Self::check_reason(&reason) {
                    Ok(reason) => reason,
                    Err(e) => return Self::fail(state, e),
                };
                let Some(request) = state.request.as_mut() else {
                    return Self::fail(state, RefundError::NoPendingRequest);
                };

                request.status = RefundStatus::Denied;
                request.processed_at = Some(now);
                request.processed_by = Some(state.actor.clone());
                request.denial_reason = Some(reason);
                tracing::info!(ticket = %state.ticket_id, "Refund denied");

                let write = DocumentWrite::set(RefundRequest::path(&state.ticket_id), &*request);
                Self::persist(env, vec![write])
            },

            // ========== Persistence results ==========
            RefundAction::Persisted => SmallVec::new(),

            RefundAction::PersistFailed { message } => {
                state.last_error = Some(RefundError::Storage(message));
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::EventStatus;
    use chrono::Duration;
    use eventhaiti_runtime::Store;
    use eventhaiti_testing::{InMemoryDocumentStore, ReducerTest, assertions, test_clock};

    fn event(starts_in: Duration) -> Event {
        let now = test_clock().now();
        Event {
            organizer_id: UserId::new("org_1"),
            title: "Konpa".to_string(),
            description: String::new(),
            category: String::new(),
            venue: "Club".to_string(),
            city: "Cap-Haïtien".to_string(),
            address: String::new(),
            country: "HT".to_string(),
            start_at: now + starts_in,
            end_at: now + starts_in + Duration::hours(4),
            ticket_tiers: Vec::new(),
            status: EventStatus::Published,
            created_at: now,
        }
    }

    fn ticket(status: TicketStatus) -> Ticket {
        Ticket {
            event_id: EventId::new("evt_1"),
            attendee_id: UserId::new("fan"),
            tier_name: "GA".to_string(),
            price_cents: Cents::new(2500),
            status,
            purchased_at: test_clock().now() - Duration::days(2),
            checked_in_at: None,
            checked_in_by: None,
        }
    }

    fn pending_request() -> RefundRequest {
        RefundRequest {
            ticket_id: TicketId::new("t_1"),
            event_id: EventId::new("evt_1"),
            attendee_id: UserId::new("fan"),
            organizer_id: UserId::new("org_1"),
            amount: Cents::new(2500),
            reason: "Sick".to_string(),
            status: RefundStatus::Pending,
            requested_at: test_clock().now(),
            processed_at: None,
            processed_by: None,
            denial_reason: None,
        }
    }

    fn state(actor: &str, ticket_status: TicketStatus, request: Option<RefundRequest>) -> RefundState {
        RefundState::new(
            UserId::new(actor),
            TicketId::new("t_1"),
            ticket(ticket_status),
            event(Duration::days(5)),
            request,
        )
    }

    fn test_env(documents: InMemoryDocumentStore) -> RefundEnvironment {
        RefundEnvironment::new(Arc::new(test_clock()), Arc::new(documents))
    }

    #[tokio::test]
    async fn holder_requests_and_organizer_approves() {
        let documents = InMemoryDocumentStore::new();
        let store = Store::new(state("fan", TicketStatus::Valid, None), RefundReducer::new(), test_env(documents.clone()));
        store
            .send(RefundAction::Request {
                reason: "  Can't travel  ".to_string(),
            })
            .await
            .unwrap();
        let filed = documents.raw(&RefundRequest::path(&TicketId::new("t_1"))).unwrap();
        assert_eq!(filed["status"], "pending");
        assert_eq!(filed["reason"], "Can't travel");
        assert_eq!(filed["amount"], 2500);

        let mut organizer_view = store.into_state();
        organizer_view.actor = UserId::new("org_1");
        let store = Store::new(organizer_view, RefundReducer::new(), test_env(documents.clone()));
        store.send(RefundAction::Approve).await.unwrap();

        let state = store.into_state();
        assert!(state.last_error.is_none());
        assert_eq!(state.ticket.status, TicketStatus::Refunded);
        assert_eq!(
            documents.raw(&Ticket::path(&TicketId::new("t_1"))).unwrap()["status"],
            "refunded"
        );
        assert_eq!(
            documents.raw(&RefundRequest::path(&TicketId::new("t_1"))).unwrap()["processedBy"],
            "org_1"
        );
    }

    #[test]
    fn only_the_holder_may_request() {
        ReducerTest::new(RefundReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state("someone", TicketStatus::Valid, None))
            .when_action(RefundAction::Request {
                reason: "please".to_string(),
            })
            .then_state(|s| assert_eq!(s.last_error, Some(RefundError::NotTicketHolder)))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn requests_close_when_the_event_starts() {
        let mut started = state("fan", TicketStatus::Valid, None);
        started.event = event(Duration::hours(-1));
        ReducerTest::new(RefundReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(started)
            .when_action(RefundAction::Request {
                reason: "late".to_string(),
            })
            .then_state(|s| assert_eq!(s.last_error, Some(RefundError::EventStarted)))
            .run();
    }

    #[test]
    fn used_tickets_are_not_refundable() {
        ReducerTest::new(RefundReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state("fan", TicketStatus::CheckedIn, None))
            .when_action(RefundAction::Request {
                reason: "meh".to_string(),
            })
            .then_state(|s| {
                assert_eq!(s.last_error, Some(RefundError::TicketNotRefundable(TicketStatus::CheckedIn)));
            })
            .run();
    }

    #[test]
    fn one_open_request_at_a_time_but_denials_can_be_retried() {
        ReducerTest::new(RefundReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state("fan", TicketStatus::Valid, Some(pending_request())))
            .when_action(RefundAction::Request {
                reason: "again".to_string(),
            })
            .then_state(|s| assert_eq!(s.last_error, Some(RefundError::AlreadyRequested(RefundStatus::Pending))))
            .run();

        let denied = RefundRequest {
            status: RefundStatus::Denied,
            denial_reason: Some("No".to_string()),
            ..pending_request()
        };
        ReducerTest::new(RefundReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state("fan", TicketStatus::Valid, Some(denied)))
            .when_action(RefundAction::Request {
                reason: "New evidence".to_string(),
            })
            .then_state(|s| {
                assert!(s.last_error.is_none());
                let request = s.request.as_ref().unwrap();
                assert_eq!(request.status, RefundStatus::Pending);
                assert!(request.denial_reason.is_none());
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn organizer_denies_with_a_reason() {
        ReducerTest::new(RefundReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state("org_1", TicketStatus::Valid, Some(pending_request())))
            .when_actions([
                RefundAction::Deny { reason: " ".to_string() },
                RefundAction::Deny {
                    reason: "Policy: no refunds within 7 days".to_string(),
                },
            ])
            .then_state(|s| {
                assert!(s.last_error.is_none());
                let request = s.request.as_ref().unwrap();
                assert_eq!(request.status, RefundStatus::Denied);
                assert_eq!(s.ticket.status, TicketStatus::Valid);
            })
            .run();
    }

    #[test]
    fn holders_cannot_decide_their_own_request() {
        ReducerTest::new(RefundReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state("fan", TicketStatus::Valid, Some(pending_request())))
            .when_action(RefundAction::Approve)
            .then_state(|s| assert_eq!(s.last_error, Some(RefundError::NotOrganizer)))
            .run();

        ReducerTest::new(RefundReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state("org_1", TicketStatus::Valid, None))
            .when_action(RefundAction::Approve)
            .then_state(|s| assert_eq!(s.last_error, Some(RefundError::NoPendingRequest)))
            .run();
    }
}

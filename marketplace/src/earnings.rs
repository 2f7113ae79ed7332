//! Organizer earnings, settlement and withdrawals.
//!
//! Earnings are derived on read from the tickets of an event and the
//! withdrawals already taken against it; nothing is cached. Money becomes
//! withdrawable once the event has settled (a fixed delay after it ends).

use crate::payouts::{PayoutDestination, WithdrawalMethod, eligible_destination};
use crate::persistence::{DocumentWrite, write_documents};
use crate::types::{
    Cents, DestinationId, Event, EventId, Ticket, UserId, WithdrawalId, collections, events_of_organizer,
    load_event, tickets_for_event,
};
use chrono::{DateTime, Duration, Utc};
use eventhaiti_core::documents::{self, DocumentError, DocumentPath, DocumentStore};
use eventhaiti_core::effect::Effect;
use eventhaiti_core::environment::{Clock, IdGenerator};
use eventhaiti_core::reducer::Reducer;
use eventhaiti_core::{SmallVec, smallvec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Policy and fees
// ============================================================================

/// Withdrawal rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayoutPolicy {
    /// Smallest withdrawal, and the smallest balance that can be withdrawn from
    pub minimum_withdrawal: Cents,
    /// Time after an event ends before its earnings settle
    pub settlement_delay: Duration,
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self {
            minimum_withdrawal: Cents::new(5000),
            settlement_delay: Duration::days(7),
        }
    }
}

/// Gross sales split into fees and the organizer's share.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    /// Ticket revenue
    pub gross_amount: Cents,
    /// Marketplace fee
    pub platform_fee: Cents,
    /// Card processing fee
    pub processing_fee: Cents,
    /// What the organizer earns, never negative
    pub net_amount: Cents,
}

/// `numerator / denominator` of `amount`, rounded half up to a whole cent.
const fn percent_of(amount: i64, numerator: i64, denominator: i64) -> i64 {
    (amount * numerator + denominator / 2) / denominator
}

/// Fees for `gross` collected over `tickets` tickets.
///
/// - platform: the larger of 10% of gross and 50¢ per ticket
/// - processing: 2.9% of gross plus 30¢ per ticket
#[must_use]
pub fn calculate_fees(gross: Cents, tickets: u32) -> FeeBreakdown {
    let count = i64::from(tickets);
    let platform_fee = Cents::new(percent_of(gross.value(), 10, 100).max(50 * count));
    let processing_fee = Cents::new(percent_of(gross.value(), 29, 1000) + 30 * count);

    FeeBreakdown {
        gross_amount: gross,
        platform_fee,
        processing_fee,
        net_amount: gross.saturating_sub(platform_fee + processing_fee),
    }
}

// ============================================================================
// Withdrawals
// ============================================================================

/// Progress of a withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// Waiting for the payout operator
    Requested,
    /// Money sent
    Completed,
    /// Payout bounced; the amount is withdrawable again
    Failed,
}

/// `withdrawals/{withdrawalId}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    /// Requesting organizer
    pub organizer_id: UserId,
    /// Event the money comes from
    pub event_id: EventId,
    /// Amount
    pub amount: Cents,
    /// Payout rail
    pub method: WithdrawalMethod,
    /// Where the money goes
    pub destination_id: DestinationId,
    /// Progress
    pub status: WithdrawalStatus,
    /// Request time
    pub requested_at: DateTime<Utc>,
}

impl Withdrawal {
    /// Document path.
    #[must_use]
    pub fn path(id: &WithdrawalId) -> DocumentPath {
        DocumentPath::new(collections::WITHDRAWALS, id.as_str())
    }

    /// Whether the amount is taken out of the balance.
    #[must_use]
    pub const fn counts_as_withdrawn(&self) -> bool {
        !matches!(self.status, WithdrawalStatus::Failed)
    }
}

/// Withdrawals taken against `event`.
///
/// # Errors
///
/// Store failures and malformed documents.
pub async fn withdrawals_for_event(
    store: &dyn DocumentStore,
    event: &EventId,
) -> Result<Vec<Withdrawal>, DocumentError> {
    let found = documents::query::<Withdrawal>(
        store,
        collections::WITHDRAWALS,
        "eventId",
        serde_json::json!(event.as_str()),
    )
    .await?;
    Ok(found.into_iter().map(|(_, w)| w).collect())
}

// ============================================================================
// Earnings
// ============================================================================

/// Whether an event's earnings can be withdrawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Event not over, or still inside the settlement delay
    Pending,
    /// Withdrawable
    Ready,
}

/// Earnings of one event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEarnings {
    /// Event
    pub event_id: EventId,
    /// Owner
    pub organizer_id: UserId,
    /// Title
    pub title: String,
    /// Tickets counted (valid or checked in)
    pub tickets_sold: u32,
    /// Fee split
    #[serde(flatten)]
    pub fees: FeeBreakdown,
    /// Already withdrawn or in flight
    pub withdrawn_amount: Cents,
    /// What can be withdrawn now
    pub available_to_withdraw: Cents,
    /// Settlement state
    pub settlement_status: SettlementStatus,
    /// When the earnings settle
    pub settlement_date: DateTime<Utc>,
}

impl EventEarnings {
    /// Compute earnings from an event's tickets and withdrawals as of `now`.
    #[must_use]
    pub fn compute(
        event_id: EventId,
        event: &Event,
        tickets: &[Ticket],
        withdrawals: &[Withdrawal],
        now: DateTime<Utc>,
        policy: &PayoutPolicy,
    ) -> Self {
        let sold: Vec<&Ticket> = tickets.iter().filter(|t| t.status.counts_toward_sales()).collect();
        let gross: Cents = sold.iter().map(|t| t.price_cents).sum();
        let tickets_sold = u32::try_from(sold.len()).unwrap_or(u32::MAX);
        let fees = calculate_fees(gross, tickets_sold);

        let withdrawn_amount: Cents = withdrawals
            .iter()
            .filter(|w| w.counts_as_withdrawn())
            .map(|w| w.amount)
            .sum();

        let settlement_date = event.end_at + policy.settlement_delay;
        let settlement_status = if now >= settlement_date {
            SettlementStatus::Ready
        } else {
            SettlementStatus::Pending
        };
        let available_to_withdraw = match settlement_status {
            SettlementStatus::Ready => fees.net_amount.saturating_sub(withdrawn_amount),
            SettlementStatus::Pending => Cents::ZERO,
        };

        Self {
            event_id,
            organizer_id: event.organizer_id.clone(),
            title: event.title.clone(),
            tickets_sold,
            fees,
            withdrawn_amount,
            available_to_withdraw,
            settlement_status,
            settlement_date,
        }
    }

    /// Record a new withdrawal against these earnings.
    fn withdraw(&mut self, amount: Cents) {
        self.withdrawn_amount += amount;
        self.available_to_withdraw = self.available_to_withdraw.saturating_sub(amount);
    }
}

/// Earnings of one event, or `None` when it does not exist.
///
/// # Errors
///
/// Store failures and malformed documents.
pub async fn load_event_earnings(
    store: &dyn DocumentStore,
    event_id: &EventId,
    now: DateTime<Utc>,
    policy: &PayoutPolicy,
) -> Result<Option<EventEarnings>, DocumentError> {
    let Some(event) = load_event(store, event_id).await? else {
        return Ok(None);
    };
    let tickets: Vec<Ticket> = tickets_for_event(store, event_id)
        .await?
        .into_iter()
        .map(|(_, t)| t)
        .collect();
    let withdrawals = withdrawals_for_event(store, event_id).await?;

    Ok(Some(EventEarnings::compute(
        event_id.clone(),
        &event,
        &tickets,
        &withdrawals,
        now,
        policy,
    )))
}

/// Sums across every event of an organizer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsTotals {
    /// Events owned
    pub event_count: u32,
    /// Tickets counted
    pub tickets_sold: u32,
    /// Ticket revenue
    pub gross_amount: Cents,
    /// Platform plus processing fees
    pub total_fees: Cents,
    /// Organizer share
    pub net_amount: Cents,
    /// Withdrawn or in flight
    pub withdrawn_amount: Cents,
    /// Withdrawable now
    pub available_to_withdraw: Cents,
}

/// Earnings summary of an organizer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizerAnalytics {
    /// One row per event, ordered by event id
    pub events: Vec<EventEarnings>,
    /// Sums of the rows
    pub totals: AnalyticsTotals,
}

impl OrganizerAnalytics {
    /// Totals over `events`.
    #[must_use]
    pub fn from_rows(events: Vec<EventEarnings>) -> Self {
        let totals = events.iter().fold(AnalyticsTotals::default(), |mut acc, row| {
            acc.event_count += 1;
            acc.tickets_sold += row.tickets_sold;
            acc.gross_amount += row.fees.gross_amount;
            acc.total_fees += row.fees.platform_fee + row.fees.processing_fee;
            acc.net_amount += row.fees.net_amount;
            acc.withdrawn_amount += row.withdrawn_amount;
            acc.available_to_withdraw += row.available_to_withdraw;
            acc
        });
        Self { events, totals }
    }
}

/// Earnings of every event `organizer` owns.
///
/// # Errors
///
/// Store failures and malformed documents.
pub async fn load_organizer_analytics(
    store: &dyn DocumentStore,
    organizer: &UserId,
    now: DateTime<Utc>,
    policy: &PayoutPolicy,
) -> Result<OrganizerAnalytics, DocumentError> {
    let mut rows = Vec::new();
    for (event_id, event) in events_of_organizer(store, organizer).await? {
        let tickets: Vec<Ticket> = tickets_for_event(store, &event_id)
            .await?
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        let withdrawals = withdrawals_for_event(store, &event_id).await?;
        rows.push(EventEarnings::compute(event_id, &event, &tickets, &withdrawals, now, policy));
    }
    Ok(OrganizerAnalytics::from_rows(rows))
}

// ============================================================================
// Withdrawal reducer
// ============================================================================

/// Why a withdrawal was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalError {
    /// Only the organizer can withdraw an event's earnings.
    #[error("Only the event organizer can withdraw its earnings")]
    NotOrganizer,

    /// Earnings have not settled yet.
    #[error("Earnings settle on {settles_at}")]
    NotSettled {
        /// Settlement date
        settles_at: DateTime<Utc>,
    },

    /// The balance is under the minimum.
    #[error("Available balance {available} is below the {minimum} minimum")]
    InsufficientBalance {
        /// Withdrawable balance
        available: Cents,
        /// Minimum withdrawal
        minimum: Cents,
    },

    /// The requested amount is under the minimum.
    #[error("Withdrawals must be at least {minimum}")]
    BelowMinimum {
        /// Minimum withdrawal
        minimum: Cents,
    },

    /// More than the balance was requested.
    #[error("Requested {requested} but only {available} is available")]
    ExceedsAvailable {
        /// Requested amount
        requested: Cents,
        /// Withdrawable balance
        available: Cents,
    },

    /// No verified destination accepts this method.
    #[error("Add and verify a {0} payout destination first")]
    NoVerifiedDestination(WithdrawalMethod),

    /// The withdrawal could not be saved.
    #[error("Failed to record withdrawal: {0}")]
    Storage(String),
}

/// Actions for the withdrawal reducer.
#[derive(Clone, Debug)]
pub enum WithdrawalAction {
    /// Withdraw `amount` (all of the balance when `None`) by `method`.
    Request {
        /// Payout rail
        method: WithdrawalMethod,
        /// Amount; `None` withdraws everything available
        amount: Option<Cents>,
    },
    /// Withdrawal document written.
    Recorded,
    /// Withdrawal document could not be written.
    RecordFailed {
        /// Store message
        message: String,
    },
}

/// A withdrawal request against one event.
#[derive(Clone, Debug)]
pub struct WithdrawalState {
    /// Caller
    pub organizer_id: UserId,
    /// Current earnings of the event
    pub earnings: EventEarnings,
    /// Caller's payout destinations
    pub destinations: BTreeMap<DestinationId, PayoutDestination>,
    /// The withdrawal created by this request
    pub withdrawal: Option<(WithdrawalId, Withdrawal)>,
    /// Last refusal or failure
    pub last_error: Option<WithdrawalError>,
}

impl WithdrawalState {
    /// State for `organizer_id` withdrawing from `earnings`.
    #[must_use]
    pub const fn new(
        organizer_id: UserId,
        earnings: EventEarnings,
        destinations: BTreeMap<DestinationId, PayoutDestination>,
    ) -> Self {
        Self {
            organizer_id,
            earnings,
            destinations,
            withdrawal: None,
            last_error: None,
        }
    }
}

/// Dependencies of the withdrawal reducer.
#[derive(Clone)]
pub struct WithdrawalEnvironment {
    /// Timestamps
    pub clock: Arc<dyn Clock>,
    /// Withdrawal ids
    pub ids: Arc<dyn IdGenerator>,
    /// Withdrawal documents
    pub documents: Arc<dyn DocumentStore>,
    /// Limits
    pub policy: PayoutPolicy,
}

impl WithdrawalEnvironment {
    /// Bundle the dependencies.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        documents: Arc<dyn DocumentStore>,
        policy: PayoutPolicy,
    ) -> Self {
        Self {
            clock,
            ids,
            documents,
            policy,
        }
    }
}

/// Reducer for withdrawal requests.
#[derive(Clone, Debug, Default)]
pub struct WithdrawalReducer;

impl WithdrawalReducer {
    /// Creates a new `WithdrawalReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Every rule a request must pass, in the order they are reported.
    fn check(
        state: &WithdrawalState,
        method: WithdrawalMethod,
        amount: Option<Cents>,
        policy: &PayoutPolicy,
    ) -> Result<(Cents, DestinationId), WithdrawalError> {
        let earnings = &state.earnings;
        if earnings.organizer_id != state.organizer_id {
            return Err(WithdrawalError::NotOrganizer);
        }
        if earnings.settlement_status == SettlementStatus::Pending {
            return Err(WithdrawalError::NotSettled {
                settles_at: earnings.settlement_date,
            });
        }

        let available = earnings.available_to_withdraw;
        let minimum = policy.minimum_withdrawal;
        if available < minimum {
            return Err(WithdrawalError::InsufficientBalance { available, minimum });
        }
        let requested = amount.unwrap_or(available);
        if requested < minimum {
            return Err(WithdrawalError::BelowMinimum { minimum });
        }
        if requested > available {
            return Err(WithdrawalError::ExceedsAvailable { requested, available });
        }

        let (destination_id, _) = eligible_destination(&state.destinations, method)
            .ok_or(WithdrawalError::NoVerifiedDestination(method))?;
        Ok((requested, destination_id.clone()))
    }
}

impl Reducer for WithdrawalReducer {
    type State = WithdrawalState;
    type Action = WithdrawalAction;
    type Environment = WithdrawalEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            WithdrawalAction::Request { method, amount } => {
                state.last_error = None;
                let (amount, destination_id) = match Self::check(state, method, amount, &env.policy) {
                    Ok(accepted) => accepted,
                    Err(error) => {
                        tracing::info!(organizer = %state.organizer_id, event = %state.earnings.event_id, %error, "Withdrawal refused");
                        state.last_error = Some(error);
                        return SmallVec::new();
                    },
                };

                let id = WithdrawalId::new(env.ids.next_id());
                let withdrawal = Withdrawal {
                    organizer_id: state.organizer_id.clone(),
                    event_id: state.earnings.event_id.clone(),
                    amount,
                    method,
                    destination_id,
                    status: WithdrawalStatus::Requested,
                    requested_at: env.clock.now(),
                };
                tracing::info!(
                    withdrawal = %id,
                    event = %withdrawal.event_id,
                    %amount,
                    %method,
                    "Withdrawal requested"
                );

                let write = DocumentWrite::set(Withdrawal::path(&id), &withdrawal);
                state.earnings.withdraw(amount);
                state.withdrawal = Some((id, withdrawal));

                smallvec![write_documents(
                    &env.documents,
                    vec![write],
                    WithdrawalAction::Recorded,
                    |e| WithdrawalAction::RecordFailed { message: e.to_string() },
                )]
            },

            WithdrawalAction::Recorded => SmallVec::new(),

            WithdrawalAction::RecordFailed { message } => {
                // Nothing was saved, so the balance is untouched.
                if let Some((_, withdrawal)) = state.withdrawal.take() {
                    state.earnings.withdrawn_amount = state.earnings.withdrawn_amount.saturating_sub(withdrawal.amount);
                    state.earnings.available_to_withdraw += withdrawal.amount;
                }
                state.last_error = Some(WithdrawalError::Storage(message));
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::payouts::{DestinationKind, DestinationStatus, MobileMoneyProvider};
    use crate::types::{EventStatus, TicketStatus, TicketTier};
    use eventhaiti_runtime::Store;
    use eventhaiti_testing::{InMemoryDocumentStore, ReducerTest, SequentialIdGenerator, assertions, test_clock};
    use proptest::prelude::*;

    fn event(end_days_ago: i64) -> Event {
        let now = test_clock().now();
        Event {
            organizer_id: UserId::new("org_1"),
            title: "Kompa Night".to_string(),
            description: String::new(),
            category: "music".to_string(),
            venue: "Parc Historique".to_string(),
            city: "Port-au-Prince".to_string(),
            address: String::new(),
            country: "HT".to_string(),
            start_at: now - Duration::days(end_days_ago) - Duration::hours(4),
            end_at: now - Duration::days(end_days_ago),
            ticket_tiers: vec![TicketTier {
                name: "General".to_string(),
                price_cents: Cents::new(2500),
                quantity: 100,
            }],
            status: EventStatus::Published,
            created_at: now - Duration::days(60),
        }
    }

    fn ticket(price: i64, status: TicketStatus) -> Ticket {
        Ticket {
            event_id: EventId::new("evt_1"),
            attendee_id: UserId::new("fan"),
            tier_name: "General".to_string(),
            price_cents: Cents::new(price),
            status,
            purchased_at: test_clock().now() - Duration::days(30),
            checked_in_at: None,
            checked_in_by: None,
        }
    }

    fn withdrawal(amount: i64, status: WithdrawalStatus) -> Withdrawal {
        Withdrawal {
            organizer_id: UserId::new("org_1"),
            event_id: EventId::new("evt_1"),
            amount: Cents::new(amount),
            method: WithdrawalMethod::Bank,
            destination_id: DestinationId::new("dest_1"),
            status,
            requested_at: test_clock().now(),
        }
    }

    fn earnings(gross_tickets: &[i64], end_days_ago: i64, withdrawn: &[Withdrawal]) -> EventEarnings {
        let tickets: Vec<Ticket> = gross_tickets.iter().map(|p| ticket(*p, TicketStatus::Valid)).collect();
        EventEarnings::compute(
            EventId::new("evt_1"),
            &event(end_days_ago),
            &tickets,
            withdrawn,
            test_clock().now(),
            &PayoutPolicy::default(),
        )
    }

    fn verified_destinations() -> BTreeMap<DestinationId, PayoutDestination> {
        let now = test_clock().now();
        let make = |kind, primary| PayoutDestination {
            organizer_id: UserId::new("org_1"),
            kind,
            status: DestinationStatus::Verified,
            is_primary: primary,
            proof_document_path: None,
            failure_reason: None,
            phone_verification: None,
            created_at: now,
            updated_at: now,
            verified_at: Some(now),
        };
        BTreeMap::from([
            (
                DestinationId::new("dest_bank"),
                make(
                    DestinationKind::Bank {
                        bank_name: "Unibank".to_string(),
                        account_holder: "Marie Jean".to_string(),
                        account_number_last4: "7890".to_string(),
                        routing_number_last4: None,
                    },
                    true,
                ),
            ),
            (
                DestinationId::new("dest_natcash"),
                make(
                    DestinationKind::MobileMoney {
                        provider: MobileMoneyProvider::Natcash,
                        phone_masked: "****1234".to_string(),
                        phone_hash: "h".to_string(),
                        phone_verified: true,
                    },
                    false,
                ),
            ),
        ])
    }

    fn test_env(documents: InMemoryDocumentStore) -> WithdrawalEnvironment {
        WithdrawalEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(SequentialIdGenerator::new("wd")),
            Arc::new(documents),
            PayoutPolicy::default(),
        )
    }

    #[test]
    fn hundred_dollars_one_ticket() {
        let fees = calculate_fees(Cents::new(10_000), 1);
        assert_eq!(fees.platform_fee, Cents::new(1000));
        assert_eq!(fees.processing_fee, Cents::new(320));
        assert_eq!(fees.net_amount, Cents::new(8680));
    }

    #[test]
    fn per_ticket_floor_applies_to_cheap_tickets() {
        // 10% of $2.00 is 20¢, under the 50¢ per-ticket floor
        let fees = calculate_fees(Cents::new(200), 1);
        assert_eq!(fees.platform_fee, Cents::new(50));
        assert_eq!(fees.processing_fee, Cents::new(36));
        assert_eq!(fees.net_amount, Cents::new(114));
    }

    #[test]
    fn net_never_goes_negative() {
        let fees = calculate_fees(Cents::new(50), 1);
        assert_eq!(fees.net_amount, Cents::ZERO);
        assert_eq!(calculate_fees(Cents::ZERO, 0).net_amount, Cents::ZERO);
    }

    proptest! {
        #[test]
        fn fees_split_the_gross(price in 100i64..50_000, count in 1u32..200) {
            let gross = Cents::new(price * i64::from(count));
            let fees = calculate_fees(gross, count);
            prop_assert!(fees.platform_fee.value() >= 50 * i64::from(count));
            prop_assert!(fees.processing_fee.value() >= 30 * i64::from(count));
            prop_assert!(fees.net_amount >= Cents::ZERO);
            if fees.net_amount > Cents::ZERO {
                prop_assert_eq!(fees.platform_fee + fees.processing_fee + fees.net_amount, gross);
            }
        }
    }

    #[test]
    fn unsettled_earnings_are_not_withdrawable() {
        let row = earnings(&[10_000], 3, &[]);
        assert_eq!(row.settlement_status, SettlementStatus::Pending);
        assert_eq!(row.available_to_withdraw, Cents::ZERO);
        assert_eq!(row.fees.net_amount, Cents::new(8680));
        assert_eq!(row.settlement_date, event(3).end_at + Duration::days(7));
    }

    #[test]
    fn settled_earnings_subtract_withdrawals() {
        let row = earnings(
            &[10_000],
            8,
            &[
                withdrawal(5000, WithdrawalStatus::Completed),
                withdrawal(1000, WithdrawalStatus::Failed),
            ],
        );
        assert_eq!(row.settlement_status, SettlementStatus::Ready);
        assert_eq!(row.withdrawn_amount, Cents::new(5000));
        assert_eq!(row.available_to_withdraw, Cents::new(3680));
    }

    #[test]
    fn refunded_tickets_do_not_count() {
        let tickets = vec![
            ticket(10_000, TicketStatus::CheckedIn),
            ticket(10_000, TicketStatus::Refunded),
            ticket(10_000, TicketStatus::Cancelled),
        ];
        let row = EventEarnings::compute(
            EventId::new("evt_1"),
            &event(10),
            &tickets,
            &[],
            test_clock().now(),
            &PayoutPolicy::default(),
        );
        assert_eq!(row.tickets_sold, 1);
        assert_eq!(row.fees.gross_amount, Cents::new(10_000));
    }

    #[test]
    fn earnings_serialize_with_flat_fee_fields() {
        let json = serde_json::to_value(earnings(&[10_000], 8, &[])).unwrap();
        assert_eq!(json["grossAmount"], 10_000);
        assert_eq!(json["netAmount"], 8680);
        assert_eq!(json["availableToWithdraw"], 8680);
        assert_eq!(json["settlementStatus"], "ready");
    }

    #[test]
    fn analytics_totals_sum_the_rows() {
        let analytics = OrganizerAnalytics::from_rows(vec![earnings(&[10_000], 8, &[]), earnings(&[10_000], 2, &[])]);
        assert_eq!(analytics.totals.event_count, 2);
        assert_eq!(analytics.totals.gross_amount, Cents::new(20_000));
        assert_eq!(analytics.totals.total_fees, Cents::new(2640));
        assert_eq!(analytics.totals.net_amount, Cents::new(17_360));
        assert_eq!(analytics.totals.available_to_withdraw, Cents::new(8680));
    }

    #[tokio::test]
    async fn analytics_load_every_owned_event() {
        let documents = InMemoryDocumentStore::new();
        documents.insert(&Event::path(&EventId::new("evt_1")), serde_json::to_value(event(8)).unwrap());
        let mut other = event(8);
        other.organizer_id = UserId::new("someone_else");
        documents.insert(&Event::path(&EventId::new("evt_2")), serde_json::to_value(other).unwrap());
        documents.insert(
            &Ticket::path(&crate::types::TicketId::new("t1")),
            serde_json::to_value(ticket(10_000, TicketStatus::Valid)).unwrap(),
        );

        let analytics = load_organizer_analytics(
            &documents,
            &UserId::new("org_1"),
            test_clock().now(),
            &PayoutPolicy::default(),
        )
        .await
        .unwrap();

        assert_eq!(analytics.events.len(), 1);
        assert_eq!(analytics.totals.net_amount, Cents::new(8680));
    }

    #[test]
    fn requests_are_checked_in_order() {
        let cases = vec![
            (earnings(&[10_000], 3, &[]), None, WithdrawalMethod::Bank, "NotSettled"),
            (earnings(&[4000], 8, &[]), None, WithdrawalMethod::Bank, "InsufficientBalance"),
            (earnings(&[10_000], 8, &[]), Some(Cents::new(4999)), WithdrawalMethod::Bank, "BelowMinimum"),
            (earnings(&[10_000], 8, &[]), Some(Cents::new(9000)), WithdrawalMethod::Bank, "ExceedsAvailable"),
            (earnings(&[10_000], 8, &[]), None, WithdrawalMethod::Moncash, "NoVerifiedDestination"),
        ];

        for (row, amount, method, expected) in cases {
            ReducerTest::new(WithdrawalReducer::new())
                .with_env(test_env(InMemoryDocumentStore::new()))
                .given_state(WithdrawalState::new(UserId::new("org_1"), row, verified_destinations()))
                .when_action(WithdrawalAction::Request { method, amount })
                .then_state(move |state| {
                    let error = format!("{:?}", state.last_error.as_ref().unwrap());
                    assert!(error.starts_with(expected), "{error} should be {expected}");
                    assert!(state.withdrawal.is_none());
                })
                .then_effects(assertions::assert_no_effects)
                .run();
        }
    }

    #[test]
    fn strangers_cannot_withdraw() {
        ReducerTest::new(WithdrawalReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(WithdrawalState::new(
                UserId::new("intruder"),
                earnings(&[10_000], 8, &[]),
                verified_destinations(),
            ))
            .when_action(WithdrawalAction::Request {
                method: WithdrawalMethod::Bank,
                amount: None,
            })
            .then_state(|state| assert_eq!(state.last_error, Some(WithdrawalError::NotOrganizer)))
            .run();
    }

    #[tokio::test]
    async fn accepted_withdrawals_are_recorded() {
        let documents = InMemoryDocumentStore::new();
        let store = Store::new(
            WithdrawalState::new(UserId::new("org_1"), earnings(&[10_000], 8, &[]), verified_destinations()),
            WithdrawalReducer::new(),
            test_env(documents.clone()),
        );

        store
            .send(WithdrawalAction::Request {
                method: WithdrawalMethod::Bank,
                amount: Some(Cents::new(5000)),
            })
            .await
            .unwrap();

        let state = store.into_state();
        assert!(state.last_error.is_none());
        let (id, withdrawal) = state.withdrawal.unwrap();
        assert_eq!(withdrawal.destination_id, DestinationId::new("dest_bank"));
        assert_eq!(state.earnings.available_to_withdraw, Cents::new(3680));

        let stored = documents.raw(&Withdrawal::path(&id)).unwrap();
        assert_eq!(stored["amount"], 5000);
        assert_eq!(stored["method"], "bank");
        assert_eq!(stored["status"], "requested");
    }

    #[tokio::test]
    async fn failed_records_restore_the_balance() {
        let documents = InMemoryDocumentStore::new();
        documents.fail_writes(true);
        let store = Store::new(
            WithdrawalState::new(UserId::new("org_1"), earnings(&[10_000], 8, &[]), verified_destinations()),
            WithdrawalReducer::new(),
            test_env(documents),
        );

        store
            .send(WithdrawalAction::Request {
                method: WithdrawalMethod::Bank,
                amount: None,
            })
            .await
            .unwrap();

        let state = store.into_state();
        assert!(matches!(state.last_error, Some(WithdrawalError::Storage(_))));
        assert!(state.withdrawal.is_none());
        assert_eq!(state.earnings.available_to_withdraw, Cents::new(8680));
    }
}

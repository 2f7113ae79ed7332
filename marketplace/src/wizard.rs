//! Event creation wizard.
//!
//! The draft moves through five steps (basics, location, schedule, tickets,
//! review). Navigation is free; the draft is validated only on submit, and
//! the first failing rule sends the wizard back to the step that owns it.

use crate::payouts::load_stripe_account;
use crate::persistence::{DocumentWrite, write_documents};
use crate::types::{Cents, Event, EventId, EventStatus, TicketTier, UserId};
use chrono::{DateTime, Utc};
use eventhaiti_core::documents::{DocumentError, DocumentStore};
use eventhaiti_core::effect::Effect;
use eventhaiti_core::environment::{Clock, IdGenerator};
use eventhaiti_core::reducer::Reducer;
use eventhaiti_core::{SmallVec, smallvec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Countries where paid tickets go through Stripe Connect.
pub const STRIPE_COUNTRIES: [&str; 2] = ["US", "CA"];

/// Wizard pages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WizardStep {
    /// Title, description, category
    #[default]
    Basics = 1,
    /// Venue and address
    Location = 2,
    /// Start and end
    Schedule = 3,
    /// Ticket tiers
    Tickets = 4,
    /// Summary before publishing
    Review = 5,
}

impl WizardStep {
    /// Steps in order.
    pub const ALL: [Self; 5] = [
        Self::Basics,
        Self::Location,
        Self::Schedule,
        Self::Tickets,
        Self::Review,
    ];

    /// 1-based step number.
    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// The following step, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Basics => Some(Self::Location),
            Self::Location => Some(Self::Schedule),
            Self::Schedule => Some(Self::Tickets),
            Self::Tickets => Some(Self::Review),
            Self::Review => None,
        }
    }

    /// The preceding step, if any.
    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        match self {
            Self::Basics => None,
            Self::Location => Some(Self::Basics),
            Self::Schedule => Some(Self::Location),
            Self::Tickets => Some(Self::Schedule),
            Self::Review => Some(Self::Tickets),
        }
    }
}

impl TryFrom<u8> for WizardStep {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|step| step.number() == value)
            .ok_or_else(|| format!("wizard step must be 1-5, got {value}"))
    }
}

impl From<WizardStep> for u8 {
    fn from(step: WizardStep) -> Self {
        step.number()
    }
}

/// The event being created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventDraft {
    /// Title
    pub title: String,
    /// Long description
    pub description: String,
    /// Category
    pub category: String,
    /// Venue name
    pub venue: String,
    /// City
    pub city: String,
    /// Street address
    pub address: String,
    /// ISO country code
    pub country: String,
    /// Start time
    pub start_at: Option<DateTime<Utc>>,
    /// End time
    pub end_at: Option<DateTime<Utc>>,
    /// Price levels
    pub ticket_tiers: Vec<TicketTier>,
}

impl Default for EventDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            category: String::new(),
            venue: String::new(),
            city: String::new(),
            address: String::new(),
            country: "HT".to_string(),
            start_at: None,
            end_at: None,
            ticket_tiers: Vec::new(),
        }
    }
}

impl EventDraft {
    /// Whether any tier charges money.
    #[must_use]
    pub fn has_paid_tiers(&self) -> bool {
        self.ticket_tiers.iter().any(|t| t.price_cents > Cents::ZERO)
    }

    /// Whether publishing needs a Stripe Connect account.
    #[must_use]
    pub fn requires_stripe(&self) -> bool {
        let country = self.country.trim().to_ascii_uppercase();
        STRIPE_COUNTRIES.contains(&country.as_str()) && self.has_paid_tiers()
    }
}

/// Partial draft edit; `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPatch {
    /// Title
    pub title: Option<String>,
    /// Long description
    pub description: Option<String>,
    /// Category
    pub category: Option<String>,
    /// Venue name
    pub venue: Option<String>,
    /// City
    pub city: Option<String>,
    /// Street address
    pub address: Option<String>,
    /// ISO country code
    pub country: Option<String>,
    /// Start time
    pub start_at: Option<DateTime<Utc>>,
    /// End time
    pub end_at: Option<DateTime<Utc>>,
    /// Replaces every tier
    pub ticket_tiers: Option<Vec<TicketTier>>,
}

impl DraftPatch {
    fn apply(self, draft: &mut EventDraft) {
        let Self {
            title,
            description,
            category,
            venue,
            city,
            address,
            country,
            start_at,
            end_at,
            ticket_tiers,
        } = self;
        if let Some(v) = title {
            draft.title = v;
        }
        if let Some(v) = description {
            draft.description = v;
        }
        if let Some(v) = category {
            draft.category = v;
        }
        if let Some(v) = venue {
            draft.venue = v;
        }
        if let Some(v) = city {
            draft.city = v;
        }
        if let Some(v) = address {
            draft.address = v;
        }
        if let Some(v) = country {
            draft.country = v;
        }
        if start_at.is_some() {
            draft.start_at = start_at;
        }
        if end_at.is_some() {
            draft.end_at = end_at;
        }
        if let Some(v) = ticket_tiers {
            draft.ticket_tiers = v;
        }
    }
}

/// Why a draft cannot be published.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    /// Step 1
    #[error("Event title is required")]
    MissingTitle,

    /// Step 2
    #[error("Venue and city are required")]
    MissingLocation,

    /// Step 3
    #[error("{0}")]
    InvalidSchedule(String),

    /// Step 4
    #[error("Add at least one ticket tier")]
    NoTicketTiers,

    /// Step 4
    #[error("Ticket tier {index}: {reason}")]
    InvalidTier {
        /// 1-based position of the tier
        index: usize,
        /// What is wrong with it
        reason: String,
    },

    /// Step 4
    #[error("Connect a Stripe account before selling paid tickets in {country}")]
    StripeRequired {
        /// Event country
        country: String,
    },

    /// The event document could not be written.
    #[error("Failed to publish event: {0}")]
    Storage(String),
}

impl WizardError {
    /// The step that has to be fixed.
    #[must_use]
    pub const fn step(&self) -> Option<WizardStep> {
        match self {
            Self::MissingTitle => Some(WizardStep::Basics),
            Self::MissingLocation => Some(WizardStep::Location),
            Self::InvalidSchedule(_) => Some(WizardStep::Schedule),
            Self::NoTicketTiers | Self::InvalidTier { .. } | Self::StripeRequired { .. } => Some(WizardStep::Tickets),
            Self::Storage(_) => None,
        }
    }
}

fn validate_tier(index: usize, tier: &TicketTier) -> Result<(), WizardError> {
    let invalid = |reason: &str| WizardError::InvalidTier {
        index: index + 1,
        reason: reason.to_string(),
    };
    if tier.name.trim().is_empty() {
        return Err(invalid("name is required"));
    }
    if tier.price_cents < Cents::ZERO {
        return Err(invalid("price cannot be negative"));
    }
    if tier.quantity == 0 {
        return Err(invalid("quantity must be at least 1"));
    }
    Ok(())
}

/// Check a draft in step order. `stripe_account_id` is the organizer's
/// connected account, if any.
///
/// # Errors
///
/// The first failing rule.
pub fn validate_draft(draft: &EventDraft, stripe_account_id: Option<&str>) -> Result<(), WizardError> {
    if draft.title.trim().is_empty() {
        return Err(WizardError::MissingTitle);
    }
    if draft.venue.trim().is_empty() || draft.city.trim().is_empty() {
        return Err(WizardError::MissingLocation);
    }
    match (draft.start_at, draft.end_at) {
        (Some(start), Some(end)) if end > start => {},
        (Some(_), Some(_)) => {
            return Err(WizardError::InvalidSchedule("End time must be after the start time".to_string()));
        },
        _ => return Err(WizardError::InvalidSchedule("Start and end times are required".to_string())),
    }
    if draft.ticket_tiers.is_empty() {
        return Err(WizardError::NoTicketTiers);
    }
    for (index, tier) in draft.ticket_tiers.iter().enumerate() {
        validate_tier(index, tier)?;
    }
    let has_stripe = stripe_account_id.is_some_and(|id| !id.trim().is_empty());
    if draft.requires_stripe() && !has_stripe {
        return Err(WizardError::StripeRequired {
            country: draft.country.trim().to_ascii_uppercase(),
        });
    }
    Ok(())
}

// ============================================================================
// Reducer
// ============================================================================

/// Actions for the wizard reducer.
#[derive(Clone, Debug)]
pub enum WizardAction {
    /// Go forward one step.
    Next,
    /// Go back one step.
    Back,
    /// Jump to a step.
    GoTo(WizardStep),
    /// Edit the draft.
    UpdateDraft(DraftPatch),
    /// Validate and publish.
    Submit,
    /// Event document written.
    Persisted,
    /// Event document could not be written.
    PersistFailed {
        /// Store message
        message: String,
    },
}

/// Wizard for one organizer.
#[derive(Clone, Debug)]
pub struct WizardState {
    /// Author
    pub organizer_id: UserId,
    /// Page shown
    pub current_step: WizardStep,
    /// Form contents
    pub draft: EventDraft,
    /// Connected Stripe account of the organizer
    pub stripe_account_id: Option<String>,
    /// Id of the published event
    pub submitted_event: Option<EventId>,
    /// Last refusal or failure
    pub last_error: Option<WizardError>,
}

impl WizardState {
    /// Fresh wizard on step 1.
    #[must_use]
    pub fn new(organizer_id: UserId, stripe_account_id: Option<String>) -> Self {
        Self {
            organizer_id,
            current_step: WizardStep::Basics,
            draft: EventDraft::default(),
            stripe_account_id,
            submitted_event: None,
            last_error: None,
        }
    }

    /// Wizard over an existing draft, with the organizer's Stripe account
    /// looked up from the store.
    ///
    /// # Errors
    ///
    /// Store failures while reading the Stripe profile.
    pub async fn load(
        store: &dyn DocumentStore,
        organizer_id: UserId,
        draft: EventDraft,
    ) -> Result<Self, DocumentError> {
        let stripe = load_stripe_account(store, &organizer_id).await?;
        let mut state = Self::new(organizer_id, stripe);
        state.draft = draft;
        Ok(state)
    }
}

/// Dependencies of the wizard reducer.
#[derive(Clone)]
pub struct WizardEnvironment {
    /// Timestamps
    pub clock: Arc<dyn Clock>,
    /// Event ids
    pub ids: Arc<dyn IdGenerator>,
    /// Event documents
    pub documents: Arc<dyn DocumentStore>,
}

impl WizardEnvironment {
    /// Bundle the dependencies.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { clock, ids, documents }
    }
}

/// Reducer for the event wizard.
#[derive(Clone, Debug, Default)]
pub struct WizardReducer;

impl WizardReducer {
    /// Creates a new `WizardReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for WizardReducer {
    type State = WizardState;
    type Action = WizardAction;
    type Environment = WizardEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Navigation ==========
            WizardAction::Next => {
                if let Some(next) = state.current_step.next() {
                    state.current_step = next;
                }
                SmallVec::new()
            },

            WizardAction::Back => {
                if let Some(previous) = state.current_step.previous() {
                    state.current_step = previous;
                }
                SmallVec::new()
            },

            WizardAction::GoTo(step) => {
                state.current_step = step;
                SmallVec::new()
            },

            WizardAction::UpdateDraft(patch) => {
                patch.apply(&mut state.draft);
                SmallVec::new()
            },

            // ========== Publish ==========
            WizardAction::Submit => {
                state.last_error = None;
                if state.submitted_event.is_some() {
                    return SmallVec::new();
                }
                if let Err(error) = validate_draft(&state.draft, state.stripe_account_id.as_deref()) {
                    tracing::debug!(organizer = %state.organizer_id, %error, "Draft refused");
                    if let Some(step) = error.step() {
                        state.current_step = step;
                    }
                    state.last_error = Some(error);
                    return SmallVec::new();
                }

                // Both are present once validation passed.
                let (Some(start_at), Some(end_at)) = (state.draft.start_at, state.draft.end_at) else {
                    return SmallVec::new();
                };
                let draft = &state.draft;
                let event = Event {
                    organizer_id: state.organizer_id.clone(),
                    title: draft.title.trim().to_string(),
                    description: draft.description.clone(),
                    category: draft.category.clone(),
                    venue: draft.venue.trim().to_string(),
                    city: draft.city.trim().to_string(),
                    address: draft.address.clone(),
                    country: draft.country.trim().to_ascii_uppercase(),
                    start_at,
                    end_at,
                    ticket_tiers: draft.ticket_tiers.clone(),
                    status: EventStatus::Published,
                    created_at: env.clock.now(),
                };
                let id = EventId::new(env.ids.next_id());
                tracing::info!(event = %id, organizer = %state.organizer_id, "Publishing event");
                state.submitted_event = Some(id.clone());

                smallvec![write_documents(
                    &env.documents,
                    vec![DocumentWrite::set(Event::path(&id), &event)],
                    WizardAction::Persisted,
                    |e| WizardAction::PersistFailed { message: e.to_string() },
                )]
            },

            WizardAction::Persisted => SmallVec::new(),

            WizardAction::PersistFailed { message } => {
                state.submitted_event = None;
                state.last_error = Some(WizardError::Storage(message));
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::payouts::StripeConnectProfile;
    use chrono::Duration;
    use eventhaiti_runtime::Store;
    use eventhaiti_testing::{InMemoryDocumentStore, ReducerTest, SequentialIdGenerator, assertions, test_clock};

    fn test_env(documents: InMemoryDocumentStore) -> WizardEnvironment {
        WizardEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(SequentialIdGenerator::new("evt")),
            Arc::new(documents),
        )
    }

    fn tier(price: i64) -> TicketTier {
        TicketTier {
            name: "General".to_string(),
            price_cents: Cents::new(price),
            quantity: 200,
        }
    }

    fn valid_draft() -> EventDraft {
        let start = test_clock().now() + Duration::days(14);
        EventDraft {
            title: "Jazz au Champ de Mars".to_string(),
            venue: "Champ de Mars".to_string(),
            city: "Port-au-Prince".to_string(),
            start_at: Some(start),
            end_at: Some(start + Duration::hours(5)),
            ticket_tiers: vec![tier(1500)],
            ..EventDraft::default()
        }
    }

    fn organizer() -> UserId {
        UserId::new("org_1")
    }

    #[test]
    fn empty_title_points_to_step_one() {
        let draft = EventDraft {
            title: "  ".to_string(),
            ..valid_draft()
        };
        let error = validate_draft(&draft, None).unwrap_err();
        assert_eq!(error, WizardError::MissingTitle);
        assert_eq!(error.step(), Some(WizardStep::Basics));
    }

    #[test]
    fn zero_tiers_points_to_step_four() {
        let draft = EventDraft {
            ticket_tiers: Vec::new(),
            ..valid_draft()
        };
        let error = validate_draft(&draft, None).unwrap_err();
        assert_eq!(error, WizardError::NoTicketTiers);
        assert_eq!(error.step(), Some(WizardStep::Tickets));
    }

    #[test]
    fn rules_are_checked_in_step_order() {
        let draft = EventDraft {
            venue: String::new(),
            end_at: None,
            ticket_tiers: Vec::new(),
            ..valid_draft()
        };
        assert_eq!(validate_draft(&draft, None), Err(WizardError::MissingLocation));

        let inverted = EventDraft {
            end_at: valid_draft().start_at,
            ..valid_draft()
        };
        assert_eq!(validate_draft(&inverted, None).unwrap_err().step(), Some(WizardStep::Schedule));
    }

    #[test]
    fn invalid_tiers_are_reported_by_position() {
        let draft = EventDraft {
            ticket_tiers: vec![tier(1000), TicketTier { quantity: 0, ..tier(500) }],
            ..valid_draft()
        };
        assert_eq!(
            validate_draft(&draft, None),
            Err(WizardError::InvalidTier {
                index: 2,
                reason: "quantity must be at least 1".to_string()
            })
        );
    }

    #[test]
    fn paid_tiers_in_the_us_need_stripe() {
        let draft = EventDraft {
            country: "us".to_string(),
            ..valid_draft()
        };
        assert_eq!(
            validate_draft(&draft, None),
            Err(WizardError::StripeRequired {
                country: "US".to_string()
            })
        );
        assert_eq!(validate_draft(&draft, Some("  ")).unwrap_err().step(), Some(WizardStep::Tickets));
        assert!(validate_draft(&draft, Some("acct_123")).is_ok());

        let free = EventDraft {
            country: "CA".to_string(),
            ticket_tiers: vec![tier(0)],
            ..valid_draft()
        };
        assert!(validate_draft(&free, None).is_ok());
        assert!(validate_draft(&valid_draft(), None).is_ok());
    }

    #[test]
    fn navigation_stays_within_bounds() {
        ReducerTest::new(WizardReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(WizardState::new(organizer(), None))
            .when_actions([
                WizardAction::Back,
                WizardAction::Next,
                WizardAction::Next,
                WizardAction::GoTo(WizardStep::Review),
                WizardAction::Next,
            ])
            .then_state(|state| assert_eq!(state.current_step, WizardStep::Review))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn failed_submit_jumps_to_the_failing_step() {
        ReducerTest::new(WizardReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(WizardState::new(organizer(), None))
            .when_actions([
                WizardAction::GoTo(WizardStep::Review),
                WizardAction::UpdateDraft(DraftPatch {
                    title: Some("Rara".to_string()),
                    venue: Some("Jacmel".to_string()),
                    city: Some("Jacmel".to_string()),
                    start_at: valid_draft().start_at,
                    end_at: valid_draft().end_at,
                    ..DraftPatch::default()
                }),
                WizardAction::Submit,
            ])
            .then_state(|state| {
                assert_eq!(state.current_step, WizardStep::Tickets);
                assert_eq!(state.last_error, Some(WizardError::NoTicketTiers));
                assert!(state.submitted_event.is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn wizard_steps_serialize_as_numbers() {
        assert_eq!(serde_json::to_value(WizardStep::Tickets).unwrap(), 4);
        assert_eq!(serde_json::from_value::<WizardStep>(serde_json::json!(2)).unwrap(), WizardStep::Location);
        assert!(serde_json::from_value::<WizardStep>(serde_json::json!(6)).is_err());
    }

    #[tokio::test]
    async fn successful_submit_publishes_the_event() {
        let documents = InMemoryDocumentStore::new();
        let mut state = WizardState::new(organizer(), None);
        state.draft = valid_draft();
        let store = Store::new(state, WizardReducer::new(), test_env(documents.clone()));

        store.send(WizardAction::Submit).await.unwrap();

        let state = store.into_state();
        assert!(state.last_error.is_none());
        let id = state.submitted_event.unwrap();
        assert_eq!(id.as_str(), "evt_1");
        let stored = documents.raw(&Event::path(&id)).unwrap();
        assert_eq!(stored["status"], "published");
        assert_eq!(stored["country"], "HT");
        assert_eq!(stored["organizerId"], "org_1");
    }

    #[tokio::test]
    async fn load_reads_the_stripe_profile() {
        let documents = InMemoryDocumentStore::new();
        documents.insert(
            &StripeConnectProfile::path(&organizer()),
            serde_json::json!({ "stripeAccountId": "acct_9" }),
        );
        let draft = EventDraft {
            country: "US".to_string(),
            ..valid_draft()
        };

        let state = WizardState::load(&documents, organizer(), draft).await.unwrap();
        assert_eq!(state.stripe_account_id.as_deref(), Some("acct_9"));

        let store = Store::new(state, WizardReducer::new(), test_env(documents.clone()));
        store.send(WizardAction::Submit).await.unwrap();
        assert!(store.state(|s| s.submitted_event.is_some()).await);
    }

    #[tokio::test]
    async fn storage_failures_clear_the_submission() {
        let documents = InMemoryDocumentStore::new();
        documents.fail_writes(true);
        let mut state = WizardState::new(organizer(), None);
        state.draft = valid_draft();
        let store = Store::new(state, WizardReducer::new(), test_env(documents));

        store.send(WizardAction::Submit).await.unwrap();

        let state = store.into_state();
        assert!(state.submitted_event.is_none());
        assert!(matches!(state.last_error, Some(WizardError::Storage(_))));
    }
}

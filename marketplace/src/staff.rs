//! Event staff: invites, membership and permissions.
//!
//! An organizer (or a manager) creates an invite; the random token is
//! returned once inside a deep link and only its hash is stored. Whoever
//! redeems the token before it expires becomes a member of the event.
//!
//! Documents:
//! - `events/{eventId}/invites/{inviteId}`
//! - `events/{eventId}/members/{userId}`

use crate::deeplinks::DeepLink;
use crate::payouts::Redacted;
use crate::persistence::{DocumentWrite, write_documents};
use crate::secrets::{SecretGenerator, hash_secret, verify_secret};
use crate::types::{Event, EventId, InviteId, UserId, collections};
use chrono::{DateTime, Duration, Utc};
use eventhaiti_core::documents::{self, DocumentError, DocumentPath, DocumentStore};
use eventhaiti_core::effect::Effect;
use eventhaiti_core::environment::{Clock, IdGenerator};
use eventhaiti_core::reducer::Reducer;
use eventhaiti_core::{SmallVec, smallvec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Invite lifetime.
pub const INVITE_TTL_DAYS: i64 = 7;

const INVITES: &str = "invites";
const MEMBERS: &str = "members";

/// What a staff member may do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    /// Scans tickets at the door
    Scanner,
    /// Scans tickets and manages scanners
    Manager,
}

impl StaffRole {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scanner => "scanner",
            Self::Manager => "manager",
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invite lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    /// Waiting to be redeemed
    Pending,
    /// Used
    Redeemed,
    /// Withdrawn by the organizer
    Revoked,
}

impl fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Redeemed => "redeemed",
            Self::Revoked => "revoked",
        })
    }
}

/// `events/{eventId}/invites/{inviteId}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffInvite {
    /// Event
    pub event_id: EventId,
    /// Role granted on redemption
    pub role: StaffRole,
    /// Hash of the token, scoped to the event id
    pub token_hash: String,
    /// Issuer
    pub created_by: UserId,
    /// Issue time
    pub created_at: DateTime<Utc>,
    /// Last moment the token works
    pub expires_at: DateTime<Utc>,
    /// Lifecycle
    pub status: InviteStatus,
    /// Who used it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemed_by: Option<UserId>,
    /// When it was used or revoked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl StaffInvite {
    /// Document path.
    #[must_use]
    pub fn path(event: &EventId, id: &InviteId) -> DocumentPath {
        DocumentPath::nested(collections::EVENTS, event.as_str(), INVITES, id.as_str())
    }
}

/// `events/{eventId}/members/{userId}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    /// Event
    pub event_id: EventId,
    /// Member
    pub user_id: UserId,
    /// Granted role
    pub role: StaffRole,
    /// Who issued the invite
    pub invited_by: UserId,
    /// Redemption time
    pub joined_at: DateTime<Utc>,
}

impl StaffMember {
    /// Document path.
    #[must_use]
    pub fn path(event: &EventId, user: &UserId) -> DocumentPath {
        DocumentPath::nested(collections::EVENTS, event.as_str(), MEMBERS, user.as_str())
    }
}

/// Membership of `user` in `event`, if any.
///
/// # Errors
///
/// Store failures and malformed documents.
pub async fn load_membership(
    store: &dyn DocumentStore,
    event: &EventId,
    user: &UserId,
) -> Result<Option<StaffMember>, DocumentError> {
    documents::load(store, &StaffMember::path(event, user)).await
}

/// Invites and members of `event`.
///
/// # Errors
///
/// Store failures and malformed documents.
pub async fn load_staff(
    store: &dyn DocumentStore,
    event: &EventId,
) -> Result<(BTreeMap<InviteId, StaffInvite>, BTreeMap<UserId, StaffMember>), DocumentError> {
    let base = format!("{}/{event}", collections::EVENTS);
    let invites = documents::list::<StaffInvite>(store, &format!("{base}/{INVITES}"))
        .await?
        .into_iter()
        .map(|(id, invite)| (InviteId::new(id), invite))
        .collect();
    let members = documents::list::<StaffMember>(store, &format!("{base}/{MEMBERS}"))
        .await?
        .into_iter()
        .map(|(id, member)| (UserId::new(id), member))
        .collect();
    Ok((invites, members))
}

/// Whether `user` may scan tickets for `event`.
#[must_use]
pub fn can_scan(event: &Event, user: &UserId, membership: Option<&StaffMember>) -> bool {
    event.is_organizer(user) || membership.is_some_and(|m| &m.user_id == user)
}

/// Whether `user` may manage the staff of `event`.
#[must_use]
pub fn can_manage(event: &Event, user: &UserId, membership: Option<&StaffMember>) -> bool {
    event.is_organizer(user) || membership.is_some_and(|m| &m.user_id == user && m.role == StaffRole::Manager)
}

// ============================================================================
// Errors
// ============================================================================

/// Why a staff action was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StaffError {
    /// Caller lacks the permission.
    #[error("{0}")]
    Forbidden(&'static str),

    /// No invite matches.
    #[error("Invite not found")]
    InviteNotFound,

    /// The invite was already used or revoked.
    #[error("Invite is {0}")]
    InviteClosed(InviteStatus),

    /// The invite expired.
    #[error("Invite expired")]
    InviteExpired,

    /// Organizers do not need invites to their own event.
    #[error("You already organize this event")]
    AlreadyOrganizer,

    /// The caller already holds this role or a higher one.
    #[error("You are already a {0} for this event")]
    AlreadyMember(StaffRole),

    /// No such member.
    #[error("{0} is not a staff member of this event")]
    MemberNotFound(UserId),

    /// The documents could not be written.
    #[error("Failed to save staff changes: {0}")]
    Storage(String),
}

// ============================================================================
// Actions and state
// ============================================================================

/// Actions for the staff reducer.
#[derive(Clone, Debug)]
pub enum StaffAction {
    /// Issue an invite.
    CreateInvite {
        /// Role to grant
        role: StaffRole,
    },
    /// Withdraw a pending invite.
    RevokeInvite {
        /// Target invite
        invite_id: InviteId,
    },
    /// Join the event with an invite token.
    Redeem {
        /// Token from the deep link
        token: Redacted<String>,
    },
    /// Remove a member.
    RemoveMember {
        /// Member to remove
        user_id: UserId,
    },
    /// Documents written.
    Persisted,
    /// Documents could not be written.
    PersistFailed {
        /// Store message
        message: String,
    },
}

/// A freshly issued invite. The token is not stored anywhere else.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedInvite {
    /// Invite id
    pub invite_id: InviteId,
    /// Role granted
    pub role: StaffRole,
    /// One-time token
    pub token: String,
    /// `eventhaiti://staff-invite?...`
    pub deep_link: String,
    /// Expiry
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for IssuedInvite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedInvite")
            .field("invite_id", &self.invite_id)
            .field("role", &self.role)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Staff of one event, seen by one caller.
#[derive(Clone, Debug)]
pub struct StaffState {
    /// Event id
    pub event_id: EventId,
    /// Event document
    pub event: Event,
    /// Caller
    pub actor: UserId,
    /// Invites by id
    pub invites: BTreeMap<InviteId, StaffInvite>,
    /// Members by user id
    pub members: BTreeMap<UserId, StaffMember>,
    /// Invite issued by the last create
    pub issued: Option<IssuedInvite>,
    /// Last refusal or failure
    pub last_error: Option<StaffError>,
}

impl StaffState {
    /// State for `actor` acting on `event`.
    #[must_use]
    pub const fn new(
        event_id: EventId,
        event: Event,
        actor: UserId,
        invites: BTreeMap<InviteId, StaffInvite>,
        members: BTreeMap<UserId, StaffMember>,
    ) -> Self {
        Self {
            event_id,
            event,
            actor,
            invites,
            members,
            issued: None,
            last_error: None,
        }
    }

    fn actor_membership(&self) -> Option<&StaffMember> {
        self.members.get(&self.actor)
    }

    fn actor_is_organizer(&self) -> bool {
        self.event.is_organizer(&self.actor)
    }

    fn actor_can_manage(&self) -> bool {
        can_manage(&self.event, &self.actor, self.actor_membership())
    }
}

/// Dependencies of the staff reducer.
#[derive(Clone)]
pub struct StaffEnvironment {
    /// Timestamps
    pub clock: Arc<dyn Clock>,
    /// Invite ids
    pub ids: Arc<dyn IdGenerator>,
    /// Invite tokens
    pub secrets: Arc<dyn SecretGenerator>,
    /// Staff documents
    pub documents: Arc<dyn DocumentStore>,
}

impl StaffEnvironment {
    /// Bundle the dependencies.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        secrets: Arc<dyn SecretGenerator>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            clock,
            ids,
            secrets,
            documents,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for event staff.
#[derive(Clone, Debug, Default)]
pub struct StaffReducer;

type Effects = SmallVec<[Effect<StaffAction>; 4]>;

impl StaffReducer {
    /// Creates a new `StaffReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn fail(state: &mut StaffState, error: StaffError) -> Effects {
        tracing::debug!(event = %state.event_id, actor = %state.actor, %error, "Staff action refused");
        state.last_error = Some(error);
        SmallVec::new()
    }

    fn persist(env: &StaffEnvironment, writes: Vec<DocumentWrite>) -> Effects {
        smallvec![write_documents(&env.documents, writes, StaffAction::Persisted, |e| {
            StaffAction::PersistFailed { message: e.to_string() }
        })]
    }
}

impl Reducer for StaffReducer {
    type State = StaffState;
    type Action = StaffAction;
    type Environment = StaffEnvironment;

    fn reduce(&self, state: &mut Self::State, action: Self::Action, env: &Self::Environment) -> Effects {
        let now = env.clock.now();

        match action {
            // ========== Invites ==========
            StaffAction::CreateInvite { role } => {
                state.last_error = None;
                if !state.actor_can_manage() {
                    return Self::fail(state, StaffError::Forbidden("Only the organizer or a manager can invite staff"));
                }
                if role == StaffRole::Manager && !state.actor_is_organizer() {
                    return Self::fail(state, StaffError::Forbidden("Only the organizer can invite managers"));
                }

                let invite_id = InviteId::new(env.ids.next_id());
                let token = env.secrets.invite_token();
                let invite = StaffInvite {
                    event_id: state.event_id.clone(),
                    role,
                    token_hash: hash_secret(state.event_id.as_str(), &token),
                    created_by: state.actor.clone(),
                    created_at: now,
                    expires_at: now + Duration::days(INVITE_TTL_DAYS),
                    status: InviteStatus::Pending,
                    redeemed_by: None,
                    closed_at: None,
                };
                let deep_link = DeepLink::StaffInvite {
                    event_id: state.event_id.clone(),
                    token: token.clone(),
                }
                .to_url();
                tracing::info!(event = %state.event_id, invite = %invite_id, %role, "Staff invite created");

                let write = DocumentWrite::set(StaffInvite::path(&state.event_id, &invite_id), &invite);
                state.issued = Some(IssuedInvite {
                    invite_id: invite_id.clone(),
                    role,
                    token,
                    deep_link,
                    expires_at: invite.expires_at,
                });
                state.invites.insert(invite_id, invite);
                Self::persist(env, vec![write])
            },

            StaffAction::RevokeInvite { invite_id } => {
                state.last_error = None;
                if !state.actor_can_manage() {
                    return Self::fail(state, StaffError::Forbidden("Only the organizer or a manager can revoke invites"));
                }
                let Some(invite) = state.invites.get_mut(&invite_id) else {
                    return Self::fail(state, StaffError::InviteNotFound);
                };
                if invite.status != InviteStatus::Pending {
                    let status = invite.status;
                    return Self::fail(state, StaffError::InviteClosed(status));
                }

                invite.status = InviteStatus::Revoked;
                invite.closed_at = Some(now);
                let write = DocumentWrite::set(StaffInvite::path(&state.event_id, &invite_id), &*invite);
                Self::persist(env, vec![write])
            },

            StaffAction::Redeem { token } => {
                state.last_error = None;
                if state.actor_is_organizer() {
                    return Self::fail(state, StaffError::AlreadyOrganizer);
                }
                let scope = state.event_id.as_str().to_string();
                let Some((invite_id, invite)) = state
                    .invites
                    .iter_mut()
                    .find(|(_, invite)| verify_secret(&scope, token.0.trim(), &invite.token_hash))
                else {
                    return Self::fail(state, StaffError::InviteNotFound);
                };
                if invite.status != InviteStatus::Pending {
                    let status = invite.status;
                    return Self::fail(state, StaffError::InviteClosed(status));
                }
                if now > invite.expires_at {
                    return Self::fail(state, StaffError::InviteExpired);
                }
                // Redeeming never demotes, and leaves the invite usable
                if let Some(current) = state.members.get(&state.actor).map(|m| m.role) {
                    if current >= invite.role {
                        return Self::fail(state, StaffError::AlreadyMember(current));
                    }
                }

                invite.status = InviteStatus::Redeemed;
                invite.redeemed_by = Some(state.actor.clone());
                invite.closed_at = Some(now);
                let member = StaffMember {
                    event_id: state.event_id.clone(),
                    user_id: state.actor.clone(),
                    role: invite.role,
                    invited_by: invite.created_by.clone(),
                    joined_at: now,
                };
                tracing::info!(event = %state.event_id, invite = %invite_id, member = %state.actor, role = %member.role, "Staff invite redeemed");

                let writes = vec![
                    DocumentWrite::set(StaffInvite::path(&state.event_id, invite_id), &*invite),
                    DocumentWrite::set(StaffMember::path(&state.event_id, &state.actor), &member),
                ];
                state.members.insert(state.actor.clone(), member);
                Self::persist(env, writes)
            },

            // ========== Members ==========
            StaffAction::RemoveMember { user_id } => {
                state.last_error = None;
                let Some(target_role) = state.members.get(&user_id).map(|m| m.role) else {
                    return Self::fail(state, StaffError::MemberNotFound(user_id));
                };
                let leaving = user_id == state.actor;
                if !leaving {
                    if !state.actor_can_manage() {
                        return Self::fail(state, StaffError::Forbidden("Only the organizer or a manager can remove staff"));
                    }
                    if target_role == StaffRole::Manager && !state.actor_is_organizer() {
                        return Self::fail(state, StaffError::Forbidden("Only the organizer can remove managers"));
                    }
                }

                state.members.remove(&user_id);
                tracing::info!(event = %state.event_id, member = %user_id, by = %state.actor, "Staff member removed");
                Self::persist(env, vec![DocumentWrite::delete(StaffMember::path(&state.event_id, &user_id))])
            },

            // ========== Persistence results ==========
            StaffAction::Persisted => SmallVec::new(),

            StaffAction::PersistFailed { message } => {
                state.issued = None;
                state.last_error = Some(StaffError::Storage(message));
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::secrets::FixedSecretGenerator;
    use crate::types::{EventStatus, TicketTier};
    use eventhaiti_runtime::Store;
    use eventhaiti_testing::{InMemoryDocumentStore, ReducerTest, SequentialIdGenerator, assertions, test_clock};

    const TOKEN: &str = "tok_abcdefghijklmnopqrstuvwxyz0123456789ABCDEF";

    fn event() -> Event {
        let now = test_clock().now();
        Event {
            organizer_id: UserId::new("org_1"),
            title: "Carnaval".to_string(),
            description: String::new(),
            category: String::new(),
            venue: "Jacmel".to_string(),
            city: "Jacmel".to_string(),
            address: String::new(),
            country: "HT".to_string(),
            start_at: now + Duration::days(10),
            end_at: now + Duration::days(11),
            ticket_tiers: vec![TicketTier {
                name: "GA".to_string(),
                price_cents: crate::types::Cents::new(1000),
                quantity: 10,
            }],
            status: EventStatus::Published,
            created_at: now,
        }
    }

    fn test_env(documents: InMemoryDocumentStore) -> StaffEnvironment {
        StaffEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(SequentialIdGenerator::new("inv")),
            Arc::new(FixedSecretGenerator::new(TOKEN, "000000")),
            Arc::new(documents),
        )
    }

    fn member(user: &str, role: StaffRole) -> (UserId, StaffMember) {
        (
            UserId::new(user),
            StaffMember {
                event_id: EventId::new("evt_1"),
                user_id: UserId::new(user),
                role,
                invited_by: UserId::new("org_1"),
                joined_at: test_clock().now(),
            },
        )
    }

    fn pending_invite(role: StaffRole, expires_in: Duration) -> (InviteId, StaffInvite) {
        let now = test_clock().now();
        (
            InviteId::new("inv_0"),
            StaffInvite {
                event_id: EventId::new("evt_1"),
                role,
                token_hash: hash_secret("evt_1", TOKEN),
                created_by: UserId::new("org_1"),
                created_at: now,
                expires_at: now + expires_in,
                status: InviteStatus::Pending,
                redeemed_by: None,
                closed_at: None,
            },
        )
    }

    fn state_for(actor: &str, invites: Vec<(InviteId, StaffInvite)>, members: Vec<(UserId, StaffMember)>) -> StaffState {
        StaffState::new(
            EventId::new("evt_1"),
            event(),
            UserId::new(actor),
            invites.into_iter().collect(),
            members.into_iter().collect(),
        )
    }

    #[test]
    fn permissions() {
        let e = event();
        let scanner = member("sam", StaffRole::Scanner).1;
        let manager = member("max", StaffRole::Manager).1;

        assert!(can_scan(&e, &UserId::new("org_1"), None));
        assert!(can_scan(&e, &UserId::new("sam"), Some(&scanner)));
        assert!(!can_scan(&e, &UserId::new("eve"), None));
        assert!(!can_manage(&e, &UserId::new("sam"), Some(&scanner)));
        assert!(can_manage(&e, &UserId::new("max"), Some(&manager)));
        // A membership document for someone else grants nothing
        assert!(!can_scan(&e, &UserId::new("eve"), Some(&scanner)));
    }

    #[tokio::test]
    async fn organizer_issues_an_invite_with_a_deep_link() {
        let documents = InMemoryDocumentStore::new();
        let store = Store::new(state_for("org_1", vec![], vec![]), StaffReducer::new(), test_env(documents.clone()));

        store.send(StaffAction::CreateInvite { role: StaffRole::Scanner }).await.unwrap();

        let state = store.into_state();
        let issued = state.issued.unwrap();
        assert_eq!(issued.token, TOKEN);
        assert_eq!(
            DeepLink::parse(&issued.deep_link).unwrap(),
            DeepLink::StaffInvite {
                event_id: EventId::new("evt_1"),
                token: TOKEN.to_string()
            }
        );
        assert_eq!(issued.expires_at, test_clock().now() + Duration::days(7));

        let stored = documents
            .raw(&StaffInvite::path(&EventId::new("evt_1"), &issued.invite_id))
            .unwrap();
        assert_eq!(stored["status"], "pending");
        assert!(!stored.to_string().contains(TOKEN));
    }

    #[test]
    fn scanners_cannot_invite_and_managers_cannot_invite_managers() {
        ReducerTest::new(StaffReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state_for("sam", vec![], vec![member("sam", StaffRole::Scanner)]))
            .when_action(StaffAction::CreateInvite { role: StaffRole::Scanner })
            .then_state(|state| assert!(matches!(state.last_error, Some(StaffError::Forbidden(_)))))
            .then_effects(assertions::assert_no_effects)
            .run();

        ReducerTest::new(StaffReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state_for("max", vec![], vec![member("max", StaffRole::Manager)]))
            .when_action(StaffAction::CreateInvite { role: StaffRole::Manager })
            .then_state(|state| {
                assert_eq!(
                    state.last_error,
                    Some(StaffError::Forbidden("Only the organizer can invite managers"))
                );
            })
            .run();
    }

    #[tokio::test]
    async fn redeeming_creates_a_member() {
        let documents = InMemoryDocumentStore::new();
        let store = Store::new(
            state_for("sam", vec![pending_invite(StaffRole::Scanner, Duration::days(7))], vec![]),
            StaffReducer::new(),
            test_env(documents.clone()),
        );

        store
            .send(StaffAction::Redeem {
                token: Redacted(TOKEN.to_string()),
            })
            .await
            .unwrap();

        let state = store.into_state();
        assert!(state.last_error.is_none());
        assert_eq!(state.members[&UserId::new("sam")].role, StaffRole::Scanner);
        let member = documents
            .raw(&StaffMember::path(&EventId::new("evt_1"), &UserId::new("sam")))
            .unwrap();
        assert_eq!(member["role"], "scanner");
        let invite = documents
            .raw(&StaffInvite::path(&EventId::new("evt_1"), &InviteId::new("inv_0")))
            .unwrap();
        assert_eq!(invite["status"], "redeemed");
        assert_eq!(invite["redeemedBy"], "sam");
    }

    #[test]
    fn tokens_work_once_and_not_after_expiry() {
        let (id, mut used) = pending_invite(StaffRole::Scanner, Duration::days(7));
        used.status = InviteStatus::Redeemed;
        ReducerTest::new(StaffReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state_for("sam", vec![(id, used)], vec![]))
            .when_action(StaffAction::Redeem {
                token: Redacted(TOKEN.to_string()),
            })
            .then_state(|state| {
                assert_eq!(state.last_error, Some(StaffError::InviteClosed(InviteStatus::Redeemed)));
            })
            .run();

        ReducerTest::new(StaffReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state_for(
                "sam",
                vec![pending_invite(StaffRole::Scanner, Duration::seconds(-1))],
                vec![],
            ))
            .when_action(StaffAction::Redeem {
                token: Redacted(TOKEN.to_string()),
            })
            .then_state(|state| assert_eq!(state.last_error, Some(StaffError::InviteExpired)))
            .run();

        ReducerTest::new(StaffReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state_for(
                "sam",
                vec![pending_invite(StaffRole::Scanner, Duration::days(7))],
                vec![],
            ))
            .when_action(StaffAction::Redeem {
                token: Redacted("wrong".to_string()),
            })
            .then_state(|state| assert_eq!(state.last_error, Some(StaffError::InviteNotFound)))
            .run();
    }

    #[test]
    fn managers_are_not_demoted_by_a_scanner_invite() {
        ReducerTest::new(StaffReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state_for(
                "max",
                vec![pending_invite(StaffRole::Scanner, Duration::days(7))],
                vec![member("max", StaffRole::Manager)],
            ))
            .when_action(StaffAction::Redeem {
                token: Redacted(TOKEN.to_string()),
            })
            .then_state(|state| {
                assert_eq!(state.last_error, Some(StaffError::AlreadyMember(StaffRole::Manager)));
                assert_eq!(state.members[&UserId::new("max")].role, StaffRole::Manager);
                assert_eq!(state.invites[&InviteId::new("inv_0")].status, InviteStatus::Pending);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn revoked_invites_are_closed() {
        ReducerTest::new(StaffReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state_for(
                "org_1",
                vec![pending_invite(StaffRole::Manager, Duration::days(7))],
                vec![],
            ))
            .when_actions([
                StaffAction::RevokeInvite {
                    invite_id: InviteId::new("inv_0"),
                },
                StaffAction::RevokeInvite {
                    invite_id: InviteId::new("inv_0"),
                },
            ])
            .then_state(|state| {
                assert_eq!(state.invites[&InviteId::new("inv_0")].status, InviteStatus::Revoked);
                assert_eq!(state.last_error, Some(StaffError::InviteClosed(InviteStatus::Revoked)));
            })
            .run();
    }

    #[test]
    fn only_the_organizer_removes_managers() {
        ReducerTest::new(StaffReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state_for(
                "max",
                vec![],
                vec![member("max", StaffRole::Manager), member("mia", StaffRole::Manager)],
            ))
            .when_action(StaffAction::RemoveMember {
                user_id: UserId::new("mia"),
            })
            .then_state(|state| {
                assert_eq!(
                    state.last_error,
                    Some(StaffError::Forbidden("Only the organizer can remove managers"))
                );
                assert_eq!(state.members.len(), 2);
            })
            .run();

        ReducerTest::new(StaffReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state_for(
                "org_1",
                vec![],
                vec![member("mia", StaffRole::Manager)],
            ))
            .when_action(StaffAction::RemoveMember {
                user_id: UserId::new("mia"),
            })
            .then_state(|state| {
                assert!(state.last_error.is_none());
                assert!(state.members.is_empty());
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn members_can_leave() {
        ReducerTest::new(StaffReducer::new())
            .with_env(test_env(InMemoryDocumentStore::new()))
            .given_state(state_for("sam", vec![], vec![member("sam", StaffRole::Scanner)]))
            .when_action(StaffAction::RemoveMember {
                user_id: UserId::new("sam"),
            })
            .then_state(|state| assert!(state.members.is_empty()))
            .run();
    }

    #[tokio::test]
    async fn load_staff_reads_both_collections() {
        let documents = InMemoryDocumentStore::new();
        let event_id = EventId::new("evt_1");
        let (invite_id, invite) = pending_invite(StaffRole::Scanner, Duration::days(1));
        let (user, staff) = member("sam", StaffRole::Scanner);
        documents.insert(&StaffInvite::path(&event_id, &invite_id), serde_json::to_value(&invite).unwrap());
        documents.insert(&StaffMember::path(&event_id, &user), serde_json::to_value(&staff).unwrap());

        let (invites, members) = load_staff(&documents, &event_id).await.unwrap();
        assert_eq!(invites[&invite_id], invite);
        assert_eq!(members[&user], staff);
        assert_eq!(load_membership(&documents, &event_id, &user).await.unwrap(), Some(staff));
    }
}

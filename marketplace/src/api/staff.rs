//! Event staff and door scanning endpoints.
//!
//! - GET /api/staff/:event_id - Invites and members (managers only)
//! - POST /api/staff/invites/create - Issue an invite deep link
//! - POST /api/staff/invites/revoke - Withdraw a pending invite
//! - POST /api/staff/invites/redeem - Join an event with a token
//! - POST /api/staff/members/remove - Remove a member (or leave)
//! - POST /api/staff/check-in - Scan a ticket at the door

use super::{caller, run};
use crate::checkin::scan_ticket;
use crate::payouts::Redacted;
use crate::server::state::AppState;
use crate::staff::{
    IssuedInvite, StaffAction, StaffEnvironment, StaffError, StaffInvite, StaffMember, StaffReducer, StaffRole,
    StaffState, can_manage, load_staff,
};
use crate::types::{EventId, InviteId, Ticket, TicketId, UserId, load_event};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use eventhaiti_web::{AppError, AuthenticatedUser};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Issue an invite.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteRequest {
    /// Event
    pub event_id: EventId,
    /// Role to grant
    pub role: StaffRole,
}

/// Withdraw an invite.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeInviteRequest {
    /// Event
    pub event_id: EventId,
    /// Invite
    pub invite_id: InviteId,
}

/// Redeem an invite token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemInviteRequest {
    /// Event from the deep link
    pub event_id: EventId,
    /// Token from the deep link
    pub token: String,
}

/// Remove a member.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMemberRequest {
    /// Event
    pub event_id: EventId,
    /// Member to remove; the caller to leave
    pub user_id: UserId,
}

/// Scan a ticket.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    /// Event at the door
    pub event_id: EventId,
    /// Scanned ticket
    pub ticket_id: TicketId,
}

/// Staff of an event.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffResponse {
    /// Invites by id
    pub invites: BTreeMap<InviteId, StaffInvite>,
    /// Members by user id
    pub members: BTreeMap<UserId, StaffMember>,
}

/// Outcome of a revoke or remove.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffChangeResponse {
    /// Always `"ok"`
    pub status: &'static str,
}

/// A scanned ticket.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResponse {
    /// Ticket id
    pub ticket_id: TicketId,
    /// The ticket after check-in
    pub ticket: Ticket,
}

// ============================================================================
// Helpers
// ============================================================================

async fn dispatch(state: &AppState, event_id: EventId, actor: UserId, action: StaffAction) -> Result<StaffState, AppError> {
    let event = load_event(state.documents.as_ref(), &event_id)
        .await?
        .ok_or_else(|| AppError::not_found("Event", &event_id))?;
    let (invites, members) = load_staff(state.documents.as_ref(), &event_id).await?;
    let env = StaffEnvironment::new(
        state.clock.clone(),
        state.ids.clone(),
        state.secrets.clone(),
        state.documents.clone(),
    );
    let result = run(
        StaffReducer::new(),
        StaffState::new(event_id, event, actor, invites, members),
        env,
        action,
    )
    .await?;
    match result.last_error {
        Some(error) => Err(error.into()),
        None => Ok(result),
    }
}

const OK: StaffChangeResponse = StaffChangeResponse { status: "ok" };

// ============================================================================
// Handlers
// ============================================================================

/// Invites and members of an event.
pub async fn list_staff(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<StaffResponse>, AppError> {
    let user = caller(&identity);
    let event = load_event(state.documents.as_ref(), &event_id)
        .await?
        .ok_or_else(|| AppError::not_found("Event", &event_id))?;
    let (invites, members) = load_staff(state.documents.as_ref(), &event_id).await?;
    if !can_manage(&event, &user, members.get(&user)) {
        return Err(StaffError::Forbidden("Only the organizer or a manager can view staff").into());
    }
    Ok(Json(StaffResponse { invites, members }))
}

/// Issue an invite. The token is only ever returned here.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/staff/invites/create \
///   -H "Authorization: Bearer <id_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"eventId": "evt_123", "role": "scanner"}'
/// ```
pub async fn create_invite(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<CreateInviteRequest>,
) -> Result<(StatusCode, Json<IssuedInvite>), AppError> {
    let result = dispatch(
        &state,
        request.event_id,
        caller(&identity),
        StaffAction::CreateInvite { role: request.role },
    )
    .await?;
    let issued = result
        .issued
        .ok_or_else(|| AppError::internal("Invite was not issued"))?;
    Ok((StatusCode::CREATED, Json(issued)))
}

/// Withdraw a pending invite.
pub async fn revoke_invite(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<RevokeInviteRequest>,
) -> Result<Json<StaffChangeResponse>, AppError> {
    dispatch(
        &state,
        request.event_id,
        caller(&identity),
        StaffAction::RevokeInvite {
            invite_id: request.invite_id,
        },
    )
    .await?;
    Ok(Json(OK))
}

/// Join an event's staff with an invite token.
pub async fn redeem_invite(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<RedeemInviteRequest>,
) -> Result<Json<StaffMember>, AppError> {
    let user = caller(&identity);
    let result = dispatch(
        &state,
        request.event_id,
        user.clone(),
        StaffAction::Redeem {
            token: Redacted(request.token),
        },
    )
    .await?;
    result
        .members
        .get(&user)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::internal("Membership was not recorded"))
}

/// Remove a member. Members may remove themselves.
pub async fn remove_member(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<RemoveMemberRequest>,
) -> Result<Json<StaffChangeResponse>, AppError> {
    dispatch(
        &state,
        request.event_id,
        caller(&identity),
        StaffAction::RemoveMember {
            user_id: request.user_id,
        },
    )
    .await?;
    Ok(Json(OK))
}

/// Check a ticket in at the door.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/staff/check-in \
///   -H "Authorization: Bearer <id_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"eventId": "evt_123", "ticketId": "tkt_456"}'
/// ```
pub async fn check_in(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<CheckInRequest>,
) -> Result<Json<CheckInResponse>, AppError> {
    let ticket = scan_ticket(
        state.documents.as_ref(),
        state.clock.as_ref(),
        &request.event_id,
        &request.ticket_id,
        &caller(&identity),
    )
    .await?;
    Ok(Json(CheckInResponse {
        ticket_id: request.ticket_id,
        ticket,
    }))
}

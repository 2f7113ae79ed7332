//! Refund request endpoints.
//!
//! - POST /api/refunds/request - Ticket holder asks for a refund
//! - POST /api/refunds/process - Organizer approves or denies it

use super::{caller, run};
use crate::deeplinks::DeepLink;
use crate::push::{PushMessage, notify_user};
use crate::refunds::{
    RefundAction, RefundEnvironment, RefundReducer, RefundRequest, RefundState, RefundStatus, load_refund_request,
};
use crate::server::state::AppState;
use crate::types::{TicketId, UserId, load_event, load_ticket};
use axum::{Json, extract::State, http::StatusCode};
use eventhaiti_web::{AppError, AuthenticatedUser};
use serde::Deserialize;

/// Body of a refund request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRefund {
    /// Ticket to refund
    pub ticket_id: TicketId,
    /// Why
    pub reason: String,
}

/// Organizer decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundDecision {
    /// Grant the refund
    Approve,
    /// Refuse it
    Deny,
}

/// Body of a decision.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRefund {
    /// Ticket whose request is decided
    pub ticket_id: TicketId,
    /// `approve` or `deny`
    pub action: RefundDecision,
    /// Required when denying
    #[serde(default)]
    pub reason: Option<String>,
}

async fn dispatch(
    state: &AppState,
    actor: UserId,
    ticket_id: TicketId,
    action: RefundAction,
) -> Result<RefundRequest, AppError> {
    let store = state.documents.as_ref();
    let ticket = load_ticket(store, &ticket_id)
        .await?
        .ok_or_else(|| AppError::not_found("Ticket", &ticket_id))?;
    let event = load_event(store, &ticket.event_id)
        .await?
        .ok_or_else(|| AppError::not_found("Event", &ticket.event_id))?;
    let request = load_refund_request(store, &ticket_id).await?;

    let result = run(
        RefundReducer::new(),
        RefundState::new(actor, ticket_id.clone(), ticket, event, request),
        RefundEnvironment::new(state.clock.clone(), state.documents.clone()),
        action,
    )
    .await?;
    if let Some(error) = result.last_error {
        return Err(error.into());
    }
    result
        .request
        .ok_or_else(|| AppError::not_found("Refund request", ticket_id))
}

/// File a refund request for a ticket the caller holds.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/refunds/request \
///   -H "Authorization: Bearer <id_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"ticketId": "tkt_456", "reason": "I cannot attend anymore"}'
/// ```
pub async fn request_refund(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(body): Json<RequestRefund>,
) -> Result<(StatusCode, Json<RefundRequest>), AppError> {
    let request = dispatch(
        &state,
        caller(&identity),
        body.ticket_id,
        RefundAction::Request { reason: body.reason },
    )
    .await?;

    let message = PushMessage::with_link(
        "New refund request",
        format!("A ticket holder asked for {} back.", request.amount),
        DeepLink::Event(request.event_id.clone()).to_url(),
    );
    notify_user(state.documents.as_ref(), state.push.as_ref(), &request.organizer_id, message).await;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Approve or deny a pending request, then notify the holder.
pub async fn process_refund(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(body): Json<ProcessRefund>,
) -> Result<Json<RefundRequest>, AppError> {
    let action = match body.action {
        RefundDecision::Approve => RefundAction::Approve,
        RefundDecision::Deny => RefundAction::Deny {
            reason: body.reason.unwrap_or_default(),
        },
    };
    let ticket_id = body.ticket_id;
    let request = dispatch(&state, caller(&identity), ticket_id.clone(), action).await?;

    let (title, text) = match request.status {
        RefundStatus::Approved => ("Refund approved", format!("{} will be returned to you.", request.amount)),
        _ => (
            "Refund denied",
            request
                .denial_reason
                .clone()
                .unwrap_or_else(|| "The organizer denied your request.".to_string()),
        ),
    };
    let message = PushMessage::with_link(title, text, DeepLink::Ticket(ticket_id).to_url());
    notify_user(state.documents.as_ref(), state.push.as_ref(), &request.attendee_id, message).await;
    Ok(Json(request))
}

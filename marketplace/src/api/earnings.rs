//! Earnings, analytics and withdrawal endpoints.
//!
//! - GET /api/organizer/earnings/:event_id - Earnings of one event
//! - GET /api/organizer/analytics - Earnings of every event of the caller
//! - POST /api/organizer/withdraw-moncash - Withdraw to a verified MonCash wallet
//! - POST /api/organizer/withdraw-bank - Withdraw to a verified bank account

use super::errors::withdrawal_rejection;
use super::{caller, run};
use crate::earnings::{
    EventEarnings, OrganizerAnalytics, Withdrawal, WithdrawalAction, WithdrawalEnvironment, WithdrawalReducer,
    WithdrawalState, load_event_earnings, load_organizer_analytics,
};
use crate::payouts::{WithdrawalMethod, load_destinations};
use crate::server::state::AppState;
use crate::types::{Cents, EventId, WithdrawalId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use eventhaiti_runtime::metrics::MarketplaceMetrics;
use eventhaiti_web::{AppError, AuthenticatedUser};
use serde::{Deserialize, Serialize};

/// Body of a withdrawal request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    /// Event the money comes from
    pub event_id: EventId,
    /// Amount in cents; the whole balance when omitted
    #[serde(default)]
    pub amount: Option<Cents>,
}

/// A recorded withdrawal and the balance left.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawResponse {
    /// New withdrawal id
    pub withdrawal_id: WithdrawalId,
    /// The withdrawal
    pub withdrawal: Withdrawal,
    /// Earnings after the withdrawal
    pub earnings: EventEarnings,
}

/// Earnings of one event. Only its organizer (or an admin) may look.
pub async fn event_earnings(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<EventEarnings>, AppError> {
    let earnings = load_event_earnings(state.documents.as_ref(), &event_id, state.clock.now(), &state.policy)
        .await?
        .ok_or_else(|| AppError::not_found("Event", &event_id))?;
    if earnings.organizer_id != caller(&identity) && !identity.is_admin {
        return Err(AppError::forbidden("Only the event organizer can view its earnings"));
    }
    Ok(Json(earnings))
}

/// Earnings across every event of the caller.
pub async fn analytics(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
) -> Result<Json<OrganizerAnalytics>, AppError> {
    let analytics =
        load_organizer_analytics(state.documents.as_ref(), &caller(&identity), state.clock.now(), &state.policy).await?;
    Ok(Json(analytics))
}

async fn withdraw(
    state: &AppState,
    identity: &eventhaiti_web::Identity,
    method: WithdrawalMethod,
    request: WithdrawRequest,
) -> Result<(StatusCode, Json<WithdrawResponse>), AppError> {
    let organizer = caller(identity);
    let earnings = load_event_earnings(state.documents.as_ref(), &request.event_id, state.clock.now(), &state.policy)
        .await?
        .ok_or_else(|| AppError::not_found("Event", &request.event_id))?;
    let destinations = load_destinations(state.documents.as_ref(), &organizer).await?;

    let env = WithdrawalEnvironment::new(
        state.clock.clone(),
        state.ids.clone(),
        state.documents.clone(),
        state.policy,
    );
    let result = run(
        WithdrawalReducer::new(),
        WithdrawalState::new(organizer, earnings, destinations),
        env,
        WithdrawalAction::Request {
            method,
            amount: request.amount,
        },
    )
    .await?;

    if let Some(error) = result.last_error {
        MarketplaceMetrics::record_withdrawal_rejected(withdrawal_rejection(&error));
        return Err(error.into());
    }
    let (withdrawal_id, withdrawal) = result
        .withdrawal
        .ok_or_else(|| AppError::internal("Withdrawal was not recorded"))?;
    MarketplaceMetrics::record_withdrawal(method.as_str());
    tracing::info!(
        %withdrawal_id,
        event = %withdrawal.event_id,
        amount = %withdrawal.amount,
        %method,
        "Withdrawal requested"
    );

    Ok((
        StatusCode::CREATED,
        Json(WithdrawResponse {
            withdrawal_id,
            withdrawal,
            earnings: result.earnings,
        }),
    ))
}

/// Withdraw to a verified MonCash wallet.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/organizer/withdraw-moncash \
///   -H "Authorization: Bearer <id_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"eventId": "evt_123", "amount": 10000}'
/// ```
pub async fn withdraw_moncash(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<WithdrawRequest>,
) -> Result<(StatusCode, Json<WithdrawResponse>), AppError> {
    withdraw(&state, &identity, WithdrawalMethod::Moncash, request).await
}

/// Withdraw to a verified bank account.
pub async fn withdraw_bank(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<WithdrawRequest>,
) -> Result<(StatusCode, Json<WithdrawResponse>), AppError> {
    withdraw(&state, &identity, WithdrawalMethod::Bank, request).await
}

//! Event publishing.
//!
//! - POST /api/events - Validate a finished wizard draft and publish it

use super::{caller, run};
use crate::server::state::AppState;
use crate::types::EventId;
use crate::wizard::{EventDraft, WizardAction, WizardEnvironment, WizardReducer, WizardState};
use axum::{Json, extract::State, http::StatusCode};
use eventhaiti_web::{AppError, AuthenticatedUser};
use serde::{Deserialize, Serialize};

/// Body of a publish call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    /// The wizard's draft
    pub draft: EventDraft,
}

/// A published event.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventResponse {
    /// New event id
    pub event_id: EventId,
}

/// Publish an event from a draft.
///
/// Validation failures are 422 with `details.step` naming the wizard page
/// to send the user back to.
pub async fn create_event(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<CreateEventResponse>), AppError> {
    let wizard = WizardState::load(state.documents.as_ref(), caller(&identity), request.draft).await?;
    let env = WizardEnvironment::new(state.clock.clone(), state.ids.clone(), state.documents.clone());
    let result = run(WizardReducer::new(), wizard, env, WizardAction::Submit).await?;

    if let Some(error) = result.last_error {
        return Err(error.into());
    }
    let event_id = result
        .submitted_event
        .ok_or_else(|| AppError::internal("Event was not recorded"))?;
    tracing::info!(%event_id, organizer = %identity.uid, "Event published");
    Ok((StatusCode::CREATED, Json(CreateEventResponse { event_id })))
}

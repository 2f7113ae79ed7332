//! Identity verification endpoints.
//!
//! Organizer side:
//! - GET /api/verification - Load (creating on first access) the caller's request
//! - PATCH /api/verification/steps/:step - Merge a partial step update
//! - POST /api/verification/files - Upload a document (multipart: `documentType`, `file`)
//! - POST /api/verification/submit - Submit for review
//! - POST /api/verification/reapply - Re-open a rejected request
//!
//! Admin side:
//! - POST /api/admin/verification/:user_id/:decision - `begin-review`, `approve`, `request-changes`, `reject`

use super::{UploadForm, caller, run};
use crate::server::state::AppState;
use crate::types::UserId;
use crate::verification::{
    DocumentType, StepId, StepPatch, VerificationAction, VerificationEnvironment, VerificationReducer,
    VerificationRequest, VerificationState,
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use eventhaiti_core::documents;
use eventhaiti_runtime::metrics::MarketplaceMetrics;
use eventhaiti_web::{AdminUser, AppError, AuthenticatedUser};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// A verification request with derived progress.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    /// The stored document
    #[serde(flatten)]
    pub request: VerificationRequest,
    /// Percentage of required steps complete
    pub completion_percentage: u8,
    /// Required steps not yet complete
    pub missing_required_steps: Vec<StepId>,
}

impl From<VerificationRequest> for VerificationResponse {
    fn from(request: VerificationRequest) -> Self {
        Self {
            completion_percentage: request.completion_percentage(),
            missing_required_steps: request.missing_required_steps(),
            request,
        }
    }
}

/// Admin decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewDecision {
    /// Take the request into review
    BeginReview,
    /// Approve the organizer
    Approve,
    /// Send named steps back
    RequestChanges,
    /// Reject the request
    Reject,
}

/// Body of an admin decision.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    /// Notes for approve / request-changes
    #[serde(default)]
    pub notes: Option<String>,
    /// Steps to flag for request-changes
    #[serde(default)]
    pub steps: Vec<StepId>,
    /// Reason for reject
    #[serde(default)]
    pub reason: Option<String>,
}

// ============================================================================
// Helpers
// ============================================================================

fn environment(state: &AppState) -> VerificationEnvironment {
    VerificationEnvironment::new(state.clock.clone(), state.documents.clone(), state.files.clone())
}

async fn dispatch(state: &AppState, user: UserId, action: VerificationAction) -> Result<VerificationResponse, AppError> {
    let request = documents::load::<VerificationRequest>(state.documents.as_ref(), &VerificationRequest::path(&user)).await?;
    let result = run(
        VerificationReducer::new(),
        VerificationState::new(user.clone(), request),
        environment(state),
        action,
    )
    .await?;

    if let Some(error) = result.last_error {
        return Err(error.into());
    }
    result
        .request
        .map(VerificationResponse::from)
        .ok_or_else(|| AppError::not_found("Verification request", user))
}

// ============================================================================
// Handlers
// ============================================================================

/// Load the caller's verification request, creating it with the default steps.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/api/verification -H "Authorization: Bearer <id_token>"
/// ```
pub async fn get_verification(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
) -> Result<Json<VerificationResponse>, AppError> {
    dispatch(&state, caller(&identity), VerificationAction::Initialize).await.map(Json)
}

/// Merge a partial update into one step.
///
/// # Example
///
/// ```bash
/// curl -X PATCH http://localhost:8080/api/verification/steps/organizerInfo \
///   -H "Authorization: Bearer <id_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"status": "complete", "fields": {"fullName": "Marie Joseph"}}'
/// ```
pub async fn update_step(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Path(step): Path<StepId>,
    Json(patch): Json<StepPatch>,
) -> Result<Json<VerificationResponse>, AppError> {
    dispatch(&state, caller(&identity), VerificationAction::UpdateStep { step, patch })
        .await
        .map(Json)
}

/// Upload a verification document.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/verification/files \
///   -H "Authorization: Bearer <id_token>" \
///   -F documentType=governmentIdFront -F file=@id-front.jpg
/// ```
pub async fn upload_file(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<VerificationResponse>, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let document_type: DocumentType = form.field("documentType")?.parse()?;
    let upload = form.take_file()?;

    let response = dispatch(
        &state,
        caller(&identity),
        VerificationAction::UploadDocument { document_type, upload },
    )
    .await?;
    MarketplaceMetrics::record_upload(document_type.as_str().to_string());
    Ok(Json(response))
}

/// Submit the request for admin review.
pub async fn submit(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
) -> Result<Json<VerificationResponse>, AppError> {
    let response = dispatch(&state, caller(&identity), VerificationAction::Submit).await?;
    MarketplaceMetrics::record_verification_submitted();
    Ok(Json(response))
}

/// Re-open a rejected request.
pub async fn reapply(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
) -> Result<Json<VerificationResponse>, AppError> {
    dispatch(&state, caller(&identity), VerificationAction::Reapply).await.map(Json)
}

/// Apply an admin decision to a user's request.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/admin/verification/user_123/reject \
///   -H "Authorization: Bearer <admin_id_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"reason": "ID photo is unreadable"}'
/// ```
pub async fn review(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path((user_id, decision)): Path<(String, ReviewDecision)>,
    body: Option<Json<ReviewRequest>>,
) -> Result<Json<VerificationResponse>, AppError> {
    let ReviewRequest { notes, steps, reason } = body.map(|Json(b)| b).unwrap_or_default();
    let reviewer = caller(&admin);
    let action = match decision {
        ReviewDecision::BeginReview => VerificationAction::BeginReview { reviewer },
        ReviewDecision::Approve => VerificationAction::Approve { reviewer, notes },
        ReviewDecision::RequestChanges => VerificationAction::RequestChanges {
            reviewer,
            steps,
            notes: notes.unwrap_or_default(),
        },
        ReviewDecision::Reject => VerificationAction::Reject {
            reviewer,
            reason: reason.unwrap_or_default(),
        },
    };

    let user = UserId::new(user_id);
    let exists = state.documents.get(VerificationRequest::path(&user)).await?.is_some();
    if !exists {
        return Err(AppError::not_found("Verification request", user));
    }
    tracing::info!(%user, admin = %admin.uid, ?decision, "Verification review");
    dispatch(&state, user, action).await.map(Json)
}

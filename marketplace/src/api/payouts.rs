//! Haitian payout destination endpoints.
//!
//! - GET /api/organizer/payout-profiles/haiti - Summary plus every destination
//! - POST /api/organizer/payout-destinations/bank - Register a bank account
//! - POST /api/organizer/payout-destinations/mobile-money - Register a MonCash/NatCash wallet
//! - POST /api/organizer/payout-destinations/:id/primary - Make a destination primary
//! - POST /api/organizer/submit-bank-verification - Upload proof (multipart: `destinationId`, `file`)
//! - POST /api/organizer/send-phone-verification-code - Text a code to a wallet
//! - POST /api/organizer/submit-phone-verification - Confirm the code
//! - POST /api/admin/payout-destinations/:decision - `approve` or `fail`

use super::{UploadForm, caller, run};
use crate::payouts::{
    DestinationKind, DestinationStatus, HaitiPayoutProfile, MobileMoneyProvider, PayoutAction, PayoutDestination,
    PayoutEnvironment, PayoutReducer, PayoutState, Redacted, load_destinations,
};
use crate::push::{PushMessage, notify_user};
use crate::server::state::AppState;
use crate::types::{DestinationId, UserId};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use eventhaiti_runtime::metrics::MarketplaceMetrics;
use eventhaiti_web::{AdminUser, AppError, AuthenticatedUser, ClientIp, CorrelationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Register a bank account.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBankRequest {
    /// Bank name
    pub bank_name: String,
    /// Name on the account
    pub account_holder: String,
    /// Full account number
    pub account_number: String,
    /// Routing number, when applicable
    #[serde(default)]
    pub routing_number: Option<String>,
}

/// Register a mobile money wallet.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMobileMoneyRequest {
    /// `moncash` or `natcash`
    pub provider: MobileMoneyProvider,
    /// Wallet number
    pub phone: String,
}

/// Text a code to a wallet.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCodeRequest {
    /// Wallet destination
    pub destination_id: DestinationId,
    /// Wallet number, must match the registered one
    pub phone: String,
}

/// Confirm a texted code.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmCodeRequest {
    /// Wallet destination
    pub destination_id: DestinationId,
    /// Code the user typed
    pub code: String,
}

/// Admin approve / fail decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationDecision {
    /// Mark verified
    Approve,
    /// Mark failed with a reason
    Fail,
}

/// Body of an admin decision.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationReviewRequest {
    /// Owner of the destination
    pub organizer_id: UserId,
    /// Destination under review
    pub destination_id: DestinationId,
    /// Required when failing
    #[serde(default)]
    pub reason: Option<String>,
}

/// Account details as shown to the owner. Hashes stay server-side.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AccountView {
    /// Bank account
    Bank {
        /// Bank name
        bank_name: String,
        /// Name on the account
        account_holder: String,
        /// Last four digits of the account number
        account_number_last4: String,
        /// Last four digits of the routing number
        #[serde(skip_serializing_if = "Option::is_none")]
        routing_number_last4: Option<String>,
    },
    /// Mobile money wallet
    MobileMoney {
        /// Operator
        provider: MobileMoneyProvider,
        /// Masked number
        phone_masked: String,
        /// Whether the owner confirmed an SMS code
        phone_verified: bool,
    },
}

impl From<&DestinationKind> for AccountView {
    fn from(kind: &DestinationKind) -> Self {
        match kind {
            DestinationKind::Bank {
                bank_name,
                account_holder,
                account_number_last4,
                routing_number_last4,
            } => Self::Bank {
                bank_name: bank_name.clone(),
                account_holder: account_holder.clone(),
                account_number_last4: account_number_last4.clone(),
                routing_number_last4: routing_number_last4.clone(),
            },
            DestinationKind::MobileMoney {
                provider,
                phone_masked,
                phone_verified,
                ..
            } => Self::MobileMoney {
                provider: *provider,
                phone_masked: phone_masked.clone(),
                phone_verified: *phone_verified,
            },
        }
    }
}

/// Outstanding SMS code, without the code hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSentView {
    /// When the code was sent
    pub sent_at: DateTime<Utc>,
    /// When the code stops working
    pub expires_at: DateTime<Utc>,
}

/// A destination as returned to its owner or an admin.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationView {
    /// Owner
    pub organizer_id: UserId,
    /// Account details
    pub kind: AccountView,
    /// Verification status
    pub status: DestinationStatus,
    /// Preferred destination
    pub is_primary: bool,
    /// Whether a proof document is on file
    pub has_proof: bool,
    /// Why an admin failed it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Outstanding SMS code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_verification: Option<CodeSentView>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
    /// When it became verified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

impl From<&PayoutDestination> for DestinationView {
    fn from(d: &PayoutDestination) -> Self {
        Self {
            organizer_id: d.organizer_id.clone(),
            kind: AccountView::from(&d.kind),
            status: d.status,
            is_primary: d.is_primary,
            has_proof: d.proof_document_path.is_some(),
            failure_reason: d.failure_reason.clone(),
            phone_verification: d.phone_verification.as_ref().map(|p| CodeSentView {
                sent_at: p.sent_at,
                expires_at: p.expires_at,
            }),
            created_at: d.created_at,
            updated_at: d.updated_at,
            verified_at: d.verified_at,
        }
    }
}

/// An organizer's payout setup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutProfileResponse {
    /// Primary destination summary
    pub profile: HaitiPayoutProfile,
    /// Every destination, masked
    pub destinations: BTreeMap<DestinationId, DestinationView>,
}

/// One destination after a change.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationResponse {
    /// Destination id
    pub destination_id: DestinationId,
    /// The destination
    pub destination: DestinationView,
}

// ============================================================================
// Helpers
// ============================================================================

async fn dispatch(state: &AppState, organizer: UserId, action: PayoutAction) -> Result<PayoutState, AppError> {
    let destinations = load_destinations(state.documents.as_ref(), &organizer).await?;
    let env = PayoutEnvironment::new(
        state.clock.clone(),
        state.ids.clone(),
        state.secrets.clone(),
        state.documents.clone(),
        state.files.clone(),
        state.sms.clone(),
    );
    let result = run(PayoutReducer::new(), PayoutState::new(organizer, destinations), env, action).await?;
    match result.last_error {
        Some(error) => Err(error.into()),
        None => Ok(result),
    }
}

fn destination(result: &PayoutState, id: &DestinationId) -> Result<DestinationResponse, AppError> {
    result
        .destinations
        .get(id)
        .map(|d| DestinationResponse {
            destination_id: id.clone(),
            destination: DestinationView::from(d),
        })
        .ok_or_else(|| AppError::not_found("Payout destination", id))
}

fn registered(result: &PayoutState) -> Result<DestinationResponse, AppError> {
    let id = result
        .registered
        .clone()
        .ok_or_else(|| AppError::internal("Destination was not recorded"))?;
    destination(result, &id)
}

// ============================================================================
// Handlers
// ============================================================================

/// Payout summary and destinations of the caller.
pub async fn get_profile(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
) -> Result<Json<PayoutProfileResponse>, AppError> {
    let destinations = load_destinations(state.documents.as_ref(), &caller(&identity)).await?;
    Ok(Json(PayoutProfileResponse {
        profile: HaitiPayoutProfile::summarize(&destinations, state.clock.now()),
        destinations: destinations.iter().map(|(id, d)| (id.clone(), DestinationView::from(d))).collect(),
    }))
}

/// Register a bank account. Only the last four digits are stored.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/organizer/payout-destinations/bank \
///   -H "Authorization: Bearer <id_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"bankName": "Unibank", "accountHolder": "Marie Joseph", "accountNumber": "001234567890"}'
/// ```
pub async fn register_bank(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<RegisterBankRequest>,
) -> Result<(StatusCode, Json<DestinationResponse>), AppError> {
    let action = PayoutAction::RegisterBank {
        bank_name: request.bank_name,
        account_holder: request.account_holder,
        account_number: Redacted(request.account_number),
        routing_number: request.routing_number.map(Redacted),
    };
    let result = dispatch(&state, caller(&identity), action).await?;
    Ok((StatusCode::CREATED, Json(registered(&result)?)))
}

/// Register a mobile money wallet. The number is stored hashed and masked.
pub async fn register_mobile_money(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Json(request): Json<RegisterMobileMoneyRequest>,
) -> Result<(StatusCode, Json<DestinationResponse>), AppError> {
    let action = PayoutAction::RegisterMobileMoney {
        provider: request.provider,
        phone: Redacted(request.phone),
    };
    let result = dispatch(&state, caller(&identity), action).await?;
    Ok((StatusCode::CREATED, Json(registered(&result)?)))
}

/// Make a destination primary.
pub async fn set_primary(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    Path(destination_id): Path<DestinationId>,
) -> Result<Json<DestinationResponse>, AppError> {
    let action = PayoutAction::SetPrimary {
        destination_id: destination_id.clone(),
    };
    let result = dispatch(&state, caller(&identity), action).await?;
    destination(&result, &destination_id).map(Json)
}

/// Upload a statement or screenshot proving ownership.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/organizer/submit-bank-verification \
///   -H "Authorization: Bearer <id_token>" \
///   -F destinationId=dest_123 -F file=@statement.pdf
/// ```
pub async fn submit_proof(
    AuthenticatedUser(identity): AuthenticatedUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<DestinationResponse>, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let destination_id = DestinationId::new(form.field("destinationId")?);
    let upload = form.take_file()?;

    let action = PayoutAction::SubmitProof {
        destination_id: destination_id.clone(),
        upload,
    };
    let result = dispatch(&state, caller(&identity), action).await?;
    MarketplaceMetrics::record_upload("payout_proof".to_string());
    destination(&result, &destination_id).map(Json)
}

/// Text a six-digit code to a wallet number.
pub async fn send_phone_code(
    AuthenticatedUser(identity): AuthenticatedUser,
    CorrelationId(correlation_id): CorrelationId,
    ClientIp(ip): ClientIp,
    State(state): State<AppState>,
    Json(request): Json<SendCodeRequest>,
) -> Result<Json<DestinationResponse>, AppError> {
    let organizer = caller(&identity);
    tracing::info!(
        %organizer,
        destination = %request.destination_id,
        %correlation_id,
        %ip,
        "Phone verification code requested"
    );
    let action = PayoutAction::SendPhoneCode {
        destination_id: request.destination_id.clone(),
        phone: Redacted(request.phone),
    };
    let result = dispatch(&state, organizer, action).await?;
    destination(&result, &request.destination_id).map(Json)
}

/// Confirm the texted code.
pub async fn confirm_phone_code(
    AuthenticatedUser(identity): AuthenticatedUser,
    CorrelationId(correlation_id): CorrelationId,
    State(state): State<AppState>,
    Json(request): Json<ConfirmCodeRequest>,
) -> Result<Json<DestinationResponse>, AppError> {
    tracing::debug!(organizer = %identity.uid, destination = %request.destination_id, %correlation_id, "Phone code submitted");
    let action = PayoutAction::ConfirmPhoneCode {
        destination_id: request.destination_id.clone(),
        code: Redacted(request.code),
    };
    let result = dispatch(&state, caller(&identity), action).await?;
    destination(&result, &request.destination_id).map(Json)
}

/// Approve or fail a destination, then notify its owner.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/admin/payout-destinations/fail \
///   -H "Authorization: Bearer <admin_id_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"organizerId": "org_1", "destinationId": "dest_1", "reason": "Statement is cropped"}'
/// ```
pub async fn review(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(decision): Path<DestinationDecision>,
    Json(request): Json<DestinationReviewRequest>,
) -> Result<Json<DestinationResponse>, AppError> {
    let reviewer = caller(&admin);
    let destination_id = request.destination_id.clone();
    let action = match decision {
        DestinationDecision::Approve => PayoutAction::Approve {
            destination_id: destination_id.clone(),
            reviewer,
        },
        DestinationDecision::Fail => PayoutAction::Fail {
            destination_id: destination_id.clone(),
            reviewer,
            reason: request.reason.unwrap_or_default(),
        },
    };

    let result = dispatch(&state, request.organizer_id.clone(), action).await?;
    let response = destination(&result, &destination_id)?;

    let message = match response.destination.status {
        DestinationStatus::Verified => Some(("Payout method verified", "You can now withdraw your earnings.".to_string())),
        DestinationStatus::Failed => Some((
            "Payout method needs attention",
            response
                .destination
                .failure_reason
                .clone()
                .unwrap_or_else(|| "Please resubmit your proof.".to_string()),
        )),
        _ => None,
    };
    if let Some((title, body)) = message {
        let push = PushMessage {
            title: title.to_string(),
            body,
            data: serde_json::json!({ "screen": "payouts", "destinationId": destination_id }),
        };
        notify_user(state.documents.as_ref(), state.push.as_ref(), &request.organizer_id, push).await;
    }
    Ok(Json(response))
}

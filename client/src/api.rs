//! Typed calls for every backend endpoint.
//!
//! Response types carry the fields callers act on; nested documents the
//! client only displays stay as `serde_json::Value`.

use crate::client::{BackendClient, FilePart, MultipartBody, RequestBody};
use crate::error::ClientError;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

// ============================================================================
// Response types
// ============================================================================

/// Session cookie minted by `/api/auth/session`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// `"ok"`
    pub status: String,
    /// Cookie lifetime in seconds
    pub expires_in: i64,
}

/// A verification request with its progress.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    /// `not_started`, `in_progress`, `pending_review`, ...
    pub status: String,
    /// Required steps complete, in percent
    pub completion_percentage: u8,
    /// Required steps still open
    #[serde(default)]
    pub missing_required_steps: Vec<String>,
    /// Steps by id
    #[serde(default)]
    pub steps: Map<String, Value>,
    /// Uploaded storage paths by document type
    #[serde(default)]
    pub files: Map<String, Value>,
}

/// One payout destination.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Destination id
    pub destination_id: String,
    /// The masked destination document
    pub destination: Value,
}

impl Destination {
    /// `not_setup`, `pending_verification`, `verified` or `failed`.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.destination.get("status").and_then(Value::as_str)
    }
}

/// Payout summary plus every destination.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutProfile {
    /// Primary destination summary
    pub profile: Value,
    /// Destinations by id
    pub destinations: Map<String, Value>,
}

/// Earnings of one event, amounts in cents.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEarnings {
    /// Event
    pub event_id: String,
    /// Event title
    pub title: String,
    /// Tickets counted
    pub tickets_sold: u32,
    /// Ticket revenue
    pub gross_amount: i64,
    /// Marketplace fee
    pub platform_fee: i64,
    /// Card processing fee
    pub processing_fee: i64,
    /// Organizer share
    pub net_amount: i64,
    /// Withdrawn or in flight
    pub withdrawn_amount: i64,
    /// Withdrawable now
    pub available_to_withdraw: i64,
    /// `pending` or `ready`
    pub settlement_status: String,
    /// When the earnings settle
    pub settlement_date: DateTime<Utc>,
}

/// Earnings across an organizer's events.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    /// One row per event
    pub events: Vec<EventEarnings>,
    /// Sums of the rows
    pub totals: Value,
}

/// A recorded withdrawal.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalReceipt {
    /// Withdrawal id
    pub withdrawal_id: String,
    /// The withdrawal document
    pub withdrawal: Value,
    /// Earnings after the withdrawal
    pub earnings: EventEarnings,
}

/// Follow state after a toggle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowState {
    /// Whether the caller follows
    pub following: bool,
    /// Follower count
    pub followers: usize,
}

/// Favorite state after a toggle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteState {
    /// Whether the event is a favorite
    pub favorited: bool,
}

/// Place on a waitlist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistPosition {
    /// 1-based position
    pub position: usize,
    /// People waiting
    pub total: usize,
    /// Whether the caller was already on it
    pub already_joined: bool,
}

/// A freshly issued staff invite.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffInvite {
    /// Invite id
    pub invite_id: String,
    /// `scanner` or `manager`
    pub role: String,
    /// One-time token
    pub token: String,
    /// `eventhaiti://staff-invite?...`
    pub deep_link: String,
    /// Expiry
    pub expires_at: DateTime<Utc>,
}

/// A scanned ticket.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    /// Ticket id
    pub ticket_id: String,
    /// The ticket after check-in
    pub ticket: Value,
}

/// A refund request.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    /// Ticket
    pub ticket_id: String,
    /// Event
    pub event_id: String,
    /// Amount in cents
    pub amount: i64,
    /// `pending`, `approved` or `denied`
    pub status: String,
    /// Holder's reason
    pub reason: String,
    /// Organizer's reason for a denial
    #[serde(default)]
    pub denial_reason: Option<String>,
}

/// Reviews of an event.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    /// Number of reviews
    pub count: usize,
    /// Mean rating to one decimal
    pub average_rating: Option<f64>,
    /// Newest first
    pub reviews: Vec<Value>,
}

/// A published event.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    /// New event id
    pub event_id: String,
}

// ============================================================================
// Calls
// ============================================================================

impl BackendClient {
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.backend_json(Method::GET, path, RequestBody::Empty).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ClientError> {
        self.backend_json(Method::POST, path, RequestBody::Json(body)).await
    }

    // ---------- Session ----------

    /// `POST /api/auth/session` with the current token; the cookie is kept.
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn start_session(&self) -> Result<(), ClientError> {
        let token = self.tokens().id_token(false).await?;
        self.create_session(&token).await
    }

    // ---------- Verification ----------

    /// `GET /api/verification`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn get_verification(&self) -> Result<Verification, ClientError> {
        self.get("/api/verification").await
    }

    /// `PATCH /api/verification/steps/{step}`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn update_verification_step(&self, step: &str, patch: Value) -> Result<Verification, ClientError> {
        self.backend_json(
            Method::PATCH,
            &format!("/api/verification/steps/{step}"),
            RequestBody::Json(patch),
        )
        .await
    }

    /// `POST /api/verification/files`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn upload_verification_document(
        &self,
        document_type: &str,
        file: FilePart,
    ) -> Result<Verification, ClientError> {
        let form = MultipartBody::new().field("documentType", document_type).file(file);
        self.backend_json(Method::POST, "/api/verification/files", RequestBody::Multipart(form))
            .await
    }

    /// `POST /api/verification/submit`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn submit_verification(&self) -> Result<Verification, ClientError> {
        self.post("/api/verification/submit", json!({})).await
    }

    /// `POST /api/verification/reapply`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn reapply_verification(&self) -> Result<Verification, ClientError> {
        self.post("/api/verification/reapply", json!({})).await
    }

    /// `POST /api/admin/verification/{user_id}/{decision}` (admin).
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn review_verification(
        &self,
        user_id: &str,
        decision: &str,
        body: Value,
    ) -> Result<Verification, ClientError> {
        self.post(&format!("/api/admin/verification/{user_id}/{decision}"), body)
            .await
    }

    // ---------- Payouts ----------

    /// `GET /api/organizer/payout-profiles/haiti`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn payout_profile(&self) -> Result<PayoutProfile, ClientError> {
        self.get("/api/organizer/payout-profiles/haiti").await
    }

    /// `POST /api/organizer/payout-destinations/bank`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn register_bank(
        &self,
        bank_name: &str,
        account_holder: &str,
        account_number: &str,
        routing_number: Option<&str>,
    ) -> Result<Destination, ClientError> {
        self.post(
            "/api/organizer/payout-destinations/bank",
            json!({
                "bankName": bank_name,
                "accountHolder": account_holder,
                "accountNumber": account_number,
                "routingNumber": routing_number,
            }),
        )
        .await
    }

    /// `POST /api/organizer/payout-destinations/mobile-money`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn register_mobile_money(&self, provider: &str, phone: &str) -> Result<Destination, ClientError> {
        self.post(
            "/api/organizer/payout-destinations/mobile-money",
            json!({ "provider": provider, "phone": phone }),
        )
        .await
    }

    /// `POST /api/organizer/payout-destinations/{id}/primary`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn set_primary_destination(&self, destination_id: &str) -> Result<Destination, ClientError> {
        self.post(
            &format!("/api/organizer/payout-destinations/{destination_id}/primary"),
            json!({}),
        )
        .await
    }

    /// `POST /api/organizer/submit-bank-verification`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn submit_payout_proof(&self, destination_id: &str, file: FilePart) -> Result<Destination, ClientError> {
        let form = MultipartBody::new().field("destinationId", destination_id).file(file);
        self.backend_json(
            Method::POST,
            "/api/organizer/submit-bank-verification",
            RequestBody::Multipart(form),
        )
        .await
    }

    /// `POST /api/organizer/send-phone-verification-code`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn send_phone_code(&self, destination_id: &str, phone: &str) -> Result<Destination, ClientError> {
        self.post(
            "/api/organizer/send-phone-verification-code",
            json!({ "destinationId": destination_id, "phone": phone }),
        )
        .await
    }

    /// `POST /api/organizer/submit-phone-verification`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn confirm_phone_code(&self, destination_id: &str, code: &str) -> Result<Destination, ClientError> {
        self.post(
            "/api/organizer/submit-phone-verification",
            json!({ "destinationId": destination_id, "code": code }),
        )
        .await
    }

    /// `POST /api/admin/payout-destinations/{decision}` (admin).
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn review_destination(
        &self,
        decision: &str,
        organizer_id: &str,
        destination_id: &str,
        reason: Option<&str>,
    ) -> Result<Destination, ClientError> {
        self.post(
            &format!("/api/admin/payout-destinations/{decision}"),
            json!({ "organizerId": organizer_id, "destinationId": destination_id, "reason": reason }),
        )
        .await
    }

    // ---------- Earnings ----------

    /// `GET /api/organizer/earnings/{event_id}`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn event_earnings(&self, event_id: &str) -> Result<EventEarnings, ClientError> {
        self.get(&format!("/api/organizer/earnings/{event_id}")).await
    }

    /// `GET /api/organizer/analytics`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn analytics(&self) -> Result<Analytics, ClientError> {
        self.get("/api/organizer/analytics").await
    }

    /// `POST /api/organizer/withdraw-moncash`; `None` withdraws everything.
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn withdraw_moncash(&self, event_id: &str, amount: Option<i64>) -> Result<WithdrawalReceipt, ClientError> {
        self.post(
            "/api/organizer/withdraw-moncash",
            json!({ "eventId": event_id, "amount": amount }),
        )
        .await
    }

    /// `POST /api/organizer/withdraw-bank`; `None` withdraws everything.
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn withdraw_bank(&self, event_id: &str, amount: Option<i64>) -> Result<WithdrawalReceipt, ClientError> {
        self.post("/api/organizer/withdraw-bank", json!({ "eventId": event_id, "amount": amount }))
            .await
    }

    // ---------- Events and engagement ----------

    /// `POST /api/events` with a finished wizard draft.
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`]; validation failures carry `details.step`.
    pub async fn create_event(&self, draft: Value) -> Result<CreatedEvent, ClientError> {
        self.post("/api/events", json!({ "draft": draft })).await
    }

    /// `POST /api/organizers/follow`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn toggle_follow(&self, organizer_id: &str) -> Result<FollowState, ClientError> {
        self.post("/api/organizers/follow", json!({ "organizerId": organizer_id }))
            .await
    }

    /// `POST /api/events/{event_id}/favorite`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn toggle_favorite(&self, event_id: &str) -> Result<FavoriteState, ClientError> {
        self.post(&format!("/api/events/{event_id}/favorite"), json!({})).await
    }

    /// `POST /api/waitlist/join`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn join_waitlist(&self, event_id: &str) -> Result<WaitlistPosition, ClientError> {
        self.post("/api/waitlist/join", json!({ "eventId": event_id })).await
    }

    /// `POST /api/waitlist/leave`; whether the caller was on it.
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn leave_waitlist(&self, event_id: &str) -> Result<bool, ClientError> {
        let body: Value = self.post("/api/waitlist/leave", json!({ "eventId": event_id })).await?;
        Ok(body.get("removed").and_then(Value::as_bool).unwrap_or(false))
    }

    // ---------- Staff ----------

    /// `POST /api/staff/invites/create`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn create_staff_invite(&self, event_id: &str, role: &str) -> Result<StaffInvite, ClientError> {
        self.post("/api/staff/invites/create", json!({ "eventId": event_id, "role": role }))
            .await
    }

    /// `POST /api/staff/invites/revoke`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn revoke_staff_invite(&self, event_id: &str, invite_id: &str) -> Result<(), ClientError> {
        self.post::<Value>(
            "/api/staff/invites/revoke",
            json!({ "eventId": event_id, "inviteId": invite_id }),
        )
        .await
        .map(drop)
    }

    /// `POST /api/staff/invites/redeem`; returns the membership document.
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn redeem_staff_invite(&self, event_id: &str, token: &str) -> Result<Value, ClientError> {
        self.post("/api/staff/invites/redeem", json!({ "eventId": event_id, "token": token }))
            .await
    }

    /// `POST /api/staff/members/remove`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn remove_staff_member(&self, event_id: &str, user_id: &str) -> Result<(), ClientError> {
        self.post::<Value>(
            "/api/staff/members/remove",
            json!({ "eventId": event_id, "userId": user_id }),
        )
        .await
        .map(drop)
    }

    /// `POST /api/staff/check-in`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`]; a second scan is a 409.
    pub async fn check_in(&self, event_id: &str, ticket_id: &str) -> Result<CheckIn, ClientError> {
        self.post("/api/staff/check-in", json!({ "eventId": event_id, "ticketId": ticket_id }))
            .await
    }

    // ---------- Refunds and reviews ----------

    /// `POST /api/refunds/request`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn request_refund(&self, ticket_id: &str, reason: &str) -> Result<RefundRequest, ClientError> {
        self.post("/api/refunds/request", json!({ "ticketId": ticket_id, "reason": reason }))
            .await
    }

    /// `POST /api/refunds/process` with `approve` or `deny`.
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn process_refund(
        &self,
        ticket_id: &str,
        action: &str,
        reason: Option<&str>,
    ) -> Result<RefundRequest, ClientError> {
        self.post(
            "/api/refunds/process",
            json!({ "ticketId": ticket_id, "action": action, "reason": reason }),
        )
        .await
    }

    /// `POST /api/reviews`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn post_review(&self, event_id: &str, rating: u8, comment: &str) -> Result<Value, ClientError> {
        self.post(
            "/api/reviews",
            json!({ "eventId": event_id, "rating": rating, "comment": comment }),
        )
        .await
    }

    /// `GET /api/reviews?eventId=`
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn event_reviews(&self, event_id: &str) -> Result<ReviewSummary, ClientError> {
        self.get(&format!("/api/reviews?eventId={event_id}")).await
    }

    // ---------- Push ----------

    /// `POST /api/push/register-expo`; whether the token was new.
    ///
    /// # Errors
    ///
    /// See [`BackendClient::backend_fetch`].
    pub async fn register_push_token(&self, token: &str) -> Result<bool, ClientError> {
        let body: Value = self.post("/api/push/register-expo", json!({ "token": token })).await?;
        Ok(body.get("added").and_then(Value::as_bool).unwrap_or(false))
    }
}

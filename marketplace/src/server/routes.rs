//! Router configuration for the EventHaiti backend.
//!
//! Builds the complete Axum router with all endpoints.

use super::state::AppState;
use crate::api::{earnings, engagement, events, payouts, push, refunds, reviews, session, staff, verification};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use eventhaiti_core::documents::DocumentPath;
use eventhaiti_core::files::MAX_UPLOAD_BYTES;
use eventhaiti_runtime::{HealthCheck, HealthReport};
use eventhaiti_web::correlation_id_layer;
use eventhaiti_web::handlers::{health_check, readiness};
use tower_http::trace::TraceLayer;

/// Room for multipart framing around the largest allowed file.
const BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 64 * 1024;

/// Readiness: the document store answers a read.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let check = match state.documents.get(DocumentPath::new("health", "ping")).await {
        Ok(_) => HealthCheck::healthy("documents"),
        Err(e) => HealthCheck::unhealthy("documents", e.to_string()),
    };
    readiness(vec![check])
}

/// Build the complete Axum router.
///
/// Configures all routes including:
/// - Health checks
/// - Session cookies
/// - Organizer verification and its admin review
/// - Payout destinations, earnings and withdrawals
/// - Staff, check-in, refunds, reviews and engagement
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Authentication
        .route("/auth/session", post(session::create_session))
        // Verification
        .route("/verification", get(verification::get_verification))
        .route(
            "/verification/steps/:step",
            patch(verification::update_step).post(verification::update_step),
        )
        .route("/verification/files", post(verification::upload_file))
        .route("/verification/submit", post(verification::submit))
        .route("/verification/reapply", post(verification::reapply))
        .route("/admin/verification/:user_id/:decision", post(verification::review))
        // Payout destinations
        .route("/organizer/payout-profiles/haiti", get(payouts::get_profile))
        .route("/organizer/payout-destinations/bank", post(payouts::register_bank))
        .route(
            "/organizer/payout-destinations/mobile-money",
            post(payouts::register_mobile_money),
        )
        .route("/organizer/payout-destinations/:id/primary", post(payouts::set_primary))
        .route("/organizer/submit-bank-verification", post(payouts::submit_proof))
        .route("/organizer/send-phone-verification-code", post(payouts::send_phone_code))
        .route("/organizer/submit-phone-verification", post(payouts::confirm_phone_code))
        .route("/admin/payout-destinations/:decision", post(payouts::review))
        // Earnings
        .route("/organizer/earnings/:event_id", get(earnings::event_earnings))
        .route("/organizer/analytics", get(earnings::analytics))
        .route("/organizer/withdraw-moncash", post(earnings::withdraw_moncash))
        .route("/organizer/withdraw-bank", post(earnings::withdraw_bank))
        // Events
        .route("/events", post(events::create_event))
        .route("/events/:event_id/favorite", post(engagement::toggle_favorite))
        // Engagement
        .route("/organizers/follow", post(engagement::toggle_follow))
        .route("/waitlist/join", post(engagement::join_waitlist))
        .route("/waitlist/leave", post(engagement::leave_waitlist))
        // Staff
        .route("/staff/:event_id", get(staff::list_staff))
        .route("/staff/invites/create", post(staff::create_invite))
        .route("/staff/invites/revoke", post(staff::revoke_invite))
        .route("/staff/invites/redeem", post(staff::redeem_invite))
        .route("/staff/members/remove", post(staff::remove_member))
        .route("/staff/check-in", post(staff::check_in))
        // Refunds
        .route("/refunds/request", post(refunds::request_refund))
        .route("/refunds/process", post(refunds::process_refund))
        // Reviews
        .route("/reviews", post(reviews::post_review).get(reviews::list_reviews))
        // Push
        .route("/push/register-expo", post(push::register_expo_token));

    Router::new()
        // Health checks (no authentication)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(correlation_id_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

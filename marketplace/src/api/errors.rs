//! Domain error to HTTP error mapping.
//!
//! Refusals map to 4xx with the error's message; storage failures map to 500
//! with the cause kept for the log only.

use crate::checkin::CheckInError;
use crate::earnings::WithdrawalError;
use crate::engagement::EngagementError;
use crate::payouts::PayoutError;
use crate::push::PushError;
use crate::refunds::RefundError;
use crate::reviews::ReviewError;
use crate::staff::StaffError;
use crate::verification::VerificationError;
use crate::wizard::WizardError;
use axum::http::StatusCode;
use eventhaiti_web::AppError;
use serde_json::json;

fn storage(message: String) -> AppError {
    AppError::internal("A storage error occurred").with_source(anyhow::anyhow!(message))
}

fn too_many_requests(message: String) -> AppError {
    AppError::new(StatusCode::TOO_MANY_REQUESTS, message, "TOO_MANY_REQUESTS".to_string())
}

impl From<VerificationError> for AppError {
    fn from(err: VerificationError) -> Self {
        let message = err.to_string();
        match err {
            VerificationError::Locked(_) | VerificationError::InvalidTransition { .. } => Self::conflict(message),
            VerificationError::IncompleteSteps(steps) => {
                Self::validation(message).with_details(json!({ "missingSteps": steps }))
            },
            VerificationError::Validation(_) => Self::bad_request(message),
            VerificationError::Upload(e) => e.into(),
            VerificationError::Storage(m) => storage(m),
        }
    }
}

impl From<PayoutError> for AppError {
    fn from(err: PayoutError) -> Self {
        let message = err.to_string();
        match err {
            PayoutError::NotFound(id) => Self::not_found("Payout destination", id),
            PayoutError::Validation(_)
            | PayoutError::NotMobileMoney
            | PayoutError::NoCodeRequested
            | PayoutError::CodeExpired
            | PayoutError::InvalidCode { .. } => Self::bad_request(message),
            PayoutError::Duplicate | PayoutError::InvalidTransition { .. } | PayoutError::AlreadyVerified => {
                Self::conflict(message)
            },
            PayoutError::MissingProof => Self::validation(message),
            PayoutError::ResendTooSoon(seconds) => {
                too_many_requests(message).with_details(json!({ "retryAfterSeconds": seconds }))
            },
            PayoutError::TooManyAttempts => too_many_requests(message),
            PayoutError::Upload(e) => e.into(),
            PayoutError::Sms(m) => Self::new(StatusCode::BAD_GATEWAY, message, "SMS_FAILED".to_string())
                .with_source(anyhow::anyhow!(m)),
            PayoutError::Storage(m) => storage(m),
        }
    }
}

/// Metric label for a refused withdrawal.
#[must_use]
pub const fn withdrawal_rejection(err: &WithdrawalError) -> &'static str {
    match err {
        WithdrawalError::NotOrganizer => "not_organizer",
        WithdrawalError::NotSettled { .. } => "not_settled",
        WithdrawalError::InsufficientBalance { .. } => "insufficient_balance",
        WithdrawalError::BelowMinimum { .. } => "below_minimum",
        WithdrawalError::ExceedsAvailable { .. } => "exceeds_available",
        WithdrawalError::NoVerifiedDestination(_) => "no_verified_destination",
        WithdrawalError::Storage(_) => "storage",
    }
}

impl From<WithdrawalError> for AppError {
    fn from(err: WithdrawalError) -> Self {
        let message = err.to_string();
        match err {
            WithdrawalError::NotOrganizer => Self::forbidden(message),
            WithdrawalError::NotSettled { settles_at } => {
                Self::validation(message).with_details(json!({ "settlementDate": settles_at }))
            },
            WithdrawalError::InsufficientBalance { available, minimum } => Self::validation(message)
                .with_details(json!({ "availableToWithdraw": available, "minimum": minimum })),
            WithdrawalError::BelowMinimum { minimum } => {
                Self::validation(message).with_details(json!({ "minimum": minimum }))
            },
            WithdrawalError::ExceedsAvailable { available, .. } => {
                Self::validation(message).with_details(json!({ "availableToWithdraw": available }))
            },
            WithdrawalError::NoVerifiedDestination(_) => Self::validation(message),
            WithdrawalError::Storage(m) => storage(m),
        }
    }
}

impl From<WizardError> for AppError {
    fn from(err: WizardError) -> Self {
        match (err.step(), err) {
            (_, WizardError::Storage(m)) => storage(m),
            (Some(step), err) => Self::validation(err.to_string()).with_details(json!({ "step": step.number() })),
            (None, err) => Self::validation(err.to_string()),
        }
    }
}

impl From<StaffError> for AppError {
    fn from(err: StaffError) -> Self {
        let message = err.to_string();
        match err {
            StaffError::Forbidden(_) => Self::forbidden(message),
            StaffError::InviteNotFound | StaffError::MemberNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, message, "NOT_FOUND".to_string())
            },
            StaffError::InviteClosed(_)
            | StaffError::InviteExpired
            | StaffError::AlreadyOrganizer
            | StaffError::AlreadyMember(_) => {
                Self::conflict(message)
            },
            StaffError::Storage(m) => storage(m),
        }
    }
}

impl From<CheckInError> for AppError {
    fn from(err: CheckInError) -> Self {
        let message = err.to_string();
        match err {
            CheckInError::Forbidden => Self::forbidden(message),
            CheckInError::EventNotFound(id) => Self::not_found("Event", id),
            CheckInError::TicketNotFound(id) => Self::not_found("Ticket", id),
            CheckInError::WrongEvent => Self::bad_request(message),
            CheckInError::AlreadyCheckedIn(at) => Self::conflict(message).with_details(json!({ "checkedInAt": at })),
            CheckInError::Refunded | CheckInError::Cancelled => Self::conflict(message),
            CheckInError::Storage(e) => e.into(),
        }
    }
}

impl From<RefundError> for AppError {
    fn from(err: RefundError) -> Self {
        let message = err.to_string();
        match err {
            RefundError::NotTicketHolder | RefundError::NotOrganizer => Self::forbidden(message),
            RefundError::TicketNotRefundable(_)
            | RefundError::EventStarted
            | RefundError::AlreadyRequested(_)
            | RefundError::NoPendingRequest => Self::conflict(message),
            RefundError::Validation(_) => Self::bad_request(message),
            RefundError::Storage(m) => storage(m),
        }
    }
}

impl From<ReviewError> for AppError {
    fn from(err: ReviewError) -> Self {
        let message = err.to_string();
        match err {
            ReviewError::InvalidRating | ReviewError::CommentTooLong => Self::bad_request(message),
            ReviewError::EventNotFound(id) => Self::not_found("Event", id),
            ReviewError::EventNotEnded => Self::conflict(message),
            ReviewError::NotAttendee => Self::forbidden(message),
            ReviewError::Storage(e) => e.into(),
        }
    }
}

impl From<EngagementError> for AppError {
    fn from(err: EngagementError) -> Self {
        let message = err.to_string();
        match err {
            EngagementError::SelfFollow => Self::bad_request(message),
            EngagementError::EventNotFound(id) => Self::not_found("Event", id),
            EngagementError::EventClosed(_) => Self::conflict(message),
            EngagementError::Storage(e) => e.into(),
        }
    }
}

impl From<PushError> for AppError {
    fn from(err: PushError) -> Self {
        match err {
            PushError::InvalidToken => Self::bad_request(err.to_string()),
            PushError::Storage(e) => e.into(),
            other => Self::internal("Push delivery failed").with_source(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cents;
    use crate::wizard::WizardStep;

    #[test]
    fn refusals_keep_their_message() {
        let err = AppError::from(WithdrawalError::BelowMinimum { minimum: Cents::new(5000) });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.message(), "Withdrawals must be at least $50.00");
    }

    #[test]
    fn wizard_errors_point_at_their_step() {
        assert_eq!(WizardError::NoTicketTiers.step(), Some(WizardStep::Tickets));
        let err = AppError::from(WizardError::NoTicketTiers);
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn storage_failures_are_opaque() {
        let err = AppError::from(PayoutError::Storage("disk on fire".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message().contains("disk"));
    }

    #[test]
    fn throttled_codes_are_429() {
        assert_eq!(
            AppError::from(PayoutError::ResendTooSoon(42)).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}

//! Organizer payout destinations and their verification.
//!
//! A destination is a bank account or a mobile-money wallet an organizer
//! wants to be paid to. Every destination follows one state machine:
//!
//! ```text
//! not_setup ──register──▶ pending_verification ──approve / phone code──▶ verified
//!                              │        ▲
//!                         fail │        │ resubmit proof
//!                              ▼        │
//!                             failed ───┘
//! ```
//!
//! Destinations live at `organizers/{organizerId}/payoutDestinations/{id}`.
//! Account numbers and phone numbers are never stored in full: banks keep
//! the last four digits, wallets keep a masked number plus a salted hash.
//!
//! Exactly one destination is primary once any exist. A summary of the
//! primary destination is mirrored to `organizers/{organizerId}/payoutProfiles/haiti`.

use crate::persistence::{DocumentWrite, write_documents};
use crate::secrets::{SecretGenerator, hash_secret, verify_secret};
use crate::sms::SmsSender;
use crate::types::{DestinationId, UserId, collections};
use chrono::{DateTime, Duration, Utc};
use eventhaiti_core::documents::{self, DocumentError, DocumentPath, DocumentStore};
use eventhaiti_core::effect::Effect;
use eventhaiti_core::environment::{Clock, IdGenerator};
use eventhaiti_core::files::{FileStore, FileStoreError, FileUpload, StoragePath};
use eventhaiti_core::reducer::Reducer;
use eventhaiti_core::{SmallVec, smallvec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Sub-collection holding destinations.
pub const DESTINATIONS: &str = "payoutDestinations";

/// Sub-collection holding provider profiles (`haiti`, `stripe`).
pub const PROFILES: &str = "payoutProfiles";

/// How long a phone code stays valid.
pub const DEFAULT_CODE_TTL_MINUTES: i64 = 10;

/// Wrong guesses allowed per code.
pub const DEFAULT_MAX_CODE_ATTEMPTS: u8 = 5;

/// Minimum wait before a new code can be sent.
pub const CODE_RESEND_SECONDS: i64 = 60;

// ============================================================================
// Document types
// ============================================================================

/// Verification status of a destination (and of the organizer's profile).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationStatus {
    /// No destination registered.
    NotSetup,
    /// Registered, waiting for proof review or phone confirmation.
    PendingVerification,
    /// Usable for withdrawals.
    Verified,
    /// Refused by an admin; proof can be resubmitted.
    Failed,
}

impl DestinationStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotSetup => "not_setup",
            Self::PendingVerification => "pending_verification",
            Self::Verified => "verified",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DestinationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Haitian mobile money operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MobileMoneyProvider {
    /// Digicel MonCash
    Moncash,
    /// Natcom NatCash
    Natcash,
}

impl MobileMoneyProvider {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Moncash => "moncash",
            Self::Natcash => "natcash",
        }
    }
}

/// Ways an organizer can withdraw earnings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalMethod {
    /// To a verified MonCash wallet
    Moncash,
    /// To a verified bank account
    Bank,
}

impl WithdrawalMethod {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Moncash => "moncash",
            Self::Bank => "bank",
        }
    }
}

impl fmt::Display for WithdrawalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of account a destination is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DestinationKind {
    /// Bank account
    Bank {
        /// Bank name
        bank_name: String,
        /// Name on the account
        account_holder: String,
        /// Last four digits of the account number
        account_number_last4: String,
        /// Last four digits of the routing number, when given
        #[serde(default, skip_serializing_if = "Option::is_none")]
        routing_number_last4: Option<String>,
    },
    /// Mobile money wallet
    MobileMoney {
        /// Operator
        provider: MobileMoneyProvider,
        /// Masked number (`****1234`)
        phone_masked: String,
        /// Salted hash of the normalized number
        phone_hash: String,
        /// Whether the owner confirmed an SMS code
        phone_verified: bool,
    },
}

impl DestinationKind {
    /// Short label: `bank`, `moncash` or `natcash`.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Bank { .. } => "bank",
            Self::MobileMoney { provider, .. } => provider.as_str(),
        }
    }

    /// Masked account shown to users.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Bank {
                bank_name,
                account_number_last4,
                ..
            } => format!("{bank_name} ****{account_number_last4}"),
            Self::MobileMoney { provider, phone_masked, .. } => {
                format!("{} {phone_masked}", provider.as_str())
            },
        }
    }
}

/// Pending SMS code for a wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneVerification {
    /// Hash of the code, scoped to the destination id
    pub code_hash: String,
    /// When the code was sent
    pub sent_at: DateTime<Utc>,
    /// When the code stops working
    pub expires_at: DateTime<Utc>,
    /// Wrong guesses so far
    pub attempts: u8,
}

/// `organizers/{organizerId}/payoutDestinations/{destinationId}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutDestination {
    /// Owner
    pub organizer_id: UserId,
    /// Account details
    pub kind: DestinationKind,
    /// Verification status
    pub status: DestinationStatus,
    /// Preferred destination
    pub is_primary: bool,
    /// Uploaded proof (statement, screenshot)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_document_path: Option<StoragePath>,
    /// Why an admin failed it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Outstanding SMS code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_verification: Option<PhoneVerification>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
    /// When it became verified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

impl PayoutDestination {
    /// Document path.
    #[must_use]
    pub fn path(organizer: &UserId, id: &DestinationId) -> DocumentPath {
        DocumentPath::nested(collections::ORGANIZERS, organizer.as_str(), DESTINATIONS, id.as_str())
    }

    /// Whether withdrawals by `method` can be paid here.
    #[must_use]
    pub const fn supports(&self, method: WithdrawalMethod) -> bool {
        matches!(
            (method, &self.kind),
            (WithdrawalMethod::Bank, DestinationKind::Bank { .. })
                | (
                    WithdrawalMethod::Moncash,
                    DestinationKind::MobileMoney {
                        provider: MobileMoneyProvider::Moncash,
                        ..
                    }
                )
        )
    }

    fn same_account(&self, other: &DestinationKind) -> bool {
        match (&self.kind, other) {
            (
                DestinationKind::Bank {
                    bank_name: a_bank,
                    account_number_last4: a_last4,
                    ..
                },
                DestinationKind::Bank {
                    bank_name: b_bank,
                    account_number_last4: b_last4,
                    ..
                },
            ) => a_bank.eq_ignore_ascii_case(b_bank) && a_last4 == b_last4,
            (
                DestinationKind::MobileMoney {
                    provider: a_provider,
                    phone_hash: a_hash,
                    ..
                },
                DestinationKind::MobileMoney {
                    provider: b_provider,
                    phone_hash: b_hash,
                    ..
                },
            ) => a_provider == b_provider && a_hash == b_hash,
            _ => false,
        }
    }
}

/// `organizers/{organizerId}/payoutProfiles/haiti`: summary of the primary destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaitiPayoutProfile {
    /// Status of the primary destination, `not_setup` without one
    pub status: DestinationStatus,
    /// Primary destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<DestinationId>,
    /// `bank`, `moncash` or `natcash`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Masked account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// Number of registered destinations
    pub destination_count: usize,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl HaitiPayoutProfile {
    /// Document path.
    #[must_use]
    pub fn path(organizer: &UserId) -> DocumentPath {
        DocumentPath::nested(collections::ORGANIZERS, organizer.as_str(), PROFILES, "haiti")
    }

    /// Summarize `destinations` as of `now`.
    #[must_use]
    pub fn summarize(destinations: &BTreeMap<DestinationId, PayoutDestination>, now: DateTime<Utc>) -> Self {
        let primary = destinations.iter().find(|(_, d)| d.is_primary);
        Self {
            status: primary.map_or(DestinationStatus::NotSetup, |(_, d)| d.status),
            destination_id: primary.map(|(id, _)| id.clone()),
            method: primary.map(|(_, d)| d.kind.label().to_string()),
            display: primary.map(|(_, d)| d.kind.display()),
            destination_count: destinations.len(),
            updated_at: now,
        }
    }
}

/// `organizers/{organizerId}/payoutProfiles/stripe`, written by Stripe Connect onboarding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeConnectProfile {
    /// Connected account id (`acct_...`)
    #[serde(default)]
    pub stripe_account_id: String,
}

impl StripeConnectProfile {
    /// Document path.
    #[must_use]
    pub fn path(organizer: &UserId) -> DocumentPath {
        DocumentPath::nested(collections::ORGANIZERS, organizer.as_str(), PROFILES, "stripe")
    }
}

/// All destinations of `organizer`.
///
/// # Errors
///
/// Store failures and malformed documents.
pub async fn load_destinations(
    store: &dyn DocumentStore,
    organizer: &UserId,
) -> Result<BTreeMap<DestinationId, PayoutDestination>, DocumentError> {
    let collection = format!("{}/{}/{DESTINATIONS}", collections::ORGANIZERS, organizer);
    let found = documents::list::<PayoutDestination>(store, &collection).await?;
    Ok(found.into_iter().map(|(id, d)| (DestinationId::new(id), d)).collect())
}

/// Stripe account id of `organizer`, if onboarding finished.
///
/// # Errors
///
/// Store failures and malformed documents.
pub async fn load_stripe_account(store: &dyn DocumentStore, organizer: &UserId) -> Result<Option<String>, DocumentError> {
    let profile = documents::load::<StripeConnectProfile>(store, &StripeConnectProfile::path(organizer)).await?;
    Ok(profile
        .map(|p| p.stripe_account_id)
        .filter(|id| !id.trim().is_empty()))
}

/// The verified destination to pay a `method` withdrawal to, primary first.
#[must_use]
pub fn eligible_destination(
    destinations: &BTreeMap<DestinationId, PayoutDestination>,
    method: WithdrawalMethod,
) -> Option<(&DestinationId, &PayoutDestination)> {
    let mut candidates: Vec<_> = destinations
        .iter()
        .filter(|(_, d)| d.status == DestinationStatus::Verified && d.supports(method))
        .collect();
    candidates.sort_by_key(|(_, d)| !d.is_primary);
    candidates.into_iter().next()
}

// ============================================================================
// Input normalization
// ============================================================================

/// Hides a value from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Redacted<T>(pub T);

impl<T> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

/// A phone number in E.164 form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedPhone {
    /// `+` followed by digits
    pub e164: String,
    /// `****` followed by the last four digits
    pub masked: String,
}

/// Normalize a phone number.
///
/// Separators are dropped; an eight-digit local number gets Haiti's `+509`.
///
/// # Errors
///
/// [`PayoutError::Validation`] for anything that is not 8 to 15 digits.
pub fn normalize_phone(raw: &str) -> Result<NormalizedPhone, PayoutError> {
    let trimmed = raw.trim();
    if trimmed
        .chars()
        .any(|c| !(c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')' | '.')))
    {
        return Err(PayoutError::Validation("Phone number contains invalid characters".to_string()));
    }
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    let digits = if digits.len() == 8 && !trimmed.starts_with('+') {
        format!("509{digits}")
    } else {
        digits
    };
    if !(8..=15).contains(&digits.len()) {
        return Err(PayoutError::Validation("Phone number must have 8 to 15 digits".to_string()));
    }
    let last4 = &digits[digits.len() - 4..];
    Ok(NormalizedPhone {
        masked: format!("****{last4}"),
        e164: format!("+{digits}"),
    })
}

fn last_four_digits(raw: &str, field: &str, min_len: usize) -> Result<String, PayoutError> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(PayoutError::Validation(format!("{field} must contain only digits")));
    }
    if !(min_len..=34).contains(&cleaned.len()) {
        return Err(PayoutError::Validation(format!("{field} must have {min_len} to 34 digits")));
    }
    Ok(cleaned[cleaned.len() - 4..].to_string())
}

fn phone_hash(phone: &NormalizedPhone) -> String {
    hash_secret("phone", &phone.e164)
}

// ============================================================================
// Errors
// ============================================================================

/// Why a payout action was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayoutError {
    /// No such destination for this organizer.
    #[error("Payout destination {0} not found")]
    NotFound(DestinationId),

    /// Malformed input.
    #[error("{0}")]
    Validation(String),

    /// The same account is already registered.
    #[error("This account is already registered")]
    Duplicate,

    /// The action does not apply to the current status.
    #[error("Cannot {action} a destination that is {from}")]
    InvalidTransition {
        /// Current status
        from: DestinationStatus,
        /// Attempted action
        action: &'static str,
    },

    /// Verified destinations are final.
    #[error("Destination is already verified")]
    AlreadyVerified,

    /// Approval needs a proof document (or a confirmed phone for wallets).
    #[error("Upload a proof document before this destination can be approved")]
    MissingProof,

    /// Phone codes only apply to wallets.
    #[error("Phone verification only applies to mobile money destinations")]
    NotMobileMoney,

    /// No code is outstanding.
    #[error("Request a verification code first")]
    NoCodeRequested,

    /// Code asked for again too soon.
    #[error("Wait {0} seconds before requesting another code")]
    ResendTooSoon(i64),

    /// The outstanding code has expired.
    #[error("Verification code expired; request a new one")]
    CodeExpired,

    /// Too many wrong guesses.
    #[error("Too many incorrect attempts; request a new code")]
    TooManyAttempts,

    /// Wrong code.
    #[error("Incorrect verification code ({remaining} attempts left)")]
    InvalidCode {
        /// Guesses left
        remaining: u8,
    },

    /// The file store refused the upload.
    #[error("Upload failed: {0}")]
    Upload(FileStoreError),

    /// The SMS could not be sent.
    #[error("Failed to send verification code: {0}")]
    Sms(String),

    /// The documents could not be written.
    #[error("Failed to save payout settings: {0}")]
    Storage(String),
}

// ============================================================================
// Actions
// ============================================================================

/// Actions for the payout reducer.
#[derive(Clone, Debug)]
pub enum PayoutAction {
    // Commands
    /// Register a bank account.
    RegisterBank {
        /// Bank name
        bank_name: String,
        /// Name on the account
        account_holder: String,
        /// Full account number (only the last four digits are kept)
        account_number: Redacted<String>,
        /// Routing number, when applicable
        routing_number: Option<Redacted<String>>,
    },
    /// Register a mobile money wallet.
    RegisterMobileMoney {
        /// Operator
        provider: MobileMoneyProvider,
        /// Wallet number
        phone: Redacted<String>,
    },
    /// Upload a proof document.
    SubmitProof {
        /// Target destination
        destination_id: DestinationId,
        /// The file
        upload: FileUpload,
    },
    /// Text a verification code to a wallet number.
    SendPhoneCode {
        /// Target destination
        destination_id: DestinationId,
        /// Wallet number, must match the registered one
        phone: Redacted<String>,
    },
    /// Confirm the texted code.
    ConfirmPhoneCode {
        /// Target destination
        destination_id: DestinationId,
        /// Code the user typed
        code: Redacted<String>,
    },
    /// Make a destination the primary one.
    SetPrimary {
        /// Target destination
        destination_id: DestinationId,
    },
    /// Admin approves.
    Approve {
        /// Target destination
        destination_id: DestinationId,
        /// Reviewing admin
        reviewer: UserId,
    },
    /// Admin fails.
    Fail {
        /// Target destination
        destination_id: DestinationId,
        /// Reviewing admin
        reviewer: UserId,
        /// Reason shown to the organizer
        reason: String,
    },

    // Effect results
    /// Proof landed in the file store.
    ProofStored {
        /// Target destination
        destination_id: DestinationId,
        /// Where it landed
        path: StoragePath,
    },
    /// The file store refused the proof.
    UploadFailed {
        /// Why
        error: FileStoreError,
    },
    /// The SMS provider accepted the code.
    CodeSent {
        /// Target destination
        destination_id: DestinationId,
    },
    /// The SMS provider refused the code.
    SmsFailed {
        /// Provider message
        message: String,
    },
    /// Documents written.
    Persisted,
    /// Documents could not be written.
    PersistFailed {
        /// Store message
        message: String,
    },
}

// ============================================================================
// State and environment
// ============================================================================

/// A verification SMS queued behind its document write.
#[derive(Clone)]
pub struct PendingSms {
    /// Destination being verified
    pub destination_id: DestinationId,
    /// E.164 number
    pub to: String,
    /// Message text, includes the code
    pub body: String,
}

impl fmt::Debug for PendingSms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSms")
            .field("destination_id", &self.destination_id)
            .finish_non_exhaustive()
    }
}

/// Payout settings of one organizer.
#[derive(Clone, Debug)]
pub struct PayoutState {
    /// Owner
    pub organizer_id: UserId,
    /// Every registered destination
    pub destinations: BTreeMap<DestinationId, PayoutDestination>,
    /// Destination created by the last register command
    pub registered: Option<DestinationId>,
    /// Proof written by this run but not yet recorded
    pub pending_upload: Option<StoragePath>,
    /// Proof the pending upload supersedes, removed once the new one is saved
    pub replaced_upload: Option<StoragePath>,
    /// Code message waiting for its hash to be stored
    pub pending_sms: Option<PendingSms>,
    /// Last refusal or failure
    pub last_error: Option<PayoutError>,
}

impl PayoutState {
    /// State for `organizer_id` with its stored destinations.
    #[must_use]
    pub const fn new(organizer_id: UserId, destinations: BTreeMap<DestinationId, PayoutDestination>) -> Self {
        Self {
            organizer_id,
            destinations,
            registered: None,
            pending_upload: None,
            replaced_upload: None,
            pending_sms: None,
            last_error: None,
        }
    }

    /// Summary document for the current destinations.
    #[must_use]
    pub fn profile(&self, now: DateTime<Utc>) -> HaitiPayoutProfile {
        HaitiPayoutProfile::summarize(&self.destinations, now)
    }
}

/// Dependencies of the payout reducer.
#[derive(Clone)]
pub struct PayoutEnvironment {
    /// Timestamps
    pub clock: Arc<dyn Clock>,
    /// Destination ids
    pub ids: Arc<dyn IdGenerator>,
    /// Phone codes
    pub secrets: Arc<dyn SecretGenerator>,
    /// Destination documents
    pub documents: Arc<dyn DocumentStore>,
    /// Proof uploads
    pub files: Arc<dyn FileStore>,
    /// Code delivery
    pub sms: Arc<dyn SmsSender>,
    /// Phone code lifetime
    pub code_ttl: Duration,
    /// Wrong guesses allowed per code
    pub max_code_attempts: u8,
}

impl PayoutEnvironment {
    /// Bundle the dependencies with the default code policy.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        secrets: Arc<dyn SecretGenerator>,
        documents: Arc<dyn DocumentStore>,
        files: Arc<dyn FileStore>,
        sms: Arc<dyn SmsSender>,
    ) -> Self {
        Self {
            clock,
            ids,
            secrets,
            documents,
            files,
            sms,
            code_ttl: Duration::minutes(DEFAULT_CODE_TTL_MINUTES),
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
        }
    }

    /// Override the phone code policy.
    #[must_use]
    pub fn with_code_policy(mut self, ttl: Duration, max_attempts: u8) -> Self {
        self.code_ttl = ttl;
        self.max_code_attempts = max_attempts;
        self
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for payout destinations.
#[derive(Clone, Debug, Default)]
pub struct PayoutReducer;

type Effects = SmallVec<[Effect<PayoutAction>; 4]>;

impl PayoutReducer {
    /// Creates a new `PayoutReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn fail(state: &mut PayoutState, error: PayoutError) -> Effects {
        tracing::debug!(organizer = %state.organizer_id, %error, "Payout action refused");
        state.last_error = Some(error);
        SmallVec::new()
    }

    /// Keep exactly one primary destination. Returns the ids it touched.
    fn normalize_primary(destinations: &mut BTreeMap<DestinationId, PayoutDestination>) -> Vec<DestinationId> {
        let primaries: Vec<DestinationId> = destinations
            .iter()
            .filter(|(_, d)| d.is_primary)
            .map(|(id, _)| id.clone())
            .collect();

        match primaries.as_slice() {
            [_] => Vec::new(),
            [] => {
                let pick = destinations
                    .iter()
                    .filter(|(_, d)| d.status != DestinationStatus::Failed)
                    .min_by_key(|(id, d)| (d.created_at, (*id).clone()))
                    .or_else(|| destinations.iter().min_by_key(|(id, d)| (d.created_at, (*id).clone())))
                    .map(|(id, _)| id.clone());
                if let Some(d) = pick.as_ref().and_then(|id| destinations.get_mut(id)) {
                    d.is_primary = true;
                }
                pick.into_iter().collect()
            },
            [_keep, rest @ ..] => {
                for id in rest {
                    if let Some(d) = destinations.get_mut(id) {
                        d.is_primary = false;
                    }
                }
                rest.to_vec()
            },
        }
    }

    /// Move the primary flag off a failed `from` onto the oldest verified sibling.
    fn hand_off_primary(
        destinations: &mut BTreeMap<DestinationId, PayoutDestination>,
        from: &DestinationId,
        now: DateTime<Utc>,
    ) -> Vec<DestinationId> {
        if !destinations.get(from).is_some_and(|d| d.is_primary) {
            return Vec::new();
        }
        let Some(to) = destinations
            .iter()
            .filter(|(id, d)| *id != from && d.status == DestinationStatus::Verified)
            .min_by_key(|(id, d)| (d.created_at, (*id).clone()))
            .map(|(id, _)| id.clone())
        else {
            return Vec::new();
        };
        for (id, primary) in [(from, false), (&to, true)] {
            if let Some(d) = destinations.get_mut(id) {
                d.is_primary = primary;
                d.updated_at = now;
            }
        }
        vec![from.clone(), to]
    }

    fn persist_effect(state: &PayoutState, env: &PayoutEnvironment, changed: &[DestinationId]) -> Effect<PayoutAction> {
        let mut writes: Vec<DocumentWrite> = changed
            .iter()
            .filter_map(|id| {
                state
                    .destinations
                    .get(id)
                    .map(|d| DocumentWrite::set(PayoutDestination::path(&state.organizer_id, id), d))
            })
            .collect();
        writes.push(DocumentWrite::set(
            HaitiPayoutProfile::path(&state.organizer_id),
            &state.profile(env.clock.now()),
        ));

        write_documents(&env.documents, writes, PayoutAction::Persisted, |e| {
            PayoutAction::PersistFailed { message: e.to_string() }
        })
    }

    fn persist(state: &PayoutState, env: &PayoutEnvironment, changed: &[DestinationId]) -> Effects {
        smallvec![Self::persist_effect(state, env, changed)]
    }

    fn register(state: &mut PayoutState, env: &PayoutEnvironment, kind: DestinationKind) -> Effects {
        if state
            .destinations
            .values()
            .any(|d| d.status != DestinationStatus::Failed && d.same_account(&kind))
        {
            return Self::fail(state, PayoutError::Duplicate);
        }

        let now = env.clock.now();
        let id = DestinationId::new(env.ids.next_id());
        tracing::info!(organizer = %state.organizer_id, destination = %id, kind = kind.label(), "Payout destination registered");

        state.destinations.insert(
            id.clone(),
            PayoutDestination {
                organizer_id: state.organizer_id.clone(),
                kind,
                status: DestinationStatus::PendingVerification,
                is_primary: false,
                proof_document_path: None,
                failure_reason: None,
                phone_verification: None,
                created_at: now,
                updated_at: now,
                verified_at: None,
            },
        );
        let mut changed = vec![id.clone()];
        changed.extend(Self::normalize_primary(&mut state.destinations));
        state.registered = Some(id);
        Self::persist(state, env, &changed)
    }

    fn destination_mut<'a>(
        state: &'a mut PayoutState,
        id: &DestinationId,
    ) -> Result<&'a mut PayoutDestination, PayoutError> {
        state
            .destinations
            .get_mut(id)
            .ok_or_else(|| PayoutError::NotFound(id.clone()))
    }
}

impl Reducer for PayoutReducer {
    type State = PayoutState;
    type Action = PayoutAction;
    type Environment = PayoutEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(&self, state: &mut Self::State, action: Self::Action, env: &Self::Environment) -> Effects {
        let now = env.clock.now();

        match action {
            // ========== Registration ==========
            PayoutAction::RegisterBank {
                bank_name,
                account_holder,
                account_number,
                routing_number,
            } => {
                state.last_error = None;
                let bank_name = bank_name.trim().to_string();
                let account_holder = account_holder.trim().to_string();
                if bank_name.is_empty() || account_holder.is_empty() {
                    return Self::fail(
                        state,
                        PayoutError::Validation("Bank name and account holder are required".to_string()),
                    );
                }
                let account_last4 = match last_four_digits(&account_number.0, "Account number", 6) {
                    Ok(last4) => last4,
                    Err(e) => return Self::fail(state, e),
                };
                let routing_last4 = match routing_number
                    .map(|r| r.0)
                    .filter(|r| !r.trim().is_empty())
                    .map(|r| last_four_digits(&r, "Routing number", 4))
                    .transpose()
                {
                    Ok(last4) => last4,
                    Err(e) => return Self::fail(state, e),
                };

                Self::register(
                    state,
                    env,
                    DestinationKind::Bank {
                        bank_name,
                        account_holder,
                        account_number_last4: account_last4,
                        routing_number_last4: routing_last4,
                    },
                )
            },

            PayoutAction::RegisterMobileMoney { provider, phone } => {
                state.last_error = None;
                let phone = match normalize_phone(&phone.0) {
                    Ok(phone) => phone,
                    Err(e) => return Self::fail(state, e),
                };
                Self::register(
                    state,
                    env,
                    DestinationKind::MobileMoney {
                        provider,
                        phone_hash: phone_hash(&phone),
                        phone_masked: phone.masked,
                        phone_verified: false,
                    },
                )
            },

            // ========== Proof documents ==========
            PayoutAction::SubmitProof { destination_id, upload } => {
                state.last_error = None;
                let status = match Self::destination_mut(state, &destination_id) {
                    Ok(d) => d.status,
                    Err(e) => return Self::fail(state, e),
                };
                if status == DestinationStatus::Verified {
                    return Self::fail(state, PayoutError::AlreadyVerified);
                }
                if let Err(e) = upload.check_size() {
                    return Self::fail(state, PayoutError::Upload(e));
                }

                let path = StoragePath::verification(
                    state.organizer_id.as_str(),
                    "payoutProof",
                    now.timestamp_millis(),
                    upload.extension(),
                );
                let files = Arc::clone(&env.files);
                smallvec![Effect::future(async move {
                    match files.put(path, upload.bytes, upload.content_type).await {
                        Ok(stored) => Some(PayoutAction::ProofStored {
                            destination_id,
                            path: stored.path,
                        }),
                        Err(error) => Some(PayoutAction::UploadFailed { error }),
                    }
                })]
            },

            PayoutAction::ProofStored { destination_id, path } => {
                let destination = match Self::destination_mut(state, &destination_id) {
                    Ok(d) => d,
                    Err(e) => return Self::fail(state, e),
                };
                let previous = destination.proof_document_path.replace(path.clone());
                if destination.status == DestinationStatus::Failed {
                    destination.status = DestinationStatus::PendingVerification;
                    destination.failure_reason = None;
                }
                destination.updated_at = now;
                state.replaced_upload = previous.filter(|p| *p != path);
                state.pending_upload = Some(path);
                Self::persist(state, env, &[destination_id])
            },

            PayoutAction::UploadFailed { error } => {
                tracing::warn!(organizer = %state.organizer_id, %error, "Payout proof upload failed");
                Self::fail(state, PayoutError::Upload(error))
            },

            // ========== Phone verification ==========
            PayoutAction::SendPhoneCode { destination_id, phone } => {
                state.last_error = None;
                let phone = match normalize_phone(&phone.0) {
                    Ok(phone) => phone,
                    Err(e) => return Self::fail(state, e),
                };
                let destination = match Self::destination_mut(state, &destination_id) {
                    Ok(d) => d,
                    Err(e) => return Self::fail(state, e),
                };
                let registered_hash = match &destination.kind {
                    DestinationKind::MobileMoney { phone_hash, .. } => phone_hash.clone(),
                    DestinationKind::Bank { .. } => return Self::fail(state, PayoutError::NotMobileMoney),
                };
                match destination.status {
                    DestinationStatus::PendingVerification => {},
                    DestinationStatus::Verified => return Self::fail(state, PayoutError::AlreadyVerified),
                    from => return Self::fail(state, PayoutError::InvalidTransition { from, action: "verify" }),
                }
                if registered_hash != phone_hash(&phone) {
                    return Self::fail(
                        state,
                        PayoutError::Validation("Phone number does not match this destination".to_string()),
                    );
                }
                if let Some(previous) = &destination.phone_verification {
                    let wait = CODE_RESEND_SECONDS - (now - previous.sent_at).num_seconds();
                    if wait > 0 {
                        return Self::fail(state, PayoutError::ResendTooSoon(wait));
                    }
                }

                let code = env.secrets.phone_code();
                destination.phone_verification = Some(PhoneVerification {
                    code_hash: hash_secret(destination_id.as_str(), &code),
                    sent_at: now,
                    expires_at: now + env.code_ttl,
                    attempts: 0,
                });
                destination.updated_at = now;

                let minutes = env.code_ttl.num_minutes();
                state.pending_sms = Some(PendingSms {
                    destination_id: destination_id.clone(),
                    to: phone.e164,
                    body: format!("Your EventHaiti verification code is {code}. It expires in {minutes} minutes."),
                });
                Self::persist(state, env, &[destination_id])
            },

            PayoutAction::CodeSent { destination_id } => {
                tracing::info!(organizer = %state.organizer_id, destination = %destination_id, "Phone verification code sent");
                SmallVec::new()
            },

            PayoutAction::SmsFailed { message } => Self::fail(state, PayoutError::Sms(message)),

            PayoutAction::ConfirmPhoneCode { destination_id, code } => {
                state.last_error = None;
                let max_attempts = env.max_code_attempts;
                let destination = match Self::destination_mut(state, &destination_id) {
                    Ok(d) => d,
                    Err(e) => return Self::fail(state, e),
                };
                if !matches!(destination.kind, DestinationKind::MobileMoney { .. }) {
                    return Self::fail(state, PayoutError::NotMobileMoney);
                }
                if destination.status != DestinationStatus::PendingVerification {
                    let from = destination.status;
                    return Self::fail(state, PayoutError::InvalidTransition { from, action: "verify" });
                }
                let Some(pending) = destination.phone_verification.as_mut() else {
                    return Self::fail(state, PayoutError::NoCodeRequested);
                };
                if now > pending.expires_at {
                    return Self::fail(state, PayoutError::CodeExpired);
                }
                if pending.attempts >= max_attempts {
                    return Self::fail(state, PayoutError::TooManyAttempts);
                }

                if !verify_secret(destination_id.as_str(), code.0.trim(), &pending.code_hash) {
                    pending.attempts += 1;
                    let remaining = max_attempts.saturating_sub(pending.attempts);
                    destination.updated_at = now;
                    state.last_error = Some(PayoutError::InvalidCode { remaining });
                    return Self::persist(state, env, &[destination_id]);
                }

                destination.phone_verification = None;
                if let DestinationKind::MobileMoney { phone_verified, .. } = &mut destination.kind {
                    *phone_verified = true;
                }
                destination.status = DestinationStatus::Verified;
                destination.failure_reason = None;
                destination.verified_at = Some(now);
                destination.updated_at = now;
                tracing::info!(organizer = %state.organizer_id, destination = %destination_id, "Wallet verified by SMS code");
                Self::persist(state, env, &[destination_id])
            },

            // ========== Primary ==========
            PayoutAction::SetPrimary { destination_id } => {
                state.last_error = None;
                let status = match Self::destination_mut(state, &destination_id) {
                    Ok(d) => d.status,
                    Err(e) => return Self::fail(state, e),
                };
                if status == DestinationStatus::Failed {
                    return Self::fail(
                        state,
                        PayoutError::InvalidTransition {
                            from: status,
                            action: "make primary",
                        },
                    );
                }

                let mut changed = Vec::new();
                for (id, destination) in &mut state.destinations {
                    let primary = *id == destination_id;
                    if destination.is_primary != primary {
                        destination.is_primary = primary;
                        destination.updated_at = now;
                        changed.push(id.clone());
                    }
                }
                Self::persist(state, env, &changed)
            },

            // ========== Admin review ==========
            PayoutAction::Approve { destination_id, reviewer } => {
                state.last_error = None;
                let destination = match Self::destination_mut(state, &destination_id) {
                    Ok(d) => d,
                    Err(e) => return Self::fail(state, e),
                };
                if destination.status != DestinationStatus::PendingVerification {
                    let from = destination.status;
                    return Self::fail(state, PayoutError::InvalidTransition { from, action: "approve" });
                }
                let has_evidence = destination.proof_document_path.is_some()
                    || matches!(destination.kind, DestinationKind::MobileMoney { phone_verified: true, .. });
                if !has_evidence {
                    return Self::fail(state, PayoutError::MissingProof);
                }

                destination.status = DestinationStatus::Verified;
                destination.verified_at = Some(now);
                destination.updated_at = now;
                tracing::info!(destination = %destination_id, %reviewer, "Payout destination approved");
                Self::persist(state, env, &[destination_id])
            },

            PayoutAction::Fail {
                destination_id,
                reviewer,
                reason,
            } => {
                state.last_error = None;
                if reason.trim().is_empty() {
                    return Self::fail(state, PayoutError::Validation("A failure reason is required".to_string()));
                }
                let destination = match Self::destination_mut(state, &destination_id) {
                    Ok(d) => d,
                    Err(e) => return Self::fail(state, e),
                };
                if destination.status != DestinationStatus::PendingVerification {
                    let from = destination.status;
                    return Self::fail(state, PayoutError::InvalidTransition { from, action: "fail" });
                }

                destination.status = DestinationStatus::Failed;
                destination.failure_reason = Some(reason);
                destination.phone_verification = None;
                destination.updated_at = now;
                tracing::info!(destination = %destination_id, %reviewer, "Payout destination failed review");

                let mut changed = vec![destination_id.clone()];
                changed.extend(Self::hand_off_primary(&mut state.destinations, &destination_id, now));
                changed.dedup();
                Self::persist(state, env, &changed)
            },

            // ========== Persistence results ==========
            PayoutAction::Persisted => {
                state.pending_upload = None;
                let mut effects = Effects::new();
                if let Some(replaced) = state.replaced_upload.take() {
                    let files = Arc::clone(&env.files);
                    effects.push(Effect::future(async move {
                        if let Err(error) = files.delete(replaced.clone()).await {
                            tracing::warn!(path = %replaced, %error, "Failed to remove replaced proof");
                        }
                        None
                    }));
                }
                // The code hash is stored, so the code can go out.
                if let Some(PendingSms { destination_id, to, body }) = state.pending_sms.take() {
                    let sms = Arc::clone(&env.sms);
                    effects.push(Effect::future(async move {
                        match sms.send(to, body).await {
                            Ok(()) => Some(PayoutAction::CodeSent { destination_id }),
                            Err(e) => Some(PayoutAction::SmsFailed { message: e.to_string() }),
                        }
                    }));
                }
                effects
            },

            PayoutAction::PersistFailed { message } => {
                state.last_error = Some(PayoutError::Storage(message));
                state.pending_sms = None;
                let replaced = state.replaced_upload.take();
                let Some(orphan) = state.pending_upload.take() else {
                    return SmallVec::new();
                };
                // The stored document still points at the previous proof
                for destination in state.destinations.values_mut() {
                    if destination.proof_document_path.as_ref() == Some(&orphan) {
                        destination.proof_document_path.clone_from(&replaced);
                    }
                }
                let files = Arc::clone(&env.files);
                smallvec![Effect::future(async move {
                    if let Err(error) = files.delete(orphan.clone()).await {
                        tracing::error!(path = %orphan, %error, "Failed to remove orphaned proof");
                    }
                    None
                })]
            },
        }
    }
}

//! Organizer identity verification.
//!
//! One `verification_requests/{userId}` document per user tracks five named
//! onboarding steps, the uploaded documents, and the review lifecycle:
//!
//! ```text
//! not_started ─edit─▶ in_progress ─submit─▶ pending_review ─begin─▶ in_review
//!                          ▲                      │                    │
//!                          │                      ├──────approve───────┼─▶ approved
//!                       reapply                   ├──request changes───┼─▶ changes_requested ─submit─▶ pending_review
//!                          │                      └──────reject────────┴─▶ rejected
//!                          └──────────────────────────────────────────────────┘
//! ```
//!
//! The request is created lazily with the default steps on first access.
//! Steps cannot be edited while the request is under review, approved, or
//! rejected.

use crate::persistence::{DocumentWrite, write_documents};
use crate::types::{UserId, collections};
use chrono::{DateTime, Utc};
use eventhaiti_core::documents::{DocumentPath, DocumentStore};
use eventhaiti_core::effect::Effect;
use eventhaiti_core::environment::Clock;
use eventhaiti_core::files::{FileStore, FileStoreError, FileUpload, StoragePath};
use eventhaiti_core::reducer::Reducer;
use eventhaiti_core::{SmallVec, smallvec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Statuses and steps
// ============================================================================

/// Overall status of a verification request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Created, nothing filled in yet.
    NotStarted,
    /// At least one step was edited.
    InProgress,
    /// Submitted, waiting for an admin.
    PendingReview,
    /// An admin picked it up.
    InReview,
    /// Verified organizer.
    Approved,
    /// Admin asked for fixes on specific steps.
    ChangesRequested,
    /// Refused; the user may reapply.
    Rejected,
}

impl VerificationStatus {
    /// Step edits and uploads are refused in these statuses.
    #[must_use]
    pub const fn is_locked(self) -> bool {
        matches!(
            self,
            Self::PendingReview | Self::InReview | Self::Approved | Self::Rejected
        )
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::PendingReview => "pending_review",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::ChangesRequested => "changes_requested",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed onboarding steps, in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepId {
    /// Name, contact and organization.
    OrganizerInfo,
    /// Government-issued id, both sides.
    GovernmentId,
    /// Selfie holding the id.
    Selfie,
    /// Business registration (optional).
    BusinessDetails,
    /// Payout method on file.
    PayoutSetup,
}

impl StepId {
    /// Every step in display order.
    pub const ALL: [Self; 5] = [
        Self::OrganizerInfo,
        Self::GovernmentId,
        Self::Selfie,
        Self::BusinessDetails,
        Self::PayoutSetup,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrganizerInfo => "organizerInfo",
            Self::GovernmentId => "governmentId",
            Self::Selfie => "selfie",
            Self::BusinessDetails => "businessDetails",
            Self::PayoutSetup => "payoutSetup",
        }
    }

    /// Whether the step gates submission.
    #[must_use]
    pub const fn is_required(self) -> bool {
        !matches!(self, Self::BusinessDetails)
    }

    const fn title(self) -> &'static str {
        match self {
            Self::OrganizerInfo => "Organizer information",
            Self::GovernmentId => "Government ID",
            Self::Selfie => "Selfie verification",
            Self::BusinessDetails => "Business details",
            Self::PayoutSetup => "Payout setup",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::OrganizerInfo => "Tell us who you are and how to reach you",
            Self::GovernmentId => "Upload the front and back of a valid government ID",
            Self::Selfie => "Take a selfie holding your ID",
            Self::BusinessDetails => "Registered businesses can add their registration documents",
            Self::PayoutSetup => "Add a bank account or mobile money number for payouts",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion status of one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not done yet.
    Incomplete,
    /// Done.
    Complete,
    /// Flagged by a reviewer.
    NeedsAttention,
}

/// One step of a verification request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStep {
    /// Display title
    pub title: String,
    /// Display description
    pub description: String,
    /// Completion status
    pub status: StepStatus,
    /// Whether the step gates submission
    pub required: bool,
    /// Free-form form values entered for this step
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// Field names still missing
    #[serde(default)]
    pub missing_fields: Vec<String>,
    /// Reviewer or validation message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl VerificationStep {
    /// Default definition of `step`.
    #[must_use]
    pub fn new(step: StepId) -> Self {
        Self {
            title: step.title().to_string(),
            description: step.description().to_string(),
            status: StepStatus::Incomplete,
            required: step.is_required(),
            fields: serde_json::Map::new(),
            missing_fields: Vec::new(),
            error_message: None,
        }
    }
}

/// Kinds of uploaded verification documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentType {
    /// Front of the id card
    GovernmentIdFront,
    /// Back of the id card
    GovernmentIdBack,
    /// Selfie with id
    Selfie,
    /// Business registration certificate
    BusinessRegistration,
    /// Bank statement or mobile money screenshot
    PayoutProof,
}

impl DocumentType {
    /// Wire name, also used in storage paths.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GovernmentIdFront => "governmentIdFront",
            Self::GovernmentIdBack => "governmentIdBack",
            Self::Selfie => "selfie",
            Self::BusinessRegistration => "businessRegistration",
            Self::PayoutProof => "payoutProof",
        }
    }

    /// The step this document belongs to.
    #[must_use]
    pub const fn step(self) -> StepId {
        match self {
            Self::GovernmentIdFront | Self::GovernmentIdBack => StepId::GovernmentId,
            Self::Selfie => StepId::Selfie,
            Self::BusinessRegistration => StepId::BusinessDetails,
            Self::PayoutProof => StepId::PayoutSetup,
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::GovernmentIdFront,
            Self::GovernmentIdBack,
            Self::Selfie,
            Self::BusinessRegistration,
            Self::PayoutProof,
        ]
        .into_iter()
        .find(|t| t.as_str() == s)
        .ok_or_else(|| VerificationError::Validation(format!("Unknown document type: {s}")))
    }
}

// ============================================================================
// Document
// ============================================================================

/// `verification_requests/{userId}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    /// Owner
    pub user_id: UserId,
    /// Overall status
    pub status: VerificationStatus,
    /// The fixed steps
    pub steps: BTreeMap<StepId, VerificationStep>,
    /// Uploaded documents
    #[serde(default)]
    pub files: BTreeMap<DocumentType, StoragePath>,
    /// Last submission time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    /// Last review decision time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Reviewing admin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<UserId>,
    /// Reviewer notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,
    /// Why the request was rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl VerificationRequest {
    /// A fresh request with the default steps.
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            status: VerificationStatus::NotStarted,
            steps: default_steps(),
            files: BTreeMap::new(),
            submitted_at: None,
            reviewed_at: None,
            reviewed_by: None,
            review_notes: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Document path for `user`.
    #[must_use]
    pub fn path(user: &UserId) -> DocumentPath {
        DocumentPath::new(collections::VERIFICATION_REQUESTS, user.as_str())
    }

    /// See [`calculate_completion_percentage`].
    #[must_use]
    pub fn completion_percentage(&self) -> u8 {
        calculate_completion_percentage(&self.steps)
    }

    /// Required steps that are not `complete`, in display order.
    #[must_use]
    pub fn missing_required_steps(&self) -> Vec<StepId> {
        StepId::ALL
            .into_iter()
            .filter(|id| id.is_required())
            .filter(|id| {
                self.steps
                    .get(id)
                    .is_none_or(|step| step.status != StepStatus::Complete)
            })
            .collect()
    }
}

fn default_steps() -> BTreeMap<StepId, VerificationStep> {
    StepId::ALL
        .into_iter()
        .map(|id| (id, VerificationStep::new(id)))
        .collect()
}

/// `round(100 × completed required steps / required steps)`, halves rounding up.
///
/// A request without required steps counts as complete.
#[must_use]
pub fn calculate_completion_percentage(steps: &BTreeMap<StepId, VerificationStep>) -> u8 {
    let required = steps.values().filter(|s| s.required);
    let (total, complete) = required.fold((0u32, 0u32), |(total, complete), step| {
        (total + 1, complete + u32::from(step.status == StepStatus::Complete))
    });
    if total == 0 {
        return 100;
    }
    // (200c + t) / 2t == round(100c / t) with halves rounding up
    let percent = (200 * complete + total) / (2 * total);
    u8::try_from(percent).unwrap_or(100)
}

// ============================================================================
// Errors
// ============================================================================

/// Why a verification action was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// Steps are frozen in this status.
    #[error("Verification request cannot be edited while {0}")]
    Locked(VerificationStatus),

    /// Submission attempted with required steps left.
    #[error("Complete all required steps before submitting: {}", join_steps(.0))]
    IncompleteSteps(Vec<StepId>),

    /// The action does not apply to the current status.
    #[error("Cannot {action} a verification request that is {from}")]
    InvalidTransition {
        /// Current status
        from: VerificationStatus,
        /// Attempted action
        action: &'static str,
    },

    /// Malformed input.
    #[error("{0}")]
    Validation(String),

    /// The file store refused the upload.
    #[error("Upload failed: {0}")]
    Upload(FileStoreError),

    /// The document could not be written.
    #[error("Failed to save verification request: {0}")]
    Storage(String),
}

fn join_steps(steps: &[StepId]) -> String {
    steps.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// Actions
// ============================================================================

/// Partial update of one step. Absent fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPatch {
    /// New status
    #[serde(default)]
    pub status: Option<StepStatus>,
    /// Form values, merged key by key
    #[serde(default)]
    pub fields: Option<serde_json::Map<String, serde_json::Value>>,
    /// Replacement list of missing fields
    #[serde(default)]
    pub missing_fields: Option<Vec<String>>,
    /// Replacement message
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Actions for the verification reducer.
#[derive(Clone, Debug)]
pub enum VerificationAction {
    // Commands
    /// Create the request with default steps if it does not exist.
    Initialize,
    /// Merge a partial update into one step.
    UpdateStep {
        /// Target step
        step: StepId,
        /// Changes
        patch: StepPatch,
    },
    /// Store an uploaded document and attach it to the request.
    UploadDocument {
        /// What the file is
        document_type: DocumentType,
        /// The file
        upload: FileUpload,
    },
    /// Flip to `pending_review`.
    Submit,
    /// Admin starts reviewing.
    BeginReview {
        /// Reviewing admin
        reviewer: UserId,
    },
    /// Admin approves.
    Approve {
        /// Reviewing admin
        reviewer: UserId,
        /// Optional notes
        notes: Option<String>,
    },
    /// Admin flags steps for rework.
    RequestChanges {
        /// Reviewing admin
        reviewer: UserId,
        /// Steps to flag
        steps: Vec<StepId>,
        /// What to fix
        notes: String,
    },
    /// Admin rejects.
    Reject {
        /// Reviewing admin
        reviewer: UserId,
        /// Reason shown to the user
        reason: String,
    },
    /// Re-open a rejected request.
    Reapply,

    // Effect results
    /// The upload landed in the file store.
    DocumentStored {
        /// What the file is
        document_type: DocumentType,
        /// Where it landed
        path: StoragePath,
    },
    /// The file store refused the upload.
    UploadFailed {
        /// Why
        error: FileStoreError,
    },
    /// The request document was written.
    Persisted,
    /// The request document could not be written.
    PersistFailed {
        /// Store message
        message: String,
    },
}

// ============================================================================
// State and environment
// ============================================================================

/// State of one user's verification.
#[derive(Clone, Debug)]
pub struct VerificationState {
    /// Owner
    pub user_id: UserId,
    /// Loaded document, `None` until first access
    pub request: Option<VerificationRequest>,
    /// Upload written by this run but not yet recorded in the document
    pub pending_upload: Option<StoragePath>,
    /// Upload the pending one supersedes, removed once the document is saved
    pub replaced_upload: Option<(DocumentType, StoragePath)>,
    /// Last refusal or failure
    pub last_error: Option<VerificationError>,
}

impl VerificationState {
    /// State for `user_id` with the stored document, if any.
    #[must_use]
    pub const fn new(user_id: UserId, request: Option<VerificationRequest>) -> Self {
        Self {
            user_id,
            request,
            pending_upload: None,
            replaced_upload: None,
            last_error: None,
        }
    }
}

/// Dependencies of the verification reducer.
#[derive(Clone)]
pub struct VerificationEnvironment {
    /// Timestamps
    pub clock: Arc<dyn Clock>,
    /// Request documents
    pub documents: Arc<dyn DocumentStore>,
    /// Uploaded files
    pub files: Arc<dyn FileStore>,
}

impl VerificationEnvironment {
    /// Bundle the dependencies.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, documents: Arc<dyn DocumentStore>, files: Arc<dyn FileStore>) -> Self {
        Self { clock, documents, files }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for verification requests.
#[derive(Clone, Debug, Default)]
pub struct VerificationReducer;

impl VerificationReducer {
    /// Creates a new `VerificationReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn ensure_request<'a>(state: &'a mut VerificationState, now: DateTime<Utc>) -> &'a mut VerificationRequest {
        let user_id = state.user_id.clone();
        state
            .request
            .get_or_insert_with(|| VerificationRequest::new(user_id, now))
    }

    fn persist(state: &VerificationState, env: &VerificationEnvironment) -> SmallVec<[Effect<VerificationAction>; 4]> {
        let Some(request) = &state.request else {
            return SmallVec::new();
        };
        smallvec![write_documents(
            &env.documents,
            vec![DocumentWrite::set(VerificationRequest::path(&state.user_id), request)],
            VerificationAction::Persisted,
            |e| VerificationAction::PersistFailed { message: e.to_string() },
        )]
    }

    fn fail(state: &mut VerificationState, error: VerificationError) -> SmallVec<[Effect<VerificationAction>; 4]> {
        tracing::debug!(user = %state.user_id, %error, "Verification action refused");
        state.last_error = Some(error);
        SmallVec::new()
    }

    fn begin_edit(request: &mut VerificationRequest) -> Result<(), VerificationError> {
        if request.status.is_locked() {
            return Err(VerificationError::Locked(request.status));
        }
        if request.status == VerificationStatus::NotStarted {
            request.status = VerificationStatus::InProgress;
        }
        Ok(())
    }

    fn under_review(request: &VerificationRequest, action: &'static str) -> Result<(), VerificationError> {
        match request.status {
            VerificationStatus::PendingReview | VerificationStatus::InReview => Ok(()),
            from => Err(VerificationError::InvalidTransition { from, action }),
        }
    }
}

impl Reducer for VerificationReducer {
    type State = VerificationState;
    type Action = VerificationAction;
    type Environment = VerificationEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let now = env.clock.now();

        match action {
            // ========== Lazy creation ==========
            VerificationAction::Initialize => {
                state.last_error = None;
                if state.request.is_some() {
                    return SmallVec::new();
                }
                Self::ensure_request(state, now);
                Self::persist(state, env)
            },

            // ========== Step edits ==========
            VerificationAction::UpdateStep { step, patch } => {
                state.last_error = None;
                let request = Self::ensure_request(state, now);
                if let Err(e) = Self::begin_edit(request) {
                    return Self::fail(state, e);
                }

                let entry = request.steps.entry(step).or_insert_with(|| VerificationStep::new(step));
                if let Some(status) = patch.status {
                    entry.status = status;
                }
                if let Some(fields) = patch.fields {
                    entry.fields.extend(fields);
                }
                if let Some(missing) = patch.missing_fields {
                    entry.missing_fields = missing;
                }
                if patch.error_message.is_some() {
                    entry.error_message = patch.error_message;
                } else if entry.status == StepStatus::Complete {
                    entry.error_message = None;
                }
                request.updated_at = now;

                Self::persist(state, env)
            },

            // ========== Uploads ==========
            VerificationAction::UploadDocument { document_type, upload } => {
                state.last_error = None;
                let request = Self::ensure_request(state, now);
                if let Err(e) = Self::begin_edit(request) {
                    return Self::fail(state, e);
                }
                if let Err(e) = upload.check_size() {
                    return Self::fail(state, VerificationError::Upload(e));
                }

                let path = StoragePath::verification(
                    state.user_id.as_str(),
                    document_type.as_str(),
                    now.timestamp_millis(),
                    upload.extension(),
                );
                let files = Arc::clone(&env.files);

                smallvec![Effect::future(async move {
                    match files.put(path.clone(), upload.bytes, upload.content_type).await {
                        Ok(stored) => Some(VerificationAction::DocumentStored {
                            document_type,
                            path: stored.path,
                        }),
                        Err(error) => Some(VerificationAction::UploadFailed { error }),
                    }
                })]
            },

            VerificationAction::DocumentStored { document_type, path } => {
                let request = Self::ensure_request(state, now);
                let previous = request.files.insert(document_type, path.clone());
                request.updated_at = now;
                state.replaced_upload = previous.filter(|p| *p != path).map(|p| (document_type, p));
                state.pending_upload = Some(path);
                Self::persist(state, env)
            },

            VerificationAction::UploadFailed { error } => {
                tracing::warn!(user = %state.user_id, %error, "Verification upload failed");
                Self::fail(state, VerificationError::Upload(error))
            },

            // ========== Submission ==========
            VerificationAction::Submit => {
                state.last_error = None;
                let request = Self::ensure_request(state, now);
                if request.status.is_locked() {
                    let from = request.status;
                    return Self::fail(state, VerificationError::InvalidTransition { from, action: "submit" });
                }
                let missing = request.missing_required_steps();
                if !missing.is_empty() {
                    return Self::fail(state, VerificationError::IncompleteSteps(missing));
                }

                request.status = VerificationStatus::PendingReview;
                request.submitted_at = Some(now);
                request.updated_at = now;
                tracing::info!(user = %state.user_id, "Verification submitted for review");
                Self::persist(state, env)
            },

            // ========== Admin review ==========
            VerificationAction::BeginReview { reviewer } => {
                state.last_error = None;
                let request = Self::ensure_request(state, now);
                if request.status != VerificationStatus::PendingReview {
                    let from = request.status;
                    return Self::fail(state, VerificationError::InvalidTransition { from, action: "begin review of" });
                }
                request.status = VerificationStatus::InReview;
                request.reviewed_by = Some(reviewer);
                request.updated_at = now;
                Self::persist(state, env)
            },

            VerificationAction::Approve { reviewer, notes } => {
                state.last_error = None;
                let request = Self::ensure_request(state, now);
                if let Err(e) = Self::under_review(request, "approve") {
                    return Self::fail(state, e);
                }
                request.status = VerificationStatus::Approved;
                request.reviewed_at = Some(now);
                request.reviewed_by = Some(reviewer);
                request.review_notes = notes;
                request.updated_at = now;
                Self::persist(state, env)
            },

            VerificationAction::RequestChanges { reviewer, steps, notes } => {
                state.last_error = None;
                if steps.is_empty() {
                    return Self::fail(state, VerificationError::Validation("Name at least one step to fix".to_string()));
                }
                let request = Self::ensure_request(state, now);
                if let Err(e) = Self::under_review(request, "request changes on") {
                    return Self::fail(state, e);
                }
                for step in steps {
                    let entry = request.steps.entry(step).or_insert_with(|| VerificationStep::new(step));
                    entry.status = StepStatus::NeedsAttention;
                    entry.error_message = Some(notes.clone());
                }
                request.status = VerificationStatus::ChangesRequested;
                request.reviewed_at = Some(now);
                request.reviewed_by = Some(reviewer);
                request.review_notes = Some(notes);
                request.updated_at = now;
                Self::persist(state, env)
            },

            VerificationAction::Reject { reviewer, reason } => {
                state.last_error = None;
                if reason.trim().is_empty() {
                    return Self::fail(state, VerificationError::Validation("A rejection reason is required".to_string()));
                }
                let request = Self::ensure_request(state, now);
                if let Err(e) = Self::under_review(request, "reject") {
                    return Self::fail(state, e);
                }
                request.status = VerificationStatus::Rejected;
                request.reviewed_at = Some(now);
                request.reviewed_by = Some(reviewer);
                request.rejection_reason = Some(reason);
                request.updated_at = now;
                Self::persist(state, env)
            },

            VerificationAction::Reapply => {
                state.last_error = None;
                let request = Self::ensure_request(state, now);
                if request.status != VerificationStatus::Rejected {
                    let from = request.status;
                    return Self::fail(state, VerificationError::InvalidTransition { from, action: "reapply to" });
                }
                // Form values survive so the user only re-checks them.
                for step in request.steps.values_mut() {
                    step.status = StepStatus::Incomplete;
                    step.error_message = None;
                }
                request.status = VerificationStatus::InProgress;
                request.submitted_at = None;
                request.reviewed_at = None;
                request.reviewed_by = None;
                request.review_notes = None;
                request.rejection_reason = None;
                request.updated_at = now;
                Self::persist(state, env)
            },

            // ========== Persistence results ==========
            VerificationAction::Persisted => {
                state.pending_upload = None;
                let Some((_, replaced)) = state.replaced_upload.take() else {
                    return SmallVec::new();
                };
                let files = Arc::clone(&env.files);
                smallvec![Effect::future(async move {
                    if let Err(error) = files.delete(replaced.clone()).await {
                        tracing::warn!(path = %replaced, %error, "Failed to remove replaced upload");
                    }
                    None
                })]
            },

            VerificationAction::PersistFailed { message } => {
                state.last_error = Some(VerificationError::Storage(message));

                // The upload is not referenced by any stored document; remove it.
                let replaced = state.replaced_upload.take();
                let Some(orphan) = state.pending_upload.take() else {
                    return SmallVec::new();
                };
                if let Some(request) = state.request.as_mut() {
                    request.files.retain(|_, path| *path != orphan);
                    if let Some((document_type, previous)) = replaced {
                        request.files.insert(document_type, previous);
                    }
                }
                let files = Arc::clone(&env.files);
                smallvec![Effect::future(async move {
                    if let Err(error) = files.delete(orphan.clone()).await {
                        tracing::error!(path = %orphan, %error, "Failed to remove orphaned upload");
                    } else {
                        tracing::info!(path = %orphan, "Removed orphaned upload");
                    }
                    None
                })]
            },
        }
    }
}

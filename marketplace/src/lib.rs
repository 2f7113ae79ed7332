//! # EventHaiti
//!
//! Marketplace backend for EventHaiti: organizer verification, payout
//! destinations, earnings and withdrawals, the event wizard, staff and
//! check-in, refunds, reviews and push notifications.
//!
//! ## Architecture
//!
//! Every write flow is a reducer over a typed document:
//!
//! - **Verification**: [`verification::VerificationReducer`] tracks KYC steps and admin review
//! - **Payouts**: [`payouts::PayoutReducer`] runs the destination state machine
//! - **Withdrawals**: [`earnings::WithdrawalReducer`] gates withdrawals on settled earnings
//! - **Wizard**: [`wizard::WizardReducer`] validates and publishes events
//! - **Staff**: [`staff::StaffReducer`] issues and redeems invites
//! - **Refunds**: [`refunds::RefundReducer`] handles holder requests and organizer decisions
//!
//! Read models and single-document writes (earnings, engagement, reviews,
//! check-in, push tokens) are plain async functions over a
//! [`eventhaiti_core::documents::DocumentStore`].
//!
//! The [`api`] handlers load documents, run a `Store` per request and map
//! each reducer's `last_error` to an HTTP error. [`server::build_router`]
//! assembles them.

#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod auth;
pub mod checkin;
pub mod config;
pub mod deeplinks;
pub mod earnings;
pub mod engagement;
pub mod payouts;
pub mod persistence;
pub mod push;
pub mod refunds;
pub mod reviews;
pub mod secrets;
pub mod server;
pub mod sms;
pub mod staff;
pub mod storage;
pub mod types;
pub mod verification;
pub mod wizard;

pub use config::Config;
pub use server::{AppState, build_router};

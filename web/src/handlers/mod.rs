//! HTTP request handlers shared by every EventHaiti service.

pub mod health;

pub use health::{health_check, readiness};

//! # EventHaiti Testing
//!
//! Testing utilities and helpers for the EventHaiti backend.
//!
//! This crate provides:
//! - Deterministic implementations of Environment traits
//! - In-memory document and file stores
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//!
//! ## Example
//!
//! ```ignore
//! use eventhaiti_testing::{InMemoryDocumentStore, test_clock};
//! use eventhaiti_runtime::Store;
//!
//! #[tokio::test]
//! async fn submit_flow() {
//!     let env = test_environment();
//!     let state = VerificationState::new(UserId::new("organizer_1"), None);
//!     let store = Store::new(state, VerificationReducer::new(), env);
//!
//!     store.send(VerificationAction::Submit).await.unwrap();
//!
//!     let status = store.state(|s| s.request.as_ref().map(|r| r.status)).await;
//!     assert_eq!(status, Some(VerificationStatus::PendingReview));
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use eventhaiti_core::environment::{Clock, IdGenerator};

/// Reducer Given-When-Then harness
pub mod reducer_test;

/// In-memory document and file stores
pub mod stores;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Duration, IdGenerator, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use eventhaiti_testing::mocks::FixedClock;
    /// use eventhaiti_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }

        /// A clock fixed `by` later than this one
        #[must_use]
        pub fn advanced(&self, by: Duration) -> Self {
            Self {
                time: self.time + by,
            }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable ids: `{prefix}_1`, `{prefix}_2`, ...
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        prefix: String,
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Start counting at 1
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicU64::new(1),
            }
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::Relaxed);
            format!("{}_{n}", self.prefix)
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, SequentialIdGenerator, test_clock};
pub use reducer_test::{ReducerTest, assertions};
pub use stores::{InMemoryDocumentStore, InMemoryFileStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn advanced_clock_moves_by_the_given_amount() {
        let clock = test_clock();
        let later = clock.advanced(Duration::minutes(11));
        assert_eq!(later.now() - clock.now(), Duration::minutes(11));
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIdGenerator::new("evt");
        assert_eq!(ids.next_id(), "evt_1");
        assert_eq!(ids.next_id(), "evt_2");
    }
}

//! # EventHaiti Runtime
//!
//! Store runtime that coordinates reducer execution and effect handling.
//!
//! A [`Store`](store::Store) owns one piece of state. Each request handler
//! builds a store over the document it loaded, sends the user's action, and
//! reads the resulting state back. Effects returned by the reducer are
//! awaited **one after another**; any action an effect produces is fed back
//! into the reducer until the queue drains.
//!
//! ## Example
//!
//! ```ignore
//! use eventhaiti_runtime::Store;
//!
//! let store = Store::new(request, VerificationReducer, environment);
//! store.send(VerificationAction::SubmitForReview).await?;
//! let status = store.state(|s| s.request.status).await;
//! ```

use eventhaiti_core::{effect::Effect, reducer::Reducer};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Prometheus metrics for observability
pub mod metrics;

pub use store::Store;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Effects kept producing actions past the configured limit
        ///
        /// Guards against reducers that feed an action back to themselves
        /// forever.
        #[error("Feedback limit of {0} actions exceeded")]
        FeedbackLimit(usize),
    }
}

pub use error::StoreError;

/// Health check status levels
///
/// Indicates the current health state of a component or system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is operational but slow or partially failing
    Degraded,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// The worse of two statuses
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    /// Create a degraded check result
    #[must_use]
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

/// Aggregated health report
///
/// Combines multiple health checks into an overall system status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    /// Overall system status (worst of all checks)
    pub status: HealthStatus,

    /// Individual component checks
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    /// Create a new health report from checks
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        Self { status, checks }
    }

    /// Check if overall system is healthy
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }
}

/// Default cap on actions processed by a single `send`.
pub const DEFAULT_FEEDBACK_LIMIT: usize = 32;

/// Store module - The runtime for reducers
pub mod store {
    use super::{AtomicBool, Effect, Ordering, Reducer, RwLock, StoreError, VecDeque};

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` so reads never observe a half-applied action)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (sequential, with feedback loop)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: RwLock<S>,
        reducer: R,
        environment: E,
        feedback_limit: usize,
        shutdown: AtomicBool,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync,
        A: Send + std::fmt::Debug,
        S: Send + Sync,
        E: Send + Sync,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self {
                state: RwLock::new(initial_state),
                reducer,
                environment,
                feedback_limit: super::DEFAULT_FEEDBACK_LIMIT,
                shutdown: AtomicBool::new(false),
            }
        }

        /// Override the maximum number of actions one `send` may process
        #[must_use]
        pub fn with_feedback_limit(mut self, limit: usize) -> Self {
            self.feedback_limit = limit;
            self
        }

        /// Injected dependencies
        #[must_use]
        pub const fn environment(&self) -> &E {
            &self.environment
        }

        /// Stop accepting new actions
        pub fn shutdown(&self) {
            self.shutdown.store(true, Ordering::Release);
            tracing::info!("Store shutdown initiated");
        }

        /// Send an action and run it to completion
        ///
        /// The reducer runs under the write lock. Its effects are then
        /// awaited in order with the lock released, and every action they
        /// produce is reduced in turn. Returns the number of actions
        /// processed, including the initial one.
        ///
        /// # Errors
        ///
        /// - [`StoreError::ShutdownInProgress`] after [`Store::shutdown`]
        /// - [`StoreError::FeedbackLimit`] when effects keep producing actions
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<usize, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                return Err(StoreError::ShutdownInProgress);
            }

            let mut queue = VecDeque::from([action]);
            let mut processed = 0usize;

            while let Some(action) = queue.pop_front() {
                if processed >= self.feedback_limit {
                    tracing::error!(limit = self.feedback_limit, "Feedback limit exceeded");
                    return Err(StoreError::FeedbackLimit(self.feedback_limit));
                }
                processed += 1;

                tracing::debug!(?action, "Processing action");
                metrics::counter!("store.actions.processed").increment(1);

                let effects = {
                    let mut state = self.state.write().await;
                    self.reducer.reduce(&mut state, action, &self.environment)
                };

                tracing::trace!("Reducer returned {} effects", effects.len());

                for effect in effects {
                    run_effect(effect, &mut queue).await;
                }
            }

            Ok(processed)
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let status = store.state(|s| s.request.status).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Consume the store and return its final state
        #[must_use]
        pub fn into_state(self) -> S {
            self.state.into_inner()
        }
    }

    /// Await one effect tree in order, queueing produced actions.
    async fn run_effect<A>(effect: Effect<A>, queue: &mut VecDeque<A>) {
        let mut pending = VecDeque::from([effect]);
        while let Some(effect) = pending.pop_front() {
            match effect {
                Effect::None => {},
                Effect::Sequential(effects) => {
                    for (offset, inner) in effects.into_iter().enumerate() {
                        pending.insert(offset, inner);
                    }
                },
                Effect::Future(future) => {
                    if let Some(action) = future.await {
                        queue.push_back(action);
                    }
                },
            }
        }
    }
}

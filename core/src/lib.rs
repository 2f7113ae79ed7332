//! # EventHaiti Core
//!
//! Core traits and types shared by every EventHaiti backend crate.
//!
//! Business rules live in pure reducers; I/O lives behind injected traits.
//!
//! ## Core Concepts
//!
//! - **State**: A typed document (verification request, payout destinations, event draft)
//! - **Action**: Every input a reducer accepts (user commands, admin decisions, effect results)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Description of I/O to run after the reducer returns
//! - **Environment**: Injected dependencies (clock, ids, document store, file store)
//!
//! ## Example
//!
//! ```ignore
//! use eventhaiti_core::{effect::Effect, reducer::Reducer, SmallVec};
//!
//! impl Reducer for VerificationReducer {
//!     type State = VerificationState;
//!     type Action = VerificationAction;
//!     type Environment = VerificationEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut VerificationState,
//!         action: VerificationAction,
//!         env: &VerificationEnvironment,
//!     ) -> SmallVec<[Effect<VerificationAction>; 4]> {
//!         SmallVec::new()
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Document storage abstraction (the Firestore replacement).
pub mod documents;

/// Binary file storage abstraction (verification uploads).
pub mod files;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// Validates the action, updates state in place and returns effect
        /// descriptions for the runtime to execute. Validation failures are
        /// recorded on the state, never returned as panics.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values returned by reducers. The runtime awaits them in
/// order and feeds any produced action back into the reducer.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects one after another
        Sequential(Vec<Effect<Action>>),

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Wrap an async block as an effect
        pub fn future<F>(future: F) -> Effect<Action>
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(future))
        }

        /// True if the effect does nothing
        #[must_use]
        pub fn is_none(&self) -> bool {
            match self {
                Effect::None => true,
                Effect::Sequential(effects) => effects.iter().all(Effect::is_none),
                Effect::Future(_) => false,
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock used in production
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Generates document identifiers
    pub trait IdGenerator: Send + Sync {
        /// Produce a fresh, unique identifier
        fn next_id(&self) -> String;
    }

    /// UUID v4 identifiers
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidGenerator;

    impl IdGenerator for UuidGenerator {
        fn next_id(&self) -> String {
            uuid::Uuid::new_v4().simple().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, IdGenerator, SystemClock, UuidGenerator};

    #[test]
    fn none_and_empty_chains_are_noops() {
        assert!(Effect::<()>::None.is_none());
        assert!(Effect::<()>::chain(vec![Effect::None, Effect::chain(vec![])]).is_none());
        assert!(!Effect::<()>::future(async { None }).is_none());
    }

    #[tokio::test]
    async fn future_effects_resolve_to_their_action() {
        let Effect::Future(fut) = Effect::future(async { Some(7_u8) }) else {
            unreachable!("Effect::future builds a Future effect");
        };
        assert_eq!(fut.await, Some(7));
    }

    #[test]
    fn uuid_ids_are_unique_and_compact() {
        let ids = UuidGenerator;
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(!a.contains('-'));
    }

    #[test]
    fn system_clock_moves_forward() {
        let first = SystemClock.now();
        let second = SystemClock.now();
        assert!(second >= first);
    }
}

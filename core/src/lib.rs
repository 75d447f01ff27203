//! # Courtside Core
//!
//! Core traits and types for the Courtside booking platform.
//!
//! This crate provides the fundamental abstractions used by the schedule,
//! booking, and payment aggregates: event-sourced state machines built on
//! the Reducer pattern, with optimistic concurrency at the event store.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for an aggregate (schedule holds, bookings, payment intents)
//! - **Action**: All possible inputs to a reducer (commands and the events they produce)
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits (e.g. [`environment::Clock`])
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell: reducers are pure, services execute I/O
//! - Events are the source of truth; state is rebuilt by replay
//! - Optimistic concurrency: appends carry an expected stream version
//!
//! ## Example
//!
//! ```ignore
//! use courtside_core::reducer::Reducer;
//!
//! impl Reducer for BookingReducer {
//!     type State = BookingState;
//!     type Action = BookingAction;
//!     type Environment = BookingEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut BookingState,
//!         action: BookingAction,
//!         env: &BookingEnvironment,
//!     ) -> SmallVec<[Effect<BookingAction>; 4]> {
//!         // Validate the command, apply resulting events, describe effects
//!         SmallVec::new()
//!     }
//! }
//! ```

pub mod event;
pub mod event_bus;
pub mod event_store;
pub mod stream;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - the core trait for aggregate business logic.
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They validate commands, apply events to state, and describe (never execute)
/// side effects.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for aggregate business logic.
    ///
    /// # Type Parameters
    ///
    /// - `State`: the aggregate state this reducer operates on
    /// - `Action`: the commands and events this reducer processes
    /// - `Environment`: injected dependencies (clock, policy, ...)
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for PaymentReducer {
    ///     type State = PaymentState;
    ///     type Action = PaymentAction;
    ///     type Environment = PaymentEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut PaymentState,
    ///         action: PaymentAction,
    ///         env: &PaymentEnvironment,
    ///     ) -> SmallVec<[Effect<PaymentAction>; 4]> {
    ///         match action {
    ///             PaymentAction::CapturePayment { intent_id } => {
    ///                 // Validate against current state, apply PaymentCaptured
    ///                 SmallVec::new()
    ///             }
    ///             _ => SmallVec::new(),
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects.
        ///
        /// This is a pure function that:
        /// 1. Validates the action against current state
        /// 2. Updates state in place by applying events
        /// 3. Returns effect descriptions to be executed by the shell
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - side effect descriptions.
///
/// Effects describe side effects to be performed by the imperative shell.
/// They are values (not execution) and are composable.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed.
    ///
    /// Effects are NOT executed immediately. They are descriptions of what
    /// should happen, returned from reducers and interpreted by the service
    /// layer.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: the action type effects can feed back into the reducer
    #[allow(missing_docs)]
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (for timeouts, scheduled transitions)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation.
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
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }
    }
}

/// Environment module - dependency injection traits.
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter, keeping reducers deterministic and testable.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability.
    ///
    /// Booking validation (start in the future), the cancellation window, and
    /// refund eligibility are all decided against an injected clock so tests
    /// can pin time.
    ///
    /// # Examples
    ///
    /// ```
    /// use courtside_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let now = clock.now();
    /// assert!(now.timestamp() > 0);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Ping,
    }

    #[test]
    fn effect_merge_is_parallel() {
        let merged = Effect::<TestAction>::merge(vec![Effect::None, Effect::None]);
        assert!(matches!(merged, Effect::Parallel(effects) if effects.len() == 2));
    }

    #[test]
    fn effect_chain_is_sequential() {
        let chained = Effect::<TestAction>::chain(vec![Effect::None]);
        assert!(matches!(chained, Effect::Sequential(effects) if effects.len() == 1));
    }

    #[test]
    fn effect_debug_formats_delay() {
        let effect = Effect::Delay {
            duration: std::time::Duration::from_secs(60),
            action: Box::new(TestAction::Ping),
        };
        let debug = format!("{effect:?}");
        assert!(debug.contains("Effect::Delay"));
        assert!(debug.contains("Ping"));
    }
}

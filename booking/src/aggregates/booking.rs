//! Booking aggregate: the session lifecycle state machine.
//!
//! Legal transitions:
//!
//! ```text
//! (none) ──create──► Pending ──payment authorized──► Confirmed
//!                       │                               │
//!                       │                         session start
//!                       │                               ▼
//!                       │                          InProgress ──► Completed
//!                       │                               │
//!                       └──────────► Cancelled ◄────────┘ (never: a session
//!                                   (from Pending          underway or done
//!                                    or Confirmed)         cannot be cancelled)
//! ```
//!
//! The cancellation policy and refund eligibility are decided here; the
//! actual refund amount computation belongs to the payment coordinator.
//! Optimistic concurrency (the `StaleState` rejection) is enforced by the
//! version-checked append in the service layer, not in the reducer.

use crate::error::BookingError;
use crate::types::{
    Actor, Booking, BookingId, BookingState, BookingStatus, CoachId, PaymentIntentId, PlayerId,
    RefundEligibility, TimeSlot,
};
use chrono::{DateTime, Duration, Utc};
use courtside_core::environment::Clock;
use courtside_core::{SmallVec, effect::Effect, reducer::Reducer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Cancellation policy
// ============================================================================

/// Platform-wide cancellation policy.
///
/// Thresholds are configurable per deployment, not per coach.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CancellationPolicy {
    /// A confirmed booking cannot be cancelled within this many hours of
    /// its start (protects the coach from last-minute cancellation)
    pub cutoff_hours: i64,
    /// Cancelling at least this many hours before the start earns a full
    /// refund; later cancellations are partial
    pub full_refund_hours: i64,
    /// Percentage refunded on a partial-refund cancellation
    pub partial_refund_percent: u32,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self {
            cutoff_hours: 2,
            full_refund_hours: 24,
            partial_refund_percent: 50,
        }
    }
}

impl CancellationPolicy {
    /// Refund eligibility for a cancellation at `now` of a session starting
    /// at `start`.
    #[must_use]
    pub fn eligibility(&self, now: DateTime<Utc>, start: DateTime<Utc>) -> RefundEligibility {
        if start - now >= Duration::hours(self.full_refund_hours) {
            RefundEligibility::Full
        } else {
            RefundEligibility::Partial
        }
    }

    /// Whether a confirmed booking starting at `start` may still be
    /// cancelled at `now`.
    #[must_use]
    pub fn window_open(&self, now: DateTime<Utc>, start: DateTime<Utc>) -> bool {
        start - now >= Duration::hours(self.cutoff_hours)
    }
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the booking aggregate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BookingAction {
    // Commands
    /// Create a booking in `Pending`
    CreateBooking {
        /// New booking id
        booking_id: BookingId,
        /// Player requesting the session
        player_id: PlayerId,
        /// Coach being booked
        coach_id: CoachId,
        /// Requested interval
        slot: TimeSlot,
        /// Advisory display timezone (IANA name)
        timezone: String,
    },

    /// Confirm the booking after payment authorization
    ConfirmBooking {
        /// Booking to confirm
        booking_id: BookingId,
        /// The authorized payment intent
        intent_id: PaymentIntentId,
    },

    /// Session start (platform-triggered)
    StartSession {
        /// Booking whose session starts
        booking_id: BookingId,
    },

    /// Session end signaled by an external collaborator
    CompleteSession {
        /// Booking whose session ended
        booking_id: BookingId,
    },

    /// Cancel the booking, subject to the cancellation policy
    CancelBooking {
        /// Booking to cancel
        booking_id: BookingId,
        /// Who is cancelling
        actor: Actor,
        /// Cancellation reason
        reason: String,
    },

    // Events
    /// Booking persisted in `Pending`
    BookingCreated {
        /// Booking id
        booking_id: BookingId,
        /// Player on the booking
        player_id: PlayerId,
        /// Coach on the booking
        coach_id: CoachId,
        /// Reserved interval
        slot: TimeSlot,
        /// Display timezone
        timezone: String,
        /// When created
        created_at: DateTime<Utc>,
    },

    /// Payment authorized, booking confirmed
    BookingConfirmed {
        /// Booking id
        booking_id: BookingId,
        /// The authorized intent
        intent_id: PaymentIntentId,
        /// When confirmed
        confirmed_at: DateTime<Utc>,
    },

    /// Session started
    SessionStarted {
        /// Booking id
        booking_id: BookingId,
        /// When started
        started_at: DateTime<Utc>,
    },

    /// Session completed
    SessionCompleted {
        /// Booking id
        booking_id: BookingId,
        /// When completed
        completed_at: DateTime<Utc>,
    },

    /// Booking cancelled
    BookingCancelled {
        /// Booking id
        booking_id: BookingId,
        /// Who cancelled
        cancelled_by: Actor,
        /// Why
        reason: String,
        /// Refund eligibility decided by policy (None when nothing was
        /// authorized yet)
        refund_eligibility: Option<RefundEligibility>,
        /// When cancelled
        cancelled_at: DateTime<Utc>,
    },
}

impl BookingAction {
    /// Whether this action is a command (a request, not a fact).
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::CreateBooking { .. }
                | Self::ConfirmBooking { .. }
                | Self::StartSession { .. }
                | Self::CompleteSession { .. }
                | Self::CancelBooking { .. }
        )
    }

    /// Stable event type identifier for persisted events.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::BookingCreated { .. } => "BookingCreated.v1",
            Self::BookingConfirmed { .. } => "BookingConfirmed.v1",
            Self::SessionStarted { .. } => "SessionStarted.v1",
            Self::SessionCompleted { .. } => "SessionCompleted.v1",
            Self::BookingCancelled { .. } => "BookingCancelled.v1",
            _ => "unknown",
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the booking aggregate.
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Clock for validation and the cancellation window
    pub clock: Arc<dyn Clock>,
    /// Platform cancellation policy
    pub policy: CancellationPolicy,
}

impl BookingEnvironment {
    /// Creates a new `BookingEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, policy: CancellationPolicy) -> Self {
        Self { clock, policy }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the booking lifecycle state machine.
#[derive(Clone, Debug, Default)]
pub struct BookingReducer;

fn invalid(from: BookingStatus, to: BookingStatus) -> BookingError {
    BookingError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

impl BookingReducer {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decide which events a command produces, or reject it.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] for malformed input
    /// - [`BookingError::InvalidTransition`] for illegal workflow steps
    /// - [`BookingError::CancellationWindowClosed`] when a confirmed booking
    ///   is cancelled too close to its start
    /// - [`BookingError::NotFound`] when the booking does not exist
    #[allow(clippy::too_many_lines)] // one arm per lifecycle transition
    pub fn decide(
        state: &BookingState,
        command: &BookingAction,
        now: DateTime<Utc>,
        policy: &CancellationPolicy,
    ) -> Result<Vec<BookingAction>, BookingError> {
        match command {
            BookingAction::CreateBooking {
                booking_id,
                player_id,
                coach_id,
                slot,
                timezone,
            } => {
                if slot.duration_minutes == 0 {
                    return Err(BookingError::Validation(
                        "session duration must be positive".to_string(),
                    ));
                }
                if slot.start <= now {
                    return Err(BookingError::Validation(
                        "session start must be in the future".to_string(),
                    ));
                }
                if state.exists(booking_id) {
                    return Err(BookingError::Validation(format!(
                        "booking {booking_id} already exists"
                    )));
                }
                Ok(vec![BookingAction::BookingCreated {
                    booking_id: *booking_id,
                    player_id: *player_id,
                    coach_id: *coach_id,
                    slot: *slot,
                    timezone: timezone.clone(),
                    created_at: now,
                }])
            },

            BookingAction::ConfirmBooking {
                booking_id,
                intent_id,
            } => {
                let booking = Self::lookup(state, booking_id)?;
                match booking.status {
                    BookingStatus::Pending => Ok(vec![BookingAction::BookingConfirmed {
                        booking_id: *booking_id,
                        intent_id: *intent_id,
                        confirmed_at: now,
                    }]),
                    from => Err(invalid(from, BookingStatus::Confirmed)),
                }
            },

            // The "current time >= start" precondition is policy, not a hard
            // gate: the scheduler fires at start time, but an admin-driven
            // early start is allowed.
            BookingAction::StartSession { booking_id } => {
                let booking = Self::lookup(state, booking_id)?;
                match booking.status {
                    BookingStatus::Confirmed => Ok(vec![BookingAction::SessionStarted {
                        booking_id: *booking_id,
                        started_at: now,
                    }]),
                    from => Err(invalid(from, BookingStatus::InProgress)),
                }
            },

            BookingAction::CompleteSession { booking_id } => {
                let booking = Self::lookup(state, booking_id)?;
                match booking.status {
                    BookingStatus::InProgress => Ok(vec![BookingAction::SessionCompleted {
                        booking_id: *booking_id,
                        completed_at: now,
                    }]),
                    from => Err(invalid(from, BookingStatus::Completed)),
                }
            },

            BookingAction::CancelBooking {
                booking_id,
                actor,
                reason,
            } => {
                let booking = Self::lookup(state, booking_id)?;
                match booking.status {
                    // Nothing authorized yet: always cancellable, nothing to
                    // refund
                    BookingStatus::Pending => Ok(vec![BookingAction::BookingCancelled {
                        booking_id: *booking_id,
                        cancelled_by: *actor,
                        reason: reason.clone(),
                        refund_eligibility: None,
                        cancelled_at: now,
                    }]),
                    BookingStatus::Confirmed => {
                        if !policy.window_open(now, booking.slot.start) {
                            return Err(BookingError::CancellationWindowClosed {
                                cutoff_hours: policy.cutoff_hours,
                            });
                        }
                        Ok(vec![BookingAction::BookingCancelled {
                            booking_id: *booking_id,
                            cancelled_by: *actor,
                            reason: reason.clone(),
                            refund_eligibility: Some(
                                policy.eligibility(now, booking.slot.start),
                            ),
                            cancelled_at: now,
                        }])
                    },
                    from => Err(invalid(from, BookingStatus::Cancelled)),
                }
            },

            event => Err(BookingError::Validation(format!(
                "{} is not a command",
                event.event_type()
            ))),
        }
    }

    fn lookup<'a>(
        state: &'a BookingState,
        booking_id: &BookingId,
    ) -> Result<&'a Booking, BookingError> {
        state.get(booking_id).ok_or_else(|| BookingError::NotFound {
            entity: "booking",
            id: booking_id.to_string(),
        })
    }

    /// Applies an event to state.
    pub fn apply_event(state: &mut BookingState, action: &BookingAction) {
        match action {
            BookingAction::BookingCreated {
                booking_id,
                player_id,
                coach_id,
                slot,
                timezone,
                created_at,
            } => {
                state.bookings.insert(
                    *booking_id,
                    Booking::new(
                        *booking_id,
                        *player_id,
                        *coach_id,
                        *slot,
                        timezone.clone(),
                        *created_at,
                    ),
                );
                state.last_error = None;
            },

            BookingAction::BookingConfirmed {
                booking_id,
                intent_id,
                confirmed_at,
            } => {
                if let Some(booking) = state.bookings.get_mut(booking_id) {
                    booking.status = BookingStatus::Confirmed;
                    booking.payment_intent = Some(*intent_id);
                    booking.updated_at = *confirmed_at;
                }
                state.last_error = None;
            },

            BookingAction::SessionStarted {
                booking_id,
                started_at,
            } => {
                if let Some(booking) = state.bookings.get_mut(booking_id) {
                    booking.status = BookingStatus::InProgress;
                    booking.updated_at = *started_at;
                }
                state.last_error = None;
            },

            BookingAction::SessionCompleted {
                booking_id,
                completed_at,
            } => {
                if let Some(booking) = state.bookings.get_mut(booking_id) {
                    booking.status = BookingStatus::Completed;
                    booking.updated_at = *completed_at;
                }
                state.last_error = None;
            },

            BookingAction::BookingCancelled {
                booking_id,
                reason,
                cancelled_at,
                ..
            } => {
                if let Some(booking) = state.bookings.get_mut(booking_id) {
                    booking.status = BookingStatus::Cancelled;
                    booking.cancel_reason = Some(reason.clone());
                    booking.updated_at = *cancelled_at;
                }
                state.last_error = None;
            },

            // Commands don't modify state
            BookingAction::CreateBooking { .. }
            | BookingAction::ConfirmBooking { .. }
            | BookingAction::StartSession { .. }
            | BookingAction::CompleteSession { .. }
            | BookingAction::CancelBooking { .. } => {},
        }
    }
}

impl Reducer for BookingReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if action.is_command() {
            match Self::decide(state, &action, env.clock.now(), &env.policy) {
                Ok(events) => {
                    for event in &events {
                        Self::apply_event(state, event);
                    }
                },
                Err(error) => {
                    state.last_error = Some(error.to_string());
                },
            }
        } else {
            Self::apply_event(state, &action);
        }
        SmallVec::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courtside_testing::{FixedClock, ReducerTest, assertions};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap()
    }

    fn env() -> BookingEnvironment {
        BookingEnvironment::new(Arc::new(FixedClock::new(now())), CancellationPolicy::default())
    }

    fn state_with(booking_id: BookingId, status: BookingStatus, start_in: Duration) -> BookingState {
        let mut state = BookingState::new();
        let mut booking = Booking::new(
            booking_id,
            PlayerId::new(),
            CoachId::new(),
            TimeSlot::new(now() + start_in, 60),
            "America/Montreal".to_string(),
            now() - Duration::hours(1),
        );
        booking.status = status;
        if !matches!(status, BookingStatus::Pending) {
            booking.payment_intent = Some(PaymentIntentId::new());
        }
        state.bookings.insert(booking_id, booking);
        state
    }

    fn decide(
        state: &BookingState,
        command: &BookingAction,
    ) -> Result<Vec<BookingAction>, BookingError> {
        BookingReducer::decide(state, command, now(), &CancellationPolicy::default())
    }

    #[test]
    fn create_booking_lands_in_pending() {
        let booking_id = BookingId::new();

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .when_action(BookingAction::CreateBooking {
                booking_id,
                player_id: PlayerId::new(),
                coach_id: CoachId::new(),
                slot: TimeSlot::new(now() + Duration::hours(3), 60),
                timezone: "America/Montreal".to_string(),
            })
            .then_state(move |state| {
                let booking = state.get(&booking_id).unwrap();
                assert_eq!(booking.status, BookingStatus::Pending);
                assert!(booking.payment_intent.is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn create_rejects_start_in_the_past() {
        let result = decide(
            &BookingState::new(),
            &BookingAction::CreateBooking {
                booking_id: BookingId::new(),
                player_id: PlayerId::new(),
                coach_id: CoachId::new(),
                slot: TimeSlot::new(now() - Duration::minutes(1), 60),
                timezone: "UTC".to_string(),
            },
        );
        assert!(matches!(result, Err(BookingError::Validation(msg)) if msg.contains("future")));
    }

    #[test]
    fn create_rejects_zero_duration() {
        let result = decide(
            &BookingState::new(),
            &BookingAction::CreateBooking {
                booking_id: BookingId::new(),
                player_id: PlayerId::new(),
                coach_id: CoachId::new(),
                slot: TimeSlot::new(now() + Duration::hours(1), 0),
                timezone: "UTC".to_string(),
            },
        );
        assert!(matches!(result, Err(BookingError::Validation(_))));
    }

    #[test]
    fn full_lifecycle_chain_is_legal() {
        let booking_id = BookingId::new();
        let intent_id = PaymentIntentId::new();
        let mut state = BookingState::new();
        let policy = CancellationPolicy::default();

        let steps: Vec<BookingAction> = vec![
            BookingAction::CreateBooking {
                booking_id,
                player_id: PlayerId::new(),
                coach_id: CoachId::new(),
                slot: TimeSlot::new(now() + Duration::hours(3), 60),
                timezone: "UTC".to_string(),
            },
            BookingAction::ConfirmBooking {
                booking_id,
                intent_id,
            },
            BookingAction::StartSession { booking_id },
            BookingAction::CompleteSession { booking_id },
        ];

        for step in steps {
            let events = BookingReducer::decide(&state, &step, now(), &policy).unwrap();
            for event in &events {
                BookingReducer::apply_event(&mut state, event);
            }
        }

        assert_eq!(state.get(&booking_id).unwrap().status, BookingStatus::Completed);
        assert_eq!(state.get(&booking_id).unwrap().payment_intent, Some(intent_id));
    }

    #[test]
    fn pending_cannot_start_a_session() {
        let booking_id = BookingId::new();
        let state = state_with(booking_id, BookingStatus::Pending, Duration::hours(3));

        let result = decide(&state, &BookingAction::StartSession { booking_id });
        assert!(matches!(result, Err(BookingError::InvalidTransition { .. })));
    }

    #[test]
    fn in_progress_cannot_be_cancelled() {
        let booking_id = BookingId::new();
        let state = state_with(booking_id, BookingStatus::InProgress, Duration::hours(0));

        let result = decide(
            &state,
            &BookingAction::CancelBooking {
                booking_id,
                actor: Actor::Admin,
                reason: "changed my mind".to_string(),
            },
        );
        assert!(matches!(result, Err(BookingError::InvalidTransition { .. })));
    }

    #[test]
    fn completed_cannot_be_cancelled() {
        let booking_id = BookingId::new();
        let state = state_with(booking_id, BookingStatus::Completed, Duration::hours(-2));

        let result = decide(
            &state,
            &BookingAction::CancelBooking {
                booking_id,
                actor: Actor::Admin,
                reason: "too late".to_string(),
            },
        );
        assert!(matches!(result, Err(BookingError::InvalidTransition { .. })));
    }

    #[test]
    fn confirmed_cancellation_inside_cutoff_is_rejected() {
        let booking_id = BookingId::new();
        // Starts in 1 hour, cutoff is 2 hours
        let state = state_with(booking_id, BookingStatus::Confirmed, Duration::hours(1));

        let result = decide(
            &state,
            &BookingAction::CancelBooking {
                booking_id,
                actor: Actor::Admin,
                reason: "sick".to_string(),
            },
        );
        assert!(matches!(
            result,
            Err(BookingError::CancellationWindowClosed { cutoff_hours: 2 })
        ));
    }

    #[test]
    fn confirmed_cancellation_25h_ahead_earns_full_refund() {
        let booking_id = BookingId::new();
        let state = state_with(booking_id, BookingStatus::Confirmed, Duration::hours(25));

        let events = decide(
            &state,
            &BookingAction::CancelBooking {
                booking_id,
                actor: Actor::Admin,
                reason: "plans changed".to_string(),
            },
        )
        .unwrap();

        assert!(matches!(
            events.as_slice(),
            [BookingAction::BookingCancelled {
                refund_eligibility: Some(RefundEligibility::Full),
                ..
            }]
        ));
    }

    #[test]
    fn confirmed_cancellation_3h_ahead_is_partial() {
        let booking_id = BookingId::new();
        let state = state_with(booking_id, BookingStatus::Confirmed, Duration::hours(3));

        let events = decide(
            &state,
            &BookingAction::CancelBooking {
                booking_id,
                actor: Actor::Admin,
                reason: "plans changed".to_string(),
            },
        )
        .unwrap();

        assert!(matches!(
            events.as_slice(),
            [BookingAction::BookingCancelled {
                refund_eligibility: Some(RefundEligibility::Partial),
                ..
            }]
        ));
    }

    #[test]
    fn pending_cancellation_ignores_the_window() {
        let booking_id = BookingId::new();
        // Starts in 30 minutes but still pending (no payment authorized)
        let state = state_with(booking_id, BookingStatus::Pending, Duration::minutes(30));

        let events = decide(
            &state,
            &BookingAction::CancelBooking {
                booking_id,
                actor: Actor::Platform,
                reason: "payment authorization failed".to_string(),
            },
        )
        .unwrap();

        assert!(matches!(
            events.as_slice(),
            [BookingAction::BookingCancelled {
                refund_eligibility: None,
                ..
            }]
        ));
    }

    #[test]
    fn exactly_24h_ahead_is_a_full_refund() {
        let policy = CancellationPolicy::default();
        let start = now() + Duration::hours(24);
        assert_eq!(policy.eligibility(now(), start), RefundEligibility::Full);
        assert_eq!(
            policy.eligibility(now(), start - Duration::minutes(1)),
            RefundEligibility::Partial
        );
    }

    #[test]
    fn unknown_booking_is_not_found() {
        let result = decide(
            &BookingState::new(),
            &BookingAction::StartSession {
                booking_id: BookingId::new(),
            },
        );
        assert!(matches!(result, Err(BookingError::NotFound { .. })));
    }
}

//! Schedule aggregate: one coach's calendar of availability and holds.
//!
//! Conflict detection lives here. Every active booking takes a hold on the
//! coach's schedule stream; a new hold is rejected when it overlaps an
//! existing one (half-open interval test). Because all holds for a coach
//! live on a single stream, the event store's version check makes
//! check-then-act atomic: of two concurrent requests for the same slot,
//! exactly one append commits and the loser re-reads into a conflict.

use crate::error::BookingError;
use crate::types::{AvailabilitySlot, BookingId, CoachId, PlayerId, ScheduleState, SlotHold, TimeSlot};
use chrono::{DateTime, Utc};
use courtside_core::environment::Clock;
use courtside_core::{SmallVec, effect::Effect, reducer::Reducer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the schedule aggregate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ScheduleAction {
    // Commands
    /// Declare a bookable window on the coach's calendar
    DeclareAvailability {
        /// Coach declaring the window
        coach_id: CoachId,
        /// The bookable window
        window: TimeSlot,
    },

    /// Take a hold on a slot for a booking
    ReserveSlot {
        /// Booking taking the hold
        booking_id: BookingId,
        /// Coach whose calendar is booked
        coach_id: CoachId,
        /// Player requesting the slot
        player_id: PlayerId,
        /// Requested interval
        slot: TimeSlot,
    },

    /// Release a hold (cancellation or completion)
    ReleaseSlot {
        /// Booking whose hold is released
        booking_id: BookingId,
    },

    // Events
    /// A bookable window was declared
    AvailabilityDeclared {
        /// Coach who declared it
        coach_id: CoachId,
        /// The window
        window: TimeSlot,
        /// When it was declared
        declared_at: DateTime<Utc>,
    },

    /// A slot hold was taken
    SlotReserved {
        /// Booking holding the slot
        booking_id: BookingId,
        /// Coach whose calendar is held
        coach_id: CoachId,
        /// Player on the booking
        player_id: PlayerId,
        /// The held interval
        slot: TimeSlot,
        /// When the hold was taken
        reserved_at: DateTime<Utc>,
    },

    /// A slot hold was released
    SlotReleased {
        /// Booking whose hold was released
        booking_id: BookingId,
        /// When the hold was released
        released_at: DateTime<Utc>,
    },
}

impl ScheduleAction {
    /// Whether this action is a command (a request, not a fact).
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::DeclareAvailability { .. } | Self::ReserveSlot { .. } | Self::ReleaseSlot { .. }
        )
    }

    /// Stable event type identifier for persisted events.
    ///
    /// Commands are never persisted and report "unknown".
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::AvailabilityDeclared { .. } => "AvailabilityDeclared.v1",
            Self::SlotReserved { .. } => "SlotReserved.v1",
            Self::SlotReleased { .. } => "SlotReleased.v1",
            _ => "unknown",
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the schedule aggregate.
#[derive(Clone)]
pub struct ScheduleEnvironment {
    /// Clock for hold timestamps
    pub clock: Arc<dyn Clock>,
}

impl ScheduleEnvironment {
    /// Creates a new `ScheduleEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the schedule aggregate.
#[derive(Clone, Debug, Default)]
pub struct ScheduleReducer;

impl ScheduleReducer {
    /// Creates a new `ScheduleReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decide which events a command produces, or reject it.
    ///
    /// Pure function: the service appends the returned events with the
    /// expected stream version, which closes the check-then-act window.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] for a non-positive duration, a
    ///   duplicate hold, or a slot outside declared availability
    /// - [`BookingError::Conflict`] when the slot overlaps an active hold
    pub fn decide(
        state: &ScheduleState,
        command: &ScheduleAction,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduleAction>, BookingError> {
        match command {
            ScheduleAction::DeclareAvailability { coach_id, window } => {
                if window.duration_minutes == 0 {
                    return Err(BookingError::Validation(
                        "availability window duration must be positive".to_string(),
                    ));
                }
                Ok(vec![ScheduleAction::AvailabilityDeclared {
                    coach_id: *coach_id,
                    window: *window,
                    declared_at: now,
                }])
            },

            ScheduleAction::ReserveSlot {
                booking_id,
                coach_id,
                player_id,
                slot,
            } => {
                if slot.duration_minutes == 0 {
                    return Err(BookingError::Validation(
                        "slot duration must be positive".to_string(),
                    ));
                }
                if state.holds.contains_key(booking_id) {
                    return Err(BookingError::Validation(format!(
                        "booking {booking_id} already holds a slot"
                    )));
                }
                if !state.within_availability(slot) {
                    return Err(BookingError::Validation(
                        "slot is outside the coach's declared availability".to_string(),
                    ));
                }
                if state.has_overlap(slot) {
                    return Err(BookingError::Conflict { coach: *coach_id });
                }
                Ok(vec![ScheduleAction::SlotReserved {
                    booking_id: *booking_id,
                    coach_id: *coach_id,
                    player_id: *player_id,
                    slot: *slot,
                    reserved_at: now,
                }])
            },

            // Releasing an absent hold is a no-op: compensation paths and
            // redelivered events must be safe to repeat.
            ScheduleAction::ReleaseSlot { booking_id } => {
                if state.holds.contains_key(booking_id) {
                    Ok(vec![ScheduleAction::SlotReleased {
                        booking_id: *booking_id,
                        released_at: now,
                    }])
                } else {
                    Ok(Vec::new())
                }
            },

            event => Err(BookingError::Validation(format!(
                "{} is not a command",
                event.event_type()
            ))),
        }
    }

    /// Applies an event to state.
    pub fn apply_event(state: &mut ScheduleState, action: &ScheduleAction) {
        match action {
            ScheduleAction::AvailabilityDeclared {
                window, declared_at, ..
            } => {
                state.availability.push(AvailabilitySlot {
                    window: *window,
                    declared_at: *declared_at,
                });
                state.last_error = None;
            },

            ScheduleAction::SlotReserved {
                booking_id,
                player_id,
                slot,
                reserved_at,
                ..
            } => {
                state.holds.insert(
                    *booking_id,
                    SlotHold {
                        booking_id: *booking_id,
                        player: *player_id,
                        slot: *slot,
                        reserved_at: *reserved_at,
                    },
                );
                state.last_error = None;
            },

            ScheduleAction::SlotReleased { booking_id, .. } => {
                state.holds.remove(booking_id);
                state.last_error = None;
            },

            // Commands don't modify state
            ScheduleAction::DeclareAvailability { .. }
            | ScheduleAction::ReserveSlot { .. }
            | ScheduleAction::ReleaseSlot { .. } => {},
        }
    }
}

impl Reducer for ScheduleReducer {
    type State = ScheduleState;
    type Action = ScheduleAction;
    type Environment = ScheduleEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if action.is_command() {
            match Self::decide(state, &action, env.clock.now()) {
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

//! Read model projections for the booking core.
//!
//! Projections consume the unified event stream and build denormalized
//! views optimized for queries:
//!
//! - [`BookingHistoryProjection`]: per-player and per-coach booking lists
//!   (serves `list_bookings` and the session scheduler's due-booking query)
//!
//! Projections are eventually consistent and rebuildable: replaying the
//! event log from the start reproduces the same view, and redelivered
//! events are harmless because every applied event id is remembered.

pub mod booking_history;

pub use booking_history::{BookingHistoryProjection, BookingView};

use crate::aggregates::{BookingAction, PaymentAction, ScheduleAction};
use crate::error::BookingError;
use courtside_core::event::{Event, SerializedEvent};
use serde::{Deserialize, Serialize};

/// Unified event type across all booking-core aggregates.
///
/// Both the event store and the event bus carry this type; projections and
/// external subscribers consume it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MarketEvent {
    /// Event from a coach schedule aggregate
    Schedule(ScheduleAction),
    /// Event from the booking aggregate
    Booking(BookingAction),
    /// Event from the payment aggregate
    Payment(PaymentAction),
}

impl MarketEvent {
    /// Decode a stored event back into a `MarketEvent`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Serialization`] if the payload cannot be
    /// decoded.
    pub fn decode(event: &SerializedEvent) -> Result<Self, BookingError> {
        bincode::deserialize(&event.data)
            .map_err(|e| BookingError::Serialization(e.to_string()))
    }
}

impl Event for MarketEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Schedule(action) => action.event_type(),
            Self::Booking(action) => action.event_type(),
            Self::Payment(action) => action.event_type(),
        }
    }
}

/// Trait for projections that consume events to build read models.
pub trait Projection: Send + Sync {
    /// Handle an event and update the projection's view.
    ///
    /// Called for each event in the stream; delivery is at-least-once, so
    /// implementations must dedupe (by event id) or be naturally
    /// idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the projection fails to update.
    fn handle_event(&mut self, event: &MarketEvent) -> Result<(), String>;

    /// The projection's name (for logging).
    fn name(&self) -> &'static str;

    /// Reset the projection to its initial state (for rebuilds).
    fn reset(&mut self);
}

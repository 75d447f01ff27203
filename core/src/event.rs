//! Event trait and related types for event sourcing.
//!
//! Events represent facts about things that have happened - a slot was
//! reserved, a booking was confirmed, a payment was captured. They are
//! immutable and form the source of truth for aggregate state.
//!
//! # Design
//!
//! Events are serialized with `bincode` for compact storage and fast
//! replay. Optional metadata (correlation ids, the emitting actor) travels
//! alongside as JSON so operational tooling can read it without decoding
//! the payload.

use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// Unknown event type encountered during deserialization.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// An event that can be stored in an event store and replayed to
/// reconstruct state.
///
/// # Event Naming Convention
///
/// The `event_type()` method returns a stable string identifier including a
/// version suffix, allowing schema evolution over time:
///
/// - `"BookingConfirmed.v1"`
/// - `"PaymentCaptured.v1"`
/// - `"SlotReserved.v2"` (after a schema change)
///
/// # Examples
///
/// ```
/// use courtside_core::event::Event;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Clone, Debug, Serialize, Deserialize)]
/// enum BookingEvent {
///     BookingConfirmed { booking_id: String },
///     SessionStarted { booking_id: String },
/// }
///
/// impl Event for BookingEvent {
///     fn event_type(&self) -> &'static str {
///         match self {
///             BookingEvent::BookingConfirmed { .. } => "BookingConfirmed.v1",
///             BookingEvent::SessionStarted { .. } => "SessionStarted.v1",
///         }
///     }
/// }
/// ```
pub trait Event: Send + Sync + 'static {
    /// Returns the stable event type identifier for this event.
    ///
    /// Used for storing the type in the database, routing events to the
    /// correct deserializer, and versioning event schemas.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be
    /// serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are corrupted,
    /// represent a different event type, or the schema has changed
    /// incompatibly.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event ready for storage.
///
/// Contains the event type name and the serialized bytes, along with
/// optional metadata. This is the wire format between the application and
/// the event store / event bus.
#[derive(Clone, Debug)]
pub struct SerializedEvent {
    /// The event type identifier (e.g. "BookingConfirmed.v1").
    pub event_type: String,

    /// The bincode-serialized event data.
    pub data: Vec<u8>,

    /// Optional metadata in JSON format.
    ///
    /// Common metadata fields:
    /// - `event_id`: unique id consumers use to dedupe redeliveries
    /// - `correlation_id`: links related events across aggregates
    /// - `occurred_at`: when the event was recorded (ISO 8601)
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }

    /// Create a serialized event from an [`Event`] value.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be
    /// serialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use courtside_core::event::{Event, SerializedEvent};
    /// # use serde::{Serialize, Deserialize};
    /// # #[derive(Clone, Debug, Serialize, Deserialize)]
    /// # enum BookingEvent {
    /// #     BookingConfirmed { booking_id: String },
    /// # }
    /// # impl Event for BookingEvent {
    /// #     fn event_type(&self) -> &'static str { "BookingConfirmed.v1" }
    /// # }
    ///
    /// let event = BookingEvent::BookingConfirmed {
    ///     booking_id: "booking-123".to_string(),
    /// };
    ///
    /// let serialized = SerializedEvent::from_event(&event, None).unwrap();
    /// assert_eq!(serialized.event_type, "BookingConfirmed.v1");
    /// ```
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            metadata,
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    enum TestEvent {
        SlotHeld { booking_id: String, minutes: u32 },
        SlotFreed { booking_id: String },
    }

    impl Event for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::SlotHeld { .. } => "SlotHeld.v1",
                TestEvent::SlotFreed { .. } => "SlotFreed.v1",
            }
        }
    }

    #[test]
    fn event_type_returns_correct_identifier() {
        let event = TestEvent::SlotHeld {
            booking_id: "booking-1".to_string(),
            minutes: 60,
        };
        assert_eq!(event.event_type(), "SlotHeld.v1");
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = TestEvent::SlotHeld {
            booking_id: "booking-1".to_string(),
            minutes: 90,
        };

        let bytes = event.to_bytes().expect("serialization should succeed");
        let deserialized = TestEvent::from_bytes(&bytes).expect("deserialization should succeed");

        assert_eq!(event, deserialized);
    }

    #[test]
    fn serialized_event_carries_metadata() {
        let event = TestEvent::SlotFreed {
            booking_id: "booking-1".to_string(),
        };

        let metadata = serde_json::json!({
            "event_id": "11111111-2222-3333-4444-555555555555",
            "correlation_id": "create-booking-1"
        });

        let serialized = SerializedEvent::from_event(&event, Some(metadata.clone()))
            .expect("serialization should succeed");

        assert_eq!(serialized.event_type, "SlotFreed.v1");
        assert!(!serialized.data.is_empty());
        assert_eq!(serialized.metadata, Some(metadata));
    }

    #[test]
    fn serialized_event_display() {
        let serialized =
            SerializedEvent::new("TestEvent.v1".to_string(), vec![1, 2, 3, 4, 5], None);

        let display = format!("{serialized}");
        assert!(display.contains("TestEvent.v1"));
        assert!(display.contains("5 bytes"));
    }
}

//! Error taxonomy for the booking core.
//!
//! Business-rule errors (conflict, cancellation window, payment decline)
//! carry messages safe to surface verbatim to end users. Infrastructure
//! errors are logged with full detail but map to a generic user message so
//! internal detail never leaks.

use crate::types::CoachId;
use courtside_core::event::EventError;
use courtside_core::event_bus::EventBusError;
use courtside_core::event_store::EventStoreError;
use thiserror::Error;

/// All error kinds surfaced by the booking core.
#[derive(Error, Debug)]
pub enum BookingError {
    /// Malformed input: missing fields, non-positive duration, start in the
    /// past, slot outside declared availability. Caller-fixable, never
    /// retried automatically.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The slot is already booked. Surfaced to the caller for UI resolution
    /// (suggest an alternate time); not retried automatically.
    #[error("coach {coach} already has a booking overlapping the requested slot")]
    Conflict {
        /// The coach whose calendar conflicted
        coach: CoachId,
    },

    /// Illegal workflow step (e.g. completing a pending booking).
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// State the entity was in
        from: String,
        /// State the caller asked for
        to: String,
    },

    /// The entity changed under the caller. Re-read and retry.
    #[error("state changed concurrently, re-read and retry")]
    StaleState,

    /// Cancellation rejected: too close to the session start.
    #[error("cancellation window closed: less than {cutoff_hours}h before session start")]
    CancellationWindowClosed {
        /// Policy cutoff in hours
        cutoff_hours: i64,
    },

    /// Permanent payment failure; the booking is rolled back, not retried.
    #[error("payment declined: {reason}")]
    PaymentDeclined {
        /// Decline reason from the provider
        reason: String,
    },

    /// The payment provider did not answer in time, retries exhausted.
    #[error("payment provider timed out")]
    ProviderTimeout,

    /// The payment provider is unreachable or shedding load (circuit open).
    #[error("payment provider unavailable: {reason}")]
    ProviderUnavailable {
        /// Transport-level detail
        reason: String,
    },

    /// The acting user is not allowed to perform this operation.
    #[error("forbidden: {reason}")]
    Forbidden {
        /// Why the actor was rejected
        reason: String,
    },

    /// Entity not found.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity ("booking", "payment intent")
        entity: &'static str,
        /// The id that was looked up
        id: String,
    },

    /// Event store failure (not a concurrency conflict).
    #[error("storage error: {0}")]
    Storage(String),

    /// Event bus publish failure.
    #[error("event publish error: {0}")]
    Publish(String),

    /// Event payload (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl BookingError {
    /// Whether the caller may retry the operation as-is.
    ///
    /// Stale state asks for a re-read first; provider timeouts and
    /// unavailability are transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StaleState | Self::ProviderTimeout | Self::ProviderUnavailable { .. }
        )
    }

    /// Human-readable message safe to show to an end user.
    ///
    /// Business-rule errors are specific; infrastructure errors get a
    /// generic message without internal detail.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Conflict { .. } => {
                "That time slot was just booked. Please pick another time.".to_string()
            },
            Self::InvalidTransition { .. } | Self::StaleState => {
                "This booking changed in the meantime. Please refresh and try again.".to_string()
            },
            Self::CancellationWindowClosed { cutoff_hours } => format!(
                "Bookings can no longer be cancelled within {cutoff_hours} hours of the session."
            ),
            Self::PaymentDeclined { reason } => format!("Your payment was declined: {reason}"),
            Self::Forbidden { .. } => "You are not allowed to perform this action.".to_string(),
            Self::NotFound { entity, .. } => format!("The requested {entity} was not found."),
            Self::ProviderTimeout
            | Self::ProviderUnavailable { .. }
            | Self::Storage(_)
            | Self::Publish(_)
            | Self::Serialization(_) => {
                "Something went wrong on our side. Please try again.".to_string()
            },
        }
    }
}

impl From<EventStoreError> for BookingError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict { .. } => Self::StaleState,
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<EventBusError> for BookingError {
    fn from(err: EventBusError) -> Self {
        Self::Publish(err.to_string())
    }
}

impl From<EventError> for BookingError {
    fn from(err: EventError) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtside_core::stream::{StreamId, Version};

    #[test]
    fn concurrency_conflict_maps_to_stale_state() {
        let err = BookingError::from(EventStoreError::ConcurrencyConflict {
            stream_id: StreamId::new("booking-1"),
            expected: Version::new(1),
            actual: Version::new(2),
        });
        assert!(matches!(err, BookingError::StaleState));
        assert!(err.is_retryable());
    }

    #[test]
    fn database_error_maps_to_storage() {
        let err = BookingError::from(EventStoreError::DatabaseError("down".to_string()));
        assert!(matches!(err, BookingError::Storage(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn infrastructure_errors_get_generic_user_message() {
        let err = BookingError::Storage("connection refused to 10.0.0.3:5432".to_string());
        let message = err.user_message();
        assert!(!message.contains("10.0.0.3"));
        assert!(message.contains("try again"));
    }

    #[test]
    fn business_errors_are_specific() {
        let err = BookingError::CancellationWindowClosed { cutoff_hours: 2 };
        assert!(err.user_message().contains("2 hours"));

        let err = BookingError::PaymentDeclined {
            reason: "insufficient funds".to_string(),
        };
        assert!(err.user_message().contains("insufficient funds"));
    }

    #[test]
    fn retryability_classification() {
        assert!(BookingError::ProviderTimeout.is_retryable());
        assert!(
            BookingError::ProviderUnavailable {
                reason: "circuit open".to_string()
            }
            .is_retryable()
        );
        assert!(!BookingError::Validation("bad".to_string()).is_retryable());
        assert!(
            !BookingError::PaymentDeclined {
                reason: "declined".to_string()
            }
            .is_retryable()
        );
    }
}

//! Event bus abstraction for delivering domain events to downstream
//! consumers.
//!
//! The booking core follows the outbox discipline: events are appended to
//! the event store first (durable, replayable source of truth), then
//! published to the event bus for downstream subscribers - messaging,
//! search reindexing, notifications. A failed publish never loses the
//! event; it can always be replayed from the store.
//!
//! ```text
//! ┌─────────────┐
//! │   Command   │
//! └──────┬──────┘
//!        ▼
//! ┌─────────────────┐
//! │    Reducer      │
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ 1. Append to    │
//! │   event store   │◄─── Source of truth
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ 2. Publish to   │
//! │    event bus    │◄─── At-least-once delivery
//! └────────┬────────┘
//!     ┌────┴────┐
//!     ▼         ▼
//! ┌───────┐ ┌────────────┐
//! │ Read  │ │ External   │
//! │ model │ │ subscribers│
//! └───────┘ └────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **Store first**: events are persisted before publishing
//! - **At-least-once delivery**: events may be delivered multiple times
//! - **Idempotency**: subscribers must dedupe by the `event_id` metadata field
//! - **Ordered within stream**: events from the same aggregate maintain order
//!
//! # Topic Naming Convention
//!
//! Topics follow the pattern `{aggregate-type}-events`:
//! - `booking-events` - booking lifecycle events
//! - `schedule-events` - slot holds and releases
//! - `payment-events` - escrow lifecycle events

use crate::event::SerializedEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Failed to deserialize an event
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Topic not found or invalid
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of events from subscriptions.
///
/// Each item is a `Result` that may contain an event or a transport error.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SerializedEvent, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// Provides publish/subscribe capabilities with at-least-once delivery.
/// Subscribers must be idempotent: the `event_id` metadata field on every
/// published event is the dedupe key.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn` so
/// the bus can be held as `Arc<dyn EventBus>` by the emitter and relay.
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// Events are published with at-least-once semantics; subscribers may
    /// see duplicates and must dedupe by event id.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation
    /// fails. The event remains in the event store and can be republished.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics and receive a stream of events.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_failed_display_names_topic() {
        let error = EventBusError::PublishFailed {
            topic: "booking-events".to_string(),
            reason: "broker unavailable".to_string(),
        };
        let display = format!("{error}");
        assert!(display.contains("booking-events"));
        assert!(display.contains("broker unavailable"));
    }

    #[test]
    fn subscription_failed_display_names_topics() {
        let error = EventBusError::SubscriptionFailed {
            topics: vec!["payment-events".to_string()],
            reason: "no receiver".to_string(),
        };
        assert!(format!("{error}").contains("payment-events"));
    }
}

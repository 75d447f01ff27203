//! Outbox-style event emission.
//!
//! Every state change follows the same discipline: events are appended to
//! the event store first (durable, replayable source of truth) and only
//! then published to the event bus for downstream consumers. A failed
//! publish never fails the operation and never loses the event - it is
//! queued for redelivery, and the whole stream can always be replayed from
//! the store.
//!
//! Every published event carries an envelope in its metadata: a unique
//! `event_id` (the consumer dedupe key for at-least-once delivery), the
//! stream id, the monotonic stream version, and the `occurred_at`
//! timestamp.

use crate::error::BookingError;
use crate::projections::MarketEvent;
use chrono::{DateTime, Utc};
use courtside_core::event::SerializedEvent;
use courtside_core::event_bus::EventBus;
use courtside_core::event_store::{EventStore, EventStoreError};
use courtside_core::stream::{StreamId, Version};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Topic names for the three aggregate event streams.
#[derive(Clone, Debug)]
pub struct EventTopics {
    /// Slot holds and availability
    pub schedule: String,
    /// Booking lifecycle
    pub booking: String,
    /// Payment escrow lifecycle
    pub payment: String,
}

impl Default for EventTopics {
    fn default() -> Self {
        Self {
            schedule: "schedule-events".to_string(),
            booking: "booking-events".to_string(),
            payment: "payment-events".to_string(),
        }
    }
}

impl EventTopics {
    /// All topic names (for subscribers).
    #[must_use]
    pub fn all(&self) -> Vec<&str> {
        vec![&self.schedule, &self.booking, &self.payment]
    }
}

/// Store-first event writer with at-least-once bus delivery.
#[derive(Clone)]
pub struct EventEmitter {
    store: Arc<dyn EventStore>,
    bus: Arc<dyn EventBus>,
    topics: EventTopics,
    pending: Arc<Mutex<VecDeque<(String, SerializedEvent)>>>,
}

impl EventEmitter {
    /// Creates a new emitter.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, bus: Arc<dyn EventBus>, topics: EventTopics) -> Self {
        Self {
            store,
            bus,
            topics,
            pending: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn topic_for(&self, event: &MarketEvent) -> &str {
        match event {
            MarketEvent::Schedule(_) => &self.topics.schedule,
            MarketEvent::Booking(_) => &self.topics.booking,
            MarketEvent::Payment(_) => &self.topics.payment,
        }
    }

    fn envelope(
        stream_id: &StreamId,
        version: Version,
        occurred_at: DateTime<Utc>,
        event: &MarketEvent,
    ) -> Result<SerializedEvent, EventStoreError> {
        let metadata = json!({
            "event_id": Uuid::new_v4(),
            "stream_id": stream_id.as_str(),
            "version": version.value(),
            "occurred_at": occurred_at.to_rfc3339(),
        });
        SerializedEvent::from_event(event, Some(metadata))
            .map_err(|e| EventStoreError::SerializationError(e.to_string()))
    }

    /// Append events to a stream with optimistic concurrency, then publish
    /// them.
    ///
    /// The stored copy and the published copy are the same
    /// [`SerializedEvent`], envelope included, so a later replay from the
    /// store reuses the original event ids and consumers can dedupe.
    ///
    /// # Errors
    ///
    /// Returns the store error unchanged - in particular
    /// [`EventStoreError::ConcurrencyConflict`], which callers map to
    /// `Conflict` or `StaleState` depending on context. Publish failures do
    /// NOT error: the events are durably stored, so they are queued for
    /// redelivery instead.
    pub async fn append_and_publish(
        &self,
        stream_id: &StreamId,
        expected_version: Version,
        events: &[MarketEvent],
        occurred_at: DateTime<Utc>,
    ) -> Result<Version, EventStoreError> {
        if events.is_empty() {
            return Ok(expected_version);
        }

        let mut serialized = Vec::with_capacity(events.len());
        for (i, event) in events.iter().enumerate() {
            serialized.push(Self::envelope(
                stream_id,
                expected_version.advance(i as u64 + 1),
                occurred_at,
                event,
            )?);
        }

        let new_version = self
            .store
            .append_events(stream_id.clone(), Some(expected_version), serialized.clone())
            .await?;

        for (event, stored) in events.iter().zip(serialized) {
            self.publish(self.topic_for(event), stored).await;
        }

        Ok(new_version)
    }

    async fn publish(&self, topic: &str, event: SerializedEvent) {
        if let Err(error) = self.bus.publish(topic, &event).await {
            tracing::error!(
                topic,
                event_type = %event.event_type,
                %error,
                "event publish failed, queued for redelivery"
            );
            #[allow(clippy::unwrap_used)] // mutex only guards a queue push
            self.pending
                .lock()
                .unwrap()
                .push_back((topic.to_string(), event));
        }
    }

    /// Retry queued publishes; returns how many are still pending.
    pub async fn flush(&self) -> usize {
        loop {
            #[allow(clippy::unwrap_used)]
            let next = self.pending.lock().unwrap().pop_front();
            let Some((topic, event)) = next else {
                break;
            };

            if let Err(error) = self.bus.publish(&topic, &event).await {
                tracing::warn!(topic = %topic, %error, "redelivery failed, requeueing");
                #[allow(clippy::unwrap_used)]
                self.pending.lock().unwrap().push_front((topic, event));
                break;
            }
        }
        self.pending_count()
    }

    /// Number of events awaiting redelivery.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

/// Replays stored events back onto the bus.
///
/// Used to recover downstream consumers (search reindex, notifications)
/// that missed events: stored envelopes keep their original event ids, so
/// redelivered duplicates are deduped by consumers.
pub struct OutboxRelay {
    store: Arc<dyn EventStore>,
    bus: Arc<dyn EventBus>,
    topics: EventTopics,
}

impl OutboxRelay {
    /// Creates a new relay.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, bus: Arc<dyn EventBus>, topics: EventTopics) -> Self {
        Self { store, bus, topics }
    }

    /// Republish every event of a stream; returns how many were published.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Storage`] if the stream cannot be loaded,
    /// [`BookingError::Publish`] if the bus rejects a publish, or
    /// [`BookingError::Serialization`] for an undecodable stored event.
    pub async fn replay_stream(&self, stream_id: &StreamId) -> Result<usize, BookingError> {
        let events = self.store.load_events(stream_id.clone(), None).await?;
        let mut published = 0;

        for stored in events {
            let event = MarketEvent::decode(&stored)?;
            let topic = match &event {
                MarketEvent::Schedule(_) => &self.topics.schedule,
                MarketEvent::Booking(_) => &self.topics.booking,
                MarketEvent::Payment(_) => &self.topics.payment,
            };
            self.bus.publish(topic, &stored).await?;
            published += 1;
        }

        tracing::info!(stream_id = %stream_id, published, "stream replayed to event bus");
        Ok(published)
    }
}

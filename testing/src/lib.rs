//! # Courtside Testing
//!
//! Testing utilities for the Courtside booking platform.
//!
//! This crate provides:
//! - Mock implementations of environment traits ([`mocks::FixedClock`])
//! - An in-memory event store with the same optimistic concurrency
//!   semantics as the Postgres implementation
//! - An in-memory event bus with publish capture and failure injection
//! - The [`ReducerTest`] Given-When-Then fixture for reducer unit tests
//!
//! ## Example
//!
//! ```ignore
//! use courtside_testing::{test_clock, mocks::InMemoryEventStore};
//!
//! #[tokio::test]
//! async fn test_booking_flow() {
//!     let store = Arc::new(InMemoryEventStore::new());
//!     let clock = Arc::new(test_clock());
//!     let service = BookingService::new(store, bus, provider, clock, Config::default());
//!
//!     let booking = service.create_booking(request).await.unwrap();
//!     assert_eq!(booking.status, BookingStatus::Confirmed);
//! }
//! ```


pub use reducer_test::{ReducerTest, assertions};

use chrono::{DateTime, Utc};
use courtside_core::environment::Clock;

/// Mock implementations of environment traits and infrastructure.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use courtside_core::event::SerializedEvent;
    use courtside_core::event_bus::{EventBus, EventBusError, EventStream};
    use courtside_core::event_store::{EventStore, EventStoreError};
    use courtside_core::stream::{StreamId, Version};
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time, making cancellation-window and
    /// refund-eligibility tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use courtside_testing::mocks::FixedClock;
    /// use courtside_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen
    /// in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// In-memory event store for fast, deterministic tests.
    ///
    /// Implements the exact optimistic concurrency contract of the
    /// production store: an append carrying a stale expected version is
    /// rejected with [`EventStoreError::ConcurrencyConflict`] and appends
    /// nothing. Concurrency tests for slot reservation and booking
    /// transitions run against this.
    #[derive(Debug, Default)]
    pub struct InMemoryEventStore {
        streams: Mutex<HashMap<StreamId, Vec<SerializedEvent>>>,
    }

    impl InMemoryEventStore {
        /// Create a new empty event store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Total number of events across all streams.
        ///
        /// # Panics
        ///
        /// Panics if the internal lock is poisoned.
        #[must_use]
        #[allow(clippy::unwrap_used)]
        pub fn total_events(&self) -> usize {
            self.streams.lock().unwrap().values().map(Vec::len).sum()
        }

        #[allow(clippy::unwrap_used)] // lock poisoning aborts the test anyway
        fn with_streams<T>(&self, f: impl FnOnce(&mut HashMap<StreamId, Vec<SerializedEvent>>) -> T) -> T {
            f(&mut self.streams.lock().unwrap())
        }
    }

    impl EventStore for InMemoryEventStore {
        fn append_events(
            &self,
            stream_id: StreamId,
            expected_version: Option<Version>,
            events: Vec<SerializedEvent>,
        ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
            let result = self.with_streams(|streams| {
                let stream = streams.entry(stream_id.clone()).or_default();
                let actual = Version::new(stream.len() as u64);

                if let Some(expected) = expected_version {
                    if expected != actual {
                        return Err(EventStoreError::ConcurrencyConflict {
                            stream_id,
                            expected,
                            actual,
                        });
                    }
                }

                stream.extend(events);
                Ok(Version::new(stream.len() as u64))
            });
            Box::pin(async move { result })
        }

        fn load_events(
            &self,
            stream_id: StreamId,
            from_version: Option<Version>,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>
        {
            let result = self.with_streams(|streams| {
                let events = streams.get(&stream_id).cloned().unwrap_or_default();
                let skip = from_version.map_or(0, |v| v.value().saturating_sub(1) as usize);
                Ok(events.into_iter().skip(skip).collect())
            });
            Box::pin(async move { result })
        }

        fn current_version(
            &self,
            stream_id: StreamId,
        ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
            let result = self.with_streams(|streams| {
                Ok(Version::new(
                    streams.get(&stream_id).map_or(0, Vec::len) as u64
                ))
            });
            Box::pin(async move { result })
        }
    }

    type Subscriber = (
        Vec<String>,
        mpsc::UnboundedSender<Result<SerializedEvent, EventBusError>>,
    );

    /// In-memory event bus for tests and in-process wiring.
    ///
    /// Captures every published event for assertions and forwards them to
    /// live subscribers. Publish failures can be injected to exercise the
    /// outbox redelivery path.
    #[derive(Debug, Default)]
    pub struct InMemoryEventBus {
        published: Mutex<Vec<(String, SerializedEvent)>>,
        subscribers: Mutex<Vec<Subscriber>>,
        fail_publishes: AtomicBool,
    }

    impl InMemoryEventBus {
        /// Create a new event bus with no subscribers.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make subsequent publishes fail (to exercise redelivery).
        pub fn fail_publishes(&self, fail: bool) {
            self.fail_publishes.store(fail, Ordering::SeqCst);
        }

        /// All events published so far, with their topics.
        ///
        /// # Panics
        ///
        /// Panics if the internal lock is poisoned.
        #[must_use]
        #[allow(clippy::unwrap_used)]
        pub fn published(&self) -> Vec<(String, SerializedEvent)> {
            self.published.lock().unwrap().clone()
        }

        /// Event types published to a topic, in order.
        #[must_use]
        pub fn published_types(&self, topic: &str) -> Vec<String> {
            self.published()
                .into_iter()
                .filter(|(t, _)| t == topic)
                .map(|(_, e)| e.event_type)
                .collect()
        }
    }

    impl EventBus for InMemoryEventBus {
        fn publish(
            &self,
            topic: &str,
            event: &SerializedEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
            let result = if self.fail_publishes.load(Ordering::SeqCst) {
                Err(EventBusError::PublishFailed {
                    topic: topic.to_string(),
                    reason: "injected publish failure".to_string(),
                })
            } else {
                #[allow(clippy::unwrap_used)] // lock poisoning aborts the test anyway
                {
                    self.published
                        .lock()
                        .unwrap()
                        .push((topic.to_string(), event.clone()));

                    let mut subscribers = self.subscribers.lock().unwrap();
                    subscribers.retain(|(topics, tx)| {
                        if topics.iter().any(|t| t == topic) {
                            // Drop subscribers whose receiver is gone
                            tx.send(Ok(event.clone())).is_ok()
                        } else {
                            !tx.is_closed()
                        }
                    });
                }
                Ok(())
            };
            Box::pin(async move { result })
        }

        fn subscribe(
            &self,
            topics: &[&str],
        ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
            let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();
            let (tx, mut rx) = mpsc::unbounded_channel();
            #[allow(clippy::unwrap_used)] // lock poisoning aborts the test anyway
            self.subscribers.lock().unwrap().push((topics, tx));

            let stream: EventStream =
                Box::pin(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)));
            Box::pin(async move { Ok(stream) })
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, InMemoryEventBus, InMemoryEventStore, test_clock};

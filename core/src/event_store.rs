//! Event store trait and related types.
//!
//! The event store is the single writer-side database of the booking core:
//! an append-only log of events per stream, with optimistic concurrency
//! control. Every mutating operation in the system ends in a
//! version-checked append here, which is what serializes concurrent writers
//! per booking and closes the check-then-act window on slot reservation.
//!
//! # Implementations
//!
//! - `PostgresEventStore` (in `courtside-postgres`): production implementation,
//!   transactional version check as the storage-layer backstop
//! - `InMemoryEventStore` (in `courtside-testing`): fast, deterministic tests
//!   with identical concurrency semantics
//!
//! # Example
//!
//! ```no_run
//! use courtside_core::event_store::{EventStore, EventStoreError};
//! use courtside_core::stream::{StreamId, Version};
//! use courtside_core::event::SerializedEvent;
//!
//! async fn example<E: EventStore>(store: &E) -> Result<(), EventStoreError> {
//!     let stream_id = StreamId::new("booking-123");
//!
//!     // Append events with optimistic concurrency
//!     let events = vec![/* ... */];
//!     let new_version = store.append_events(
//!         stream_id.clone(),
//!         Some(Version::new(0)),  // Expected current version
//!         events,
//!     ).await?;
//!
//!     // Load events to reconstruct state
//!     let all_events = store.load_events(stream_id, None).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::event::SerializedEvent;
use crate::stream::{StreamId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: expected version doesn't match
    /// current version.
    ///
    /// Another writer has modified the stream concurrently. The caller must
    /// re-read the stream and decide whether to retry.
    #[error("Concurrency conflict: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream ID where the conflict occurred.
        stream_id: StreamId,
        /// The version we expected the stream to be at.
        expected: Version,
        /// The actual current version of the stream.
        actual: Version,
    },

    /// Stream not found in the event store.
    #[error("Stream not found: {0}")]
    StreamNotFound(StreamId),

    /// Database connection error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Event store abstraction for storing and retrieving event streams.
///
/// An event store is a specialized database optimized for:
///
/// - Appending events to streams (immutable, append-only)
/// - Loading events for state reconstruction
/// - Optimistic concurrency control
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be safely shared across request
/// workers.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of
/// `async fn` so it can be used as a trait object (`Arc<dyn EventStore>`),
/// which is how the booking service, conflict checker, and payment
/// coordinator hold it.
pub trait EventStore: Send + Sync {
    /// Append events to a stream with optimistic concurrency control.
    ///
    /// # Optimistic Concurrency
    ///
    /// - `Some(version)`: assert the stream is currently at this version
    /// - `None`: append unconditionally (no version check, use with caution)
    ///
    /// If the stream's current version doesn't match `expected_version`,
    /// returns [`EventStoreError::ConcurrencyConflict`] and appends nothing.
    /// This is the mechanism behind both `StaleState` (booking streams) and
    /// the first-commit-wins tie-break on slot reservation (schedule
    /// streams).
    ///
    /// # Returns
    ///
    /// The new version after appending. A stream at version 5 appending 2
    /// events moves to version 7.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: version mismatch (concurrent modification)
    /// - `DatabaseError`: connection or query failed
    /// - `SerializationError`: failed to persist event payloads
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>>;

    /// Load events from a stream.
    ///
    /// # Parameters
    ///
    /// - `from_version`: `Some(v)` loads events from version `v` onwards
    ///   (inclusive); `None` loads the full stream.
    ///
    /// # Returns
    ///
    /// Events ordered by version (oldest first). A stream that does not
    /// exist yet returns an empty vector, not an error.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: connection or query failed
    /// - `SerializationError`: failed to decode stored events
    fn load_events(
        &self,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>;

    /// Current version of a stream.
    ///
    /// Returns `Version::initial()` for streams that do not exist yet.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: connection or query failed
    fn current_version(
        &self,
        stream_id: StreamId,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_conflict_error_display() {
        let error = EventStoreError::ConcurrencyConflict {
            stream_id: StreamId::new("booking-1"),
            expected: Version::new(5),
            actual: Version::new(7),
        };

        let display = format!("{error}");
        assert!(display.contains("expected version 5"));
        assert!(display.contains("found 7"));
    }

    #[test]
    fn stream_not_found_error_display() {
        let error = EventStoreError::StreamNotFound(StreamId::new("missing-stream"));
        let display = format!("{error}");
        assert!(display.contains("missing-stream"));
    }
}

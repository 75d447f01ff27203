//! Event stream identification and versioning types.
//!
//! This module defines strong types for event stream identification
//! (`StreamId`) and version control (`Version`) used by the event store's
//! optimistic concurrency check.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `StreamId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid stream ID: {0}")]
pub struct ParseStreamIdError(String);

/// Unique identifier for an event stream (aggregate instance).
///
/// A stream ID uniquely identifies a single aggregate instance in the event
/// store. In the booking core, streams are named by aggregate kind and
/// entity id:
/// - `"schedule-{coach_id}"` - one coach's calendar of holds
/// - `"booking-{booking_id}"` - one booking's lifecycle
/// - `"payment-{intent_id}"` - one payment intent's escrow lifecycle
///
/// # Validation
///
/// - `FromStr::from_str()`: validates input (rejects empty strings)
/// - `From::from()` and `new()`: no validation (for application-controlled data)
///
/// # Examples
///
/// ```
/// use courtside_core::stream::StreamId;
///
/// let stream_id = StreamId::new("booking-42");
/// assert_eq!(stream_id.as_str(), "booking-42");
///
/// let parsed: StreamId = "schedule-coach-7".parse().unwrap();
/// assert_eq!(parsed, StreamId::new("schedule-coach-7"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Create a new `StreamId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the stream ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `StreamId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = ParseStreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseStreamIdError("Stream ID cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Monotonic version of an event stream.
///
/// A new stream is at version 0. Appending N events moves it to version
/// `current + N`. The version doubles as the optimistic concurrency token:
/// an append that carries a stale expected version is rejected.
///
/// # Examples
///
/// ```
/// use courtside_core::stream::Version;
///
/// let v = Version::new(0);
/// assert_eq!(v.next(), Version::new(1));
/// assert_eq!(v.next().value(), 1);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Create a new `Version`.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Version of a stream before any events have been appended.
    #[must_use]
    pub const fn initial() -> Self {
        Self(0)
    }

    /// Get the raw version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The next version (after one more event).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The version after appending `count` events.
    #[must_use]
    pub const fn advance(self, count: u64) -> Self {
        Self(self.0 + count)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn stream_id_roundtrip() {
        let id = StreamId::new("booking-123");
        assert_eq!(id.as_str(), "booking-123");
        assert_eq!(id.clone().into_inner(), "booking-123");
        assert_eq!(format!("{id}"), "booking-123");
    }

    #[test]
    fn stream_id_parse_rejects_empty() {
        let result: Result<StreamId, _> = "".parse();
        assert!(result.is_err());
    }

    #[test]
    fn stream_id_parse_accepts_nonempty() {
        let parsed: StreamId = "payment-xyz".parse().expect("nonempty id parses");
        assert_eq!(parsed, StreamId::new("payment-xyz"));
    }

    #[test]
    fn version_advances() {
        let v = Version::initial();
        assert_eq!(v.value(), 0);
        assert_eq!(v.next(), Version::new(1));
        assert_eq!(v.advance(3), Version::new(3));
        assert!(Version::new(2) < Version::new(5));
    }
}

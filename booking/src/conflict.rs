//! Read-side conflict detection against a coach's schedule.
//!
//! A requested interval `[start, start+duration)` conflicts with an
//! existing booking `[s, e)` for the same coach iff `start < e && s <
//! start+duration`, restricted to bookings that still block the slot
//! (cancelled and completed bookings never do - their holds are released).
//!
//! This check is the fast pre-validation; the authoritative tie-break is
//! the version-checked append on the schedule stream: of two concurrent
//! requests for the same slot, the first commit wins and the second fails
//! with a conflict, never a silent overwrite.

use crate::aggregates::schedule::ScheduleReducer;
use crate::error::BookingError;
use crate::projections::MarketEvent;
use crate::types::{CoachId, ScheduleState, TimeSlot};
use courtside_core::event_store::EventStore;
use courtside_core::stream::{StreamId, Version};
use std::sync::Arc;

/// Detects overlapping active bookings on a coach's calendar.
#[derive(Clone)]
pub struct ConflictChecker {
    store: Arc<dyn EventStore>,
}

impl ConflictChecker {
    /// Creates a new checker over the given event store.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Stream id of a coach's schedule.
    #[must_use]
    pub fn stream_id(coach_id: CoachId) -> StreamId {
        StreamId::new(format!("schedule-{coach_id}"))
    }

    /// Whether the candidate slot overlaps an active booking of the coach.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Storage`] if the schedule stream cannot be
    /// loaded, or [`BookingError::Serialization`] for undecodable events.
    pub async fn has_conflict(
        &self,
        coach_id: CoachId,
        slot: TimeSlot,
    ) -> Result<bool, BookingError> {
        let (state, _) = self.load_schedule(coach_id).await?;
        Ok(state.has_overlap(&slot))
    }

    /// Rebuild a coach's schedule state and report the stream version.
    ///
    /// The version is what makes check-then-act safe: the caller appends
    /// its reservation with this expected version, so a concurrent writer
    /// forces a re-read instead of a lost update.
    ///
    /// # Errors
    ///
    /// As for [`Self::has_conflict`].
    pub async fn load_schedule(
        &self,
        coach_id: CoachId,
    ) -> Result<(ScheduleState, Version), BookingError> {
        let events = self
            .store
            .load_events(Self::stream_id(coach_id), None)
            .await?;
        let version = Version::new(events.len() as u64);

        let mut state = ScheduleState::new();
        for stored in &events {
            if let MarketEvent::Schedule(action) = MarketEvent::decode(stored)? {
                ScheduleReducer::apply_event(&mut state, &action);
            }
        }
        Ok((state, version))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregates::schedule::ScheduleAction;
    use crate::types::{BookingId, PlayerId};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use courtside_core::event::SerializedEvent;
    use courtside_testing::InMemoryEventStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).single().unwrap()
    }

    async fn seed_hold(store: &InMemoryEventStore, coach_id: CoachId, slot: TimeSlot) {
        let event = MarketEvent::Schedule(ScheduleAction::SlotReserved {
            booking_id: BookingId::new(),
            coach_id,
            player_id: PlayerId::new(),
            slot,
            reserved_at: now(),
        });
        let serialized = SerializedEvent::from_event(&event, None).unwrap();
        store
            .append_events(ConflictChecker::stream_id(coach_id), None, vec![serialized])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_schedule_has_no_conflict() {
        let store = Arc::new(InMemoryEventStore::new());
        let checker = ConflictChecker::new(store);

        let conflict = checker
            .has_conflict(CoachId::new(), TimeSlot::new(now(), 60))
            .await
            .unwrap();
        assert!(!conflict);
    }

    #[tokio::test]
    async fn overlap_on_same_coach_is_a_conflict() {
        let store = Arc::new(InMemoryEventStore::new());
        let coach_id = CoachId::new();
        seed_hold(&store, coach_id, TimeSlot::new(now(), 60)).await;

        let checker = ConflictChecker::new(store);
        let conflict = checker
            .has_conflict(coach_id, TimeSlot::new(now() + Duration::minutes(30), 60))
            .await
            .unwrap();
        assert!(conflict);
    }

    #[tokio::test]
    async fn other_coaches_never_contend() {
        let store = Arc::new(InMemoryEventStore::new());
        let busy_coach = CoachId::new();
        seed_hold(&store, busy_coach, TimeSlot::new(now(), 60)).await;

        let checker = ConflictChecker::new(store);
        let conflict = checker
            .has_conflict(CoachId::new(), TimeSlot::new(now(), 60))
            .await
            .unwrap();
        assert!(!conflict);
    }

    #[tokio::test]
    async fn back_to_back_slots_do_not_conflict() {
        let store = Arc::new(InMemoryEventStore::new());
        let coach_id = CoachId::new();
        seed_hold(&store, coach_id, TimeSlot::new(now(), 60)).await;

        let checker = ConflictChecker::new(store);
        let conflict = checker
            .has_conflict(coach_id, TimeSlot::new(now() + Duration::hours(1), 60))
            .await
            .unwrap();
        assert!(!conflict);
    }
}

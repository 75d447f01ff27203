//! Booking history projection: per-user booking lists.
//!
//! Serves `list_bookings` (paginated, ordered by start time descending)
//! and the session scheduler's "which confirmed bookings are due" query.

use super::{MarketEvent, Projection};
use crate::aggregates::BookingAction;
use crate::types::{
    Booking, BookingId, BookingStatus, CoachId, Page, PageResult, PaymentIntentId, PlayerId, Role,
    TimeSlot,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Denormalized view of one booking.
#[derive(Clone, Debug, PartialEq)]
pub struct BookingView {
    /// Booking id
    pub id: BookingId,
    /// Player on the booking
    pub player: PlayerId,
    /// Coach on the booking
    pub coach: CoachId,
    /// Reserved interval
    pub slot: TimeSlot,
    /// Display timezone
    pub timezone: String,
    /// Current status
    pub status: BookingStatus,
    /// Payment intent, once authorized
    pub payment_intent: Option<PaymentIntentId>,
    /// Cancellation reason, if cancelled
    pub cancel_reason: Option<String>,
    /// Last update
    pub updated_at: DateTime<Utc>,
}

impl From<&Booking> for BookingView {
    fn from(booking: &Booking) -> Self {
        Self {
            id: booking.id,
            player: booking.player,
            coach: booking.coach,
            slot: booking.slot,
            timezone: booking.timezone.clone(),
            status: booking.status,
            payment_intent: booking.payment_intent,
            cancel_reason: booking.cancel_reason.clone(),
            updated_at: booking.updated_at,
        }
    }
}

/// In-memory booking history read model.
#[derive(Debug, Default)]
pub struct BookingHistoryProjection {
    bookings: HashMap<BookingId, BookingView>,
}

impl BookingHistoryProjection {
    /// Creates an empty projection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one booking.
    #[must_use]
    pub fn get(&self, id: &BookingId) -> Option<&BookingView> {
        self.bookings.get(id)
    }

    /// Number of bookings in the view.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bookings.len()
    }

    /// List a user's bookings, newest session first.
    ///
    /// `role` selects which side of the booking the user is on;
    /// `status_filter` optionally narrows by lifecycle status.
    #[must_use]
    pub fn list(
        &self,
        user_id: Uuid,
        role: Role,
        status_filter: Option<BookingStatus>,
        page: Page,
    ) -> PageResult<BookingView> {
        let mut matching: Vec<&BookingView> = self
            .bookings
            .values()
            .filter(|b| match role {
                Role::Player => *b.player.as_uuid() == user_id,
                Role::Coach => *b.coach.as_uuid() == user_id,
            })
            .filter(|b| status_filter.is_none_or(|wanted| b.status == wanted))
            .collect();

        // Start time descending
        matching.sort_by(|a, b| b.slot.start.cmp(&a.slot.start));

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.offset())
            .take(page.size as usize)
            .cloned()
            .collect();

        PageResult { items, total, page }
    }

    /// Confirmed bookings whose session start has arrived.
    ///
    /// The scheduler drives these into `InProgress`.
    #[must_use]
    pub fn due_for_start(&self, now: DateTime<Utc>) -> Vec<BookingId> {
        self.bookings
            .values()
            .filter(|b| b.status == BookingStatus::Confirmed && b.slot.start <= now)
            .map(|b| b.id)
            .collect()
    }

    fn apply_booking_event(&mut self, action: &BookingAction) {
        match action {
            BookingAction::BookingCreated {
                booking_id,
                player_id,
                coach_id,
                slot,
                timezone,
                created_at,
            } => {
                self.bookings.insert(
                    *booking_id,
                    BookingView {
                        id: *booking_id,
                        player: *player_id,
                        coach: *coach_id,
                        slot: *slot,
                        timezone: timezone.clone(),
                        status: BookingStatus::Pending,
                        payment_intent: None,
                        cancel_reason: None,
                        updated_at: *created_at,
                    },
                );
            },
            BookingAction::BookingConfirmed {
                booking_id,
                intent_id,
                confirmed_at,
            } => {
                if let Some(view) = self.bookings.get_mut(booking_id) {
                    view.status = BookingStatus::Confirmed;
                    view.payment_intent = Some(*intent_id);
                    view.updated_at = *confirmed_at;
                }
            },
            BookingAction::SessionStarted {
                booking_id,
                started_at,
            } => {
                if let Some(view) = self.bookings.get_mut(booking_id) {
                    view.status = BookingStatus::InProgress;
                    view.updated_at = *started_at;
                }
            },
            BookingAction::SessionCompleted {
                booking_id,
                completed_at,
            } => {
                if let Some(view) = self.bookings.get_mut(booking_id) {
                    view.status = BookingStatus::Completed;
                    view.updated_at = *completed_at;
                }
            },
            BookingAction::BookingCancelled {
                booking_id,
                reason,
                cancelled_at,
                ..
            } => {
                if let Some(view) = self.bookings.get_mut(booking_id) {
                    view.status = BookingStatus::Cancelled;
                    view.cancel_reason = Some(reason.clone());
                    view.updated_at = *cancelled_at;
                }
            },
            _ => {},
        }
    }
}

impl Projection for BookingHistoryProjection {
    fn handle_event(&mut self, event: &MarketEvent) -> Result<(), String> {
        if let MarketEvent::Booking(action) = event {
            self.apply_booking_event(action);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "booking_history"
    }

    fn reset(&mut self) {
        self.bookings.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap()
    }

    fn created(
        booking_id: BookingId,
        player: PlayerId,
        coach: CoachId,
        start_in: Duration,
    ) -> MarketEvent {
        MarketEvent::Booking(BookingAction::BookingCreated {
            booking_id,
            player_id: player,
            coach_id: coach,
            slot: TimeSlot::new(now() + start_in, 60),
            timezone: "UTC".to_string(),
            created_at: now(),
        })
    }

    fn confirmed(booking_id: BookingId) -> MarketEvent {
        MarketEvent::Booking(BookingAction::BookingConfirmed {
            booking_id,
            intent_id: PaymentIntentId::new(),
            confirmed_at: now(),
        })
    }

    #[test]
    fn list_orders_by_start_descending() {
        let player = PlayerId::new();
        let coach = CoachId::new();
        let early = BookingId::new();
        let late = BookingId::new();

        let mut projection = BookingHistoryProjection::new();
        projection.handle_event(&created(early, player, coach, Duration::hours(1))).unwrap();
        projection.handle_event(&created(late, player, coach, Duration::hours(5))).unwrap();

        let result = projection.list(*player.as_uuid(), Role::Player, None, Page::default());
        assert_eq!(result.total, 2);
        assert_eq!(result.items[0].id, late);
        assert_eq!(result.items[1].id, early);
    }

    #[test]
    fn list_filters_by_role_and_status() {
        let player = PlayerId::new();
        let coach = CoachId::new();
        let mine = BookingId::new();
        let other = BookingId::new();

        let mut projection = BookingHistoryProjection::new();
        projection.handle_event(&created(mine, player, coach, Duration::hours(1))).unwrap();
        projection
            .handle_event(&created(other, PlayerId::new(), coach, Duration::hours(2)))
            .unwrap();
        projection.handle_event(&confirmed(mine)).unwrap();

        let as_player = projection.list(*player.as_uuid(), Role::Player, None, Page::default());
        assert_eq!(as_player.total, 1);
        assert_eq!(as_player.items[0].id, mine);

        let as_coach = projection.list(*coach.as_uuid(), Role::Coach, None, Page::default());
        assert_eq!(as_coach.total, 2);

        let confirmed_only = projection.list(
            *coach.as_uuid(),
            Role::Coach,
            Some(BookingStatus::Confirmed),
            Page::default(),
        );
        assert_eq!(confirmed_only.total, 1);
        assert_eq!(confirmed_only.items[0].id, mine);
    }

    #[test]
    fn pagination_slices_pages() {
        let player = PlayerId::new();
        let coach = CoachId::new();
        let mut projection = BookingHistoryProjection::new();
        for i in 0..5 {
            projection
                .handle_event(&created(
                    BookingId::new(),
                    player,
                    coach,
                    Duration::hours(i),
                ))
                .unwrap();
        }

        let first = projection.list(*player.as_uuid(), Role::Player, None, Page::new(1, 2));
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total, 5);

        let last = projection.list(*player.as_uuid(), Role::Player, None, Page::new(3, 2));
        assert_eq!(last.items.len(), 1);
    }

    #[test]
    fn due_for_start_selects_confirmed_past_start() {
        let player = PlayerId::new();
        let coach = CoachId::new();
        let due = BookingId::new();
        let upcoming = BookingId::new();
        let pending = BookingId::new();

        let mut projection = BookingHistoryProjection::new();
        projection.handle_event(&created(due, player, coach, Duration::hours(1))).unwrap();
        projection.handle_event(&confirmed(due)).unwrap();
        projection
            .handle_event(&created(upcoming, player, coach, Duration::hours(8)))
            .unwrap();
        projection.handle_event(&confirmed(upcoming)).unwrap();
        projection
            .handle_event(&created(pending, player, coach, Duration::hours(1)))
            .unwrap();

        let at_start = now() + Duration::hours(1);
        let due_now = projection.due_for_start(at_start);
        assert_eq!(due_now, vec![due]);
    }

    #[test]
    fn reset_clears_the_view() {
        let mut projection = BookingHistoryProjection::new();
        projection
            .handle_event(&created(
                BookingId::new(),
                PlayerId::new(),
                CoachId::new(),
                Duration::hours(1),
            ))
            .unwrap();
        assert_eq!(projection.count(), 1);

        projection.reset();
        assert_eq!(projection.count(), 0);
    }
}

//! End-to-end booking lifecycle scenarios against the in-memory
//! infrastructure.

#![allow(clippy::unwrap_used)]

mod common;

use chrono::Duration;
use common::{base_time, harness, request};
use courtside_booking::{
    Actor, BookingError, BookingStatus, CoachId, Money, Page, PaymentIntentStatus, PlayerId, Role,
    SessionScheduler, TimeSlot,
};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn end_to_end_booking_capture_complete() {
    let h = harness();
    let player = PlayerId::new();
    let coach = CoachId::new();

    // Create: +3h, 60 minutes, $50 USD
    let booking = h
        .service
        .create_booking(request(player, coach, Duration::hours(3)))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);

    let intent_id = booking.payment_intent.unwrap();
    let intent = h.service.payments().get_intent(intent_id).await.unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Authorized);
    assert_eq!(intent.amount, Money::from_dollars(50));

    // Session start: captured
    let booking = h
        .service
        .transition_status(booking.id, BookingStatus::InProgress, Actor::Platform)
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::InProgress);
    let intent = h.service.payments().get_intent(intent_id).await.unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Captured);

    let captures_after_start = h.provider.calls.capture.load(Ordering::SeqCst);
    let refunds_after_start = h.provider.calls.refund.load(Ordering::SeqCst);

    // Completion: no further payment action
    let booking = h
        .service
        .transition_status(booking.id, BookingStatus::Completed, Actor::Coach(coach))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Completed);
    assert_eq!(h.provider.calls.capture.load(Ordering::SeqCst), captures_after_start);
    assert_eq!(h.provider.calls.refund.load(Ordering::SeqCst), refunds_after_start);

    let intent = h.service.payments().get_intent(intent_id).await.unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Captured);
}

#[tokio::test]
async fn cancellation_inside_cutoff_is_rejected() {
    let h = harness();
    let player = PlayerId::new();
    let coach = CoachId::new();

    // Confirmed booking starting in 30 minutes
    let booking = h
        .service
        .create_booking(request(player, coach, Duration::minutes(30)))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);

    let result = h
        .service
        .cancel_booking(booking.id, Actor::Player(player), "can't make it".to_string())
        .await;

    assert!(matches!(
        result,
        Err(BookingError::CancellationWindowClosed { cutoff_hours: 2 })
    ));

    // Still confirmed, nothing refunded or voided
    let unchanged = h.service.get_booking(booking.id).await.unwrap();
    assert_eq!(unchanged.status, BookingStatus::Confirmed);
    assert_eq!(h.provider.calls.void.load(Ordering::SeqCst), 0);
    assert_eq!(h.provider.calls.refund.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn far_out_cancellation_releases_the_hold() {
    let h = harness();
    let player = PlayerId::new();
    let coach = CoachId::new();

    let booking = h
        .service
        .create_booking(request(player, coach, Duration::hours(25)))
        .await
        .unwrap();
    let intent_id = booking.payment_intent.unwrap();

    let cancelled = h
        .service
        .cancel_booking(booking.id, Actor::Player(player), "plans changed".to_string())
        .await
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    // Authorized but never captured: the hold is voided, not refunded
    assert_eq!(h.provider.calls.void.load(Ordering::SeqCst), 1);
    assert_eq!(h.provider.calls.refund.load(Ordering::SeqCst), 0);
    let intent = h.service.payments().get_intent(intent_id).await.unwrap();
    assert!(matches!(
        intent.status,
        PaymentIntentStatus::Refunded { amount } if amount.is_zero()
    ));

    // The slot is bookable again
    let rebooked = h
        .service
        .create_booking(request(PlayerId::new(), coach, Duration::hours(25)))
        .await
        .unwrap();
    assert_eq!(rebooked.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn captured_cancellation_refunds_in_full_outside_24h() {
    let h = harness();
    let player = PlayerId::new();
    let coach = CoachId::new();

    let booking = h
        .service
        .create_booking(request(player, coach, Duration::hours(30)))
        .await
        .unwrap();
    let intent_id = booking.payment_intent.unwrap();

    // Funds captured ahead of the session (e.g. an early-capture flow)
    h.service.payments().capture(intent_id).await.unwrap();

    h.service
        .cancel_booking(booking.id, Actor::Player(player), "plans changed".to_string())
        .await
        .unwrap();

    assert_eq!(h.provider.calls.refund.load(Ordering::SeqCst), 1);
    let intent = h.service.payments().get_intent(intent_id).await.unwrap();
    assert!(matches!(
        intent.status,
        PaymentIntentStatus::Refunded { amount } if amount == Money::from_dollars(50)
    ));
}

#[tokio::test]
async fn captured_cancellation_refunds_partially_inside_24h() {
    let h = harness();
    let player = PlayerId::new();
    let coach = CoachId::new();

    // 3h ahead: past the full-refund window, outside the 2h cutoff
    let booking = h
        .service
        .create_booking(request(player, coach, Duration::hours(3)))
        .await
        .unwrap();
    let intent_id = booking.payment_intent.unwrap();
    h.service.payments().capture(intent_id).await.unwrap();

    h.service
        .cancel_booking(booking.id, Actor::Player(player), "overslept tomorrow".to_string())
        .await
        .unwrap();

    let intent = h.service.payments().get_intent(intent_id).await.unwrap();
    assert!(matches!(
        intent.status,
        PaymentIntentStatus::Refunded { amount } if amount == Money::from_dollars(25)
    ));
}

#[tokio::test]
async fn only_participants_may_cancel() {
    let h = harness();
    let player = PlayerId::new();
    let coach = CoachId::new();

    let booking = h
        .service
        .create_booking(request(player, coach, Duration::hours(25)))
        .await
        .unwrap();

    let stranger = h
        .service
        .cancel_booking(booking.id, Actor::Player(PlayerId::new()), "mine now".to_string())
        .await;
    assert!(matches!(stranger, Err(BookingError::Forbidden { .. })));

    // The coach on the booking may cancel
    let by_coach = h
        .service
        .cancel_booking(booking.id, Actor::Coach(coach), "injured".to_string())
        .await
        .unwrap();
    assert_eq!(by_coach.status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn only_the_platform_starts_sessions() {
    let h = harness();
    let player = PlayerId::new();
    let coach = CoachId::new();

    let booking = h
        .service
        .create_booking(request(player, coach, Duration::hours(3)))
        .await
        .unwrap();

    let result = h
        .service
        .transition_status(booking.id, BookingStatus::InProgress, Actor::Player(player))
        .await;
    assert!(matches!(result, Err(BookingError::Forbidden { .. })));
}

#[tokio::test]
async fn rollback_on_decline_frees_the_slot() {
    let h = harness();
    let player = PlayerId::new();
    let coach = CoachId::new();

    h.provider
        .queue_confirm_failures([courtside_booking::ProviderError::Declined {
            reason: "insufficient funds".to_string(),
        }]);

    let result = h
        .service
        .create_booking(request(player, coach, Duration::hours(3)))
        .await;
    assert!(matches!(result, Err(BookingError::PaymentDeclined { .. })));

    // No booking survives in confirmed; the rolled-back one is cancelled
    let listing = h
        .service
        .list_bookings(*player.as_uuid(), Role::Player, None, Page::default())
        .await;
    assert!(listing.items.iter().all(|b| b.status == BookingStatus::Cancelled));

    // The slot becomes bookable again by another request
    let retry = h
        .service
        .create_booking(request(PlayerId::new(), coach, Duration::hours(3)))
        .await
        .unwrap();
    assert_eq!(retry.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn provider_timeouts_are_retried_then_succeed() {
    let h = harness();

    h.provider.queue_confirm_failures([
        courtside_booking::ProviderError::Timeout,
        courtside_booking::ProviderError::Transport {
            message: "connection reset".to_string(),
        },
    ]);

    let booking = h
        .service
        .create_booking(request(PlayerId::new(), CoachId::new(), Duration::hours(3)))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(h.provider.calls.confirm.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_timeouts_roll_back_with_retryable_error() {
    let h = harness();
    let coach = CoachId::new();

    h.provider.queue_confirm_failures([
        courtside_booking::ProviderError::Timeout,
        courtside_booking::ProviderError::Timeout,
        courtside_booking::ProviderError::Timeout,
    ]);

    let result = h
        .service
        .create_booking(request(PlayerId::new(), coach, Duration::hours(3)))
        .await;

    let error = result.unwrap_err();
    assert!(matches!(error, BookingError::ProviderTimeout));
    assert!(error.is_retryable());

    // Slot freed by the rollback
    let retry = h
        .service
        .create_booking(request(PlayerId::new(), coach, Duration::hours(3)))
        .await
        .unwrap();
    assert_eq!(retry.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn booking_outside_declared_availability_is_rejected() {
    let h = harness();
    let coach = CoachId::new();

    // Coach is bookable 13:00-17:00 on the base day
    h.service
        .declare_availability(
            coach,
            TimeSlot::new(base_time() + Duration::hours(1), 4 * 60),
        )
        .await
        .unwrap();

    // 20:00 is outside the declared window
    let result = h
        .service
        .create_booking(request(PlayerId::new(), coach, Duration::hours(8)))
        .await;
    assert!(matches!(result, Err(BookingError::Validation(msg)) if msg.contains("availability")));

    // Inside the window is fine
    let inside = h
        .service
        .create_booking(request(PlayerId::new(), coach, Duration::hours(2)))
        .await
        .unwrap();
    assert_eq!(inside.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn validation_rejects_past_start_and_zero_duration() {
    let h = harness();

    let mut past = request(PlayerId::new(), CoachId::new(), Duration::hours(1));
    past.start = base_time() - Duration::hours(1);
    assert!(matches!(
        h.service.create_booking(past).await,
        Err(BookingError::Validation(_))
    ));

    let mut empty = request(PlayerId::new(), CoachId::new(), Duration::hours(1));
    empty.duration_minutes = 0;
    assert!(matches!(
        h.service.create_booking(empty).await,
        Err(BookingError::Validation(_))
    ));
}

#[tokio::test]
async fn listing_pages_newest_first() {
    let h = harness();
    let player = PlayerId::new();
    let coach = CoachId::new();

    for hours in [3, 5, 7] {
        h.service
            .create_booking(request(player, coach, Duration::hours(hours)))
            .await
            .unwrap();
    }

    let listing = h
        .service
        .list_bookings(*player.as_uuid(), Role::Player, None, Page::new(1, 2))
        .await;
    assert_eq!(listing.total, 3);
    assert_eq!(listing.items.len(), 2);
    assert_eq!(listing.items[0].slot.start, base_time() + Duration::hours(7));
    assert_eq!(listing.items[1].slot.start, base_time() + Duration::hours(5));

    let confirmed = h
        .service
        .list_bookings(
            *player.as_uuid(),
            Role::Player,
            Some(BookingStatus::Confirmed),
            Page::default(),
        )
        .await;
    assert_eq!(confirmed.total, 3);
}

#[tokio::test]
async fn scheduler_starts_due_sessions() {
    let h = harness();
    let player = PlayerId::new();
    let coach = CoachId::new();

    let booking = h
        .service
        .create_booking(request(player, coach, Duration::hours(1)))
        .await
        .unwrap();

    let scheduler = SessionScheduler::new(h.service.clone(), std::time::Duration::from_secs(30));

    // Too early: nothing due
    assert_eq!(scheduler.tick().await, 0);

    // Session start arrives
    h.clock.advance(Duration::hours(1));
    assert_eq!(scheduler.tick().await, 1);

    let started = h.service.get_booking(booking.id).await.unwrap();
    assert_eq!(started.status, BookingStatus::InProgress);
    let intent = h
        .service
        .payments()
        .get_intent(booking.payment_intent.unwrap())
        .await
        .unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Captured);

    // A second pass finds nothing to do
    assert_eq!(scheduler.tick().await, 0);
}

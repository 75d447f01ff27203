//! Booking core demo.
//!
//! Walks through the booking lifecycle against a live Postgres event
//! store:
//! - coach declares availability
//! - player books a slot (authorize -> confirmed)
//! - a second overlapping request is rejected with a conflict
//! - the session starts (capture) and completes
//! - a far-out booking is cancelled with a full refund
//!
//! # Usage
//!
//! ```bash
//! # Start infrastructure
//! docker compose up -d postgres
//!
//! # Run demo
//! cargo run --bin demo
//! ```

use chrono::Duration;
use courtside_booking::{
    Actor, BookingApp, BookingStatus, Config, CreateBookingRequest, CoachId, Currency, Money,
    PlayerId, TimeSlot,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,courtside_booking=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("\n============================================");
    println!("   Courtside Booking Core - Live Demo");
    println!("============================================\n");

    let config = Config::from_env();
    println!("Connecting to event store...");
    let app = BookingApp::new(config).await?;
    let service = app.service.clone();
    println!("Ready.\n");

    let coach = CoachId::new();
    let player = PlayerId::new();
    let now = service.now();

    // 1. Coach declares a bookable window
    println!("1. Coach {coach} declares availability (next 48h)");
    service
        .declare_availability(coach, TimeSlot::new(now, 48 * 60))
        .await?;

    // 2. Player books a session three hours out
    let start = now + Duration::hours(3);
    println!("2. Player {player} books 60 minutes at {start} for $50");
    let booking = service
        .create_booking(CreateBookingRequest {
            player,
            coach,
            start,
            duration_minutes: 60,
            timezone: "America/Montreal".to_string(),
            amount: Money::from_dollars(50),
            currency: Currency::Usd,
        })
        .await?;
    println!("   -> booking {} is {}", booking.id, booking.status);

    let intent_id = booking.payment_intent.ok_or("confirmed booking must have an intent")?;
    let intent = service.payments().get_intent(intent_id).await?;
    println!("   -> payment intent {} is {}", intent.id, intent.status);

    // 3. A second request for the same slot conflicts
    println!("3. Another player requests the same slot");
    let rival = service
        .create_booking(CreateBookingRequest {
            player: PlayerId::new(),
            coach,
            start,
            duration_minutes: 60,
            timezone: "Europe/Paris".to_string(),
            amount: Money::from_dollars(50),
            currency: Currency::Usd,
        })
        .await;
    match rival {
        Err(error) => println!("   -> rejected: {}", error.user_message()),
        Ok(_) => println!("   -> unexpected: double booking!"),
    }

    // 4. Session start: platform drives the transition, funds are captured
    println!("4. Session starts (platform transition, capture)");
    let booking = service
        .transition_status(booking.id, BookingStatus::InProgress, Actor::Platform)
        .await?;
    let intent = service.payments().get_intent(intent_id).await?;
    println!("   -> booking {} / intent {}", booking.status, intent.status);

    // 5. Session completes; the slot is free again
    println!("5. Session completes");
    let booking = service
        .transition_status(booking.id, BookingStatus::Completed, Actor::Coach(coach))
        .await?;
    println!("   -> booking {}", booking.status);

    // 6. A far-out booking cancelled with a full refund
    println!("6. Booking 30h out, then cancelling (full refund window)");
    let faraway = service
        .create_booking(CreateBookingRequest {
            player,
            coach,
            start: now + Duration::hours(30),
            duration_minutes: 60,
            timezone: "America/Montreal".to_string(),
            amount: Money::from_dollars(50),
            currency: Currency::Usd,
        })
        .await?;
    let cancelled = service
        .cancel_booking(faraway.id, Actor::Player(player), "plans changed".to_string())
        .await?;
    println!(
        "   -> booking {} ({})",
        cancelled.status,
        cancelled.cancel_reason.as_deref().unwrap_or("-")
    );

    // 7. Listing
    let listing = service
        .list_bookings(
            *player.as_uuid(),
            courtside_booking::Role::Player,
            None,
            courtside_booking::Page::default(),
        )
        .await;
    println!("\nPlayer history ({} bookings):", listing.total);
    for view in &listing.items {
        println!("   {} {} {}", view.id, view.slot, view.status);
    }

    println!("\nDone.");
    Ok(())
}

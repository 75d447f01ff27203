//! Shared fixtures for booking core integration tests.

#![allow(dead_code)] // not every test file uses every helper

use chrono::{DateTime, Duration, TimeZone, Utc};
use courtside_booking::{
    BookingService, CancellationPolicy, CoachId, CreateBookingRequest, Currency, Money,
    PaymentSettings, PlayerId, ServiceSettings,
};
use courtside_core::environment::Clock;
use courtside_runtime::circuit_breaker::CircuitBreakerConfig;
use courtside_runtime::retry::RetryPolicy;
use courtside_booking::provider::MockPaymentProvider;
use courtside_testing::{InMemoryEventBus, InMemoryEventStore};
use std::sync::{Arc, Mutex};

/// Adjustable clock: starts fixed, can be advanced by tests (scheduler
/// scenarios).
pub struct StepClock {
    now: Mutex<DateTime<Utc>>,
}

impl StepClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    #[allow(clippy::unwrap_used)]
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for StepClock {
    #[allow(clippy::unwrap_used)]
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub struct TestHarness {
    pub service: Arc<BookingService>,
    pub store: Arc<InMemoryEventStore>,
    pub bus: Arc<InMemoryEventBus>,
    pub provider: Arc<MockPaymentProvider>,
    pub clock: Arc<StepClock>,
}

#[allow(clippy::unwrap_used)]
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap()
}

/// Retry/timeout tuning fast enough for tests.
pub fn fast_settings() -> ServiceSettings {
    ServiceSettings {
        payment: PaymentSettings {
            call_timeout: std::time::Duration::from_millis(200),
            retry: RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(std::time::Duration::from_millis(5))
                .build(),
            breaker: CircuitBreakerConfig::builder()
                .failure_threshold(50)
                .build(),
        },
        policy: CancellationPolicy::default(),
        ..ServiceSettings::default()
    }
}

pub fn harness() -> TestHarness {
    let store = Arc::new(InMemoryEventStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let provider = Arc::new(MockPaymentProvider::new());
    let clock = Arc::new(StepClock::new(base_time()));

    let service = Arc::new(BookingService::new(
        store.clone(),
        bus.clone(),
        provider.clone(),
        clock.clone(),
        fast_settings(),
    ));

    TestHarness {
        service,
        store,
        bus,
        provider,
        clock,
    }
}

/// A standard request: 60 minutes, $50 USD, starting `start_in` from the
/// harness base time.
pub fn request(player: PlayerId, coach: CoachId, start_in: Duration) -> CreateBookingRequest {
    CreateBookingRequest {
        player,
        coach,
        start: base_time() + start_in,
        duration_minutes: 60,
        timezone: "America/Montreal".to_string(),
        amount: Money::from_dollars(50),
        currency: Currency::Usd,
    }
}

//! Application wiring: the booking service and its production setup.

pub mod services;

pub use services::{BookingService, CreateBookingRequest, ServiceSettings};

use crate::bus::BroadcastEventBus;
use crate::config::Config;
use crate::error::BookingError;
use crate::provider::{MockPaymentProvider, PaymentProvider};
use crate::scheduler::SessionScheduler;
use courtside_core::environment::SystemClock;
use courtside_postgres::PostgresEventStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Production wiring of the booking core.
///
/// Connects the Postgres event store, the in-process event bus, and the
/// payment provider, and exposes the service plus a session scheduler.
pub struct BookingApp {
    /// The booking service façade
    pub service: Arc<BookingService>,
    /// The in-process event bus (subscribe here for downstream consumers)
    pub bus: Arc<BroadcastEventBus>,
    scheduler_poll: Duration,
}

impl BookingApp {
    /// Connect to infrastructure and wire the service.
    ///
    /// Uses the mock payment provider until a real gateway integration is
    /// configured; swap via [`Self::with_provider`].
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Storage`] if the database connection or
    /// migration fails.
    pub async fn new(config: Config) -> Result<Self, BookingError> {
        Self::with_provider(config, Arc::new(MockPaymentProvider::new())).await
    }

    /// Connect with an explicit payment provider.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Storage`] if the database connection or
    /// migration fails.
    pub async fn with_provider(
        config: Config,
        provider: Arc<dyn PaymentProvider>,
    ) -> Result<Self, BookingError> {
        let store = PostgresEventStore::connect_with(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(config.database.connect_timeout),
        )
        .await?;
        store.migrate().await?;

        let bus = Arc::new(BroadcastEventBus::default());
        let service = Arc::new(BookingService::new(
            Arc::new(store),
            bus.clone(),
            provider,
            Arc::new(SystemClock),
            config.service_settings(),
        ));

        tracing::info!("booking core wired against postgres event store");

        Ok(Self {
            service,
            bus,
            scheduler_poll: Duration::from_secs(config.scheduler_poll_secs),
        })
    }

    /// Start the session scheduler in the background.
    #[must_use]
    pub fn start_scheduler(&self) -> JoinHandle<()> {
        SessionScheduler::new(self.service.clone(), self.scheduler_poll).spawn()
    }
}

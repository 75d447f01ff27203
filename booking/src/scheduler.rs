//! Session-start scheduler.
//!
//! A confirmed booking moves to in-progress when its start time arrives.
//! This poll-based scheduler queries the read model for due bookings on a
//! fixed interval and drives the transition as the platform actor. Losing
//! a race is harmless: the transition rejects non-confirmed bookings and
//! capture is idempotent.

use crate::app::BookingService;
use crate::error::BookingError;
use crate::types::{Actor, BookingStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Polls for confirmed bookings whose session start has arrived.
pub struct SessionScheduler {
    service: Arc<BookingService>,
    poll_interval: Duration,
}

impl SessionScheduler {
    /// Creates a scheduler over the given service.
    #[must_use]
    pub const fn new(service: Arc<BookingService>, poll_interval: Duration) -> Self {
        Self {
            service,
            poll_interval,
        }
    }

    /// Run one scheduling pass; returns how many sessions were started.
    pub async fn tick(&self) -> usize {
        let now = self.service.now();
        let due = self.service.due_sessions(now).await;
        let mut started = 0;

        for booking_id in due {
            match self
                .service
                .transition_status(booking_id, BookingStatus::InProgress, Actor::Platform)
                .await
            {
                Ok(_) => started += 1,
                // Another worker won the race; nothing to do
                Err(BookingError::InvalidTransition { .. } | BookingError::StaleState) => {
                    tracing::debug!(booking_id = %booking_id, "session already started elsewhere");
                },
                Err(error) => {
                    tracing::error!(booking_id = %booking_id, %error, "failed to start session");
                },
            }
        }

        if started > 0 {
            tracing::info!(started, "scheduler pass started sessions");
        }
        started
    }

    /// Run the scheduler until the task is aborted.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }
}

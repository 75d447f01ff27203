//! Booking service façade: the public surface of the booking core.
//!
//! Composes the conflict checker, the three aggregates, the payment
//! coordinator, and the outbox emitter into the five operations an API
//! layer maps onto: create, get, list, transition, cancel.
//!
//! Booking creation is a multi-step saga:
//!
//! ```text
//! validate ──► reserve slot ──► persist Pending ──► authorize ──► Confirmed
//!                  │                                   │
//!                  │                            decline/timeout
//!                  ▼                                   ▼
//!              Conflict                 COMPENSATE: cancel Pending,
//!                                       release slot, void any hold
//! ```
//!
//! If the conflict check passes but authorization fails, the booking is
//! rolled back so no orphaned pending booking holds the slot forever.

use crate::aggregates::booking::{BookingAction, BookingReducer, CancellationPolicy};
use crate::aggregates::schedule::{ScheduleAction, ScheduleReducer};
use crate::conflict::ConflictChecker;
use crate::coordinator::{PaymentCoordinator, PaymentSettings};
use crate::error::BookingError;
use crate::outbox::{EventEmitter, EventTopics};
use crate::projections::booking_history::{BookingHistoryProjection, BookingView};
use crate::projections::{MarketEvent, Projection};
use crate::provider::PaymentProvider;
use crate::types::{
    Actor, Booking, BookingId, BookingState, BookingStatus, CoachId, Currency, Money, Page,
    PageResult, PaymentIntentStatus, PlayerId, RefundEligibility, Role, TimeSlot,
};
use chrono::{DateTime, Utc};
use courtside_core::environment::Clock;
use courtside_core::event_bus::EventBus;
use courtside_core::event_store::{EventStore, EventStoreError};
use courtside_core::stream::StreamId;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Request to create a booking.
///
/// Carries the price for the slot; rate resolution from the coach's profile
/// is the caller's concern.
#[derive(Clone, Debug)]
pub struct CreateBookingRequest {
    /// Player booking the session
    pub player: PlayerId,
    /// Coach being booked
    pub coach: CoachId,
    /// Session start (UTC)
    pub start: DateTime<Utc>,
    /// Session length in minutes
    pub duration_minutes: u32,
    /// Advisory display timezone (IANA name)
    pub timezone: String,
    /// Price of the session
    pub amount: Money,
    /// Settlement currency
    pub currency: Currency,
}

/// Tuning for the booking service.
#[derive(Clone, Debug, Default)]
pub struct ServiceSettings {
    /// Event bus topic names
    pub topics: EventTopics,
    /// Platform cancellation policy
    pub policy: CancellationPolicy,
    /// Provider call tuning
    pub payment: PaymentSettings,
}

/// The booking/session lifecycle core of the marketplace.
pub struct BookingService {
    store: Arc<dyn EventStore>,
    emitter: EventEmitter,
    coordinator: PaymentCoordinator,
    conflicts: ConflictChecker,
    clock: Arc<dyn Clock>,
    policy: CancellationPolicy,
    projection: RwLock<BookingHistoryProjection>,
}

impl BookingService {
    /// Wire up the service over the given infrastructure.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        bus: Arc<dyn EventBus>,
        provider: Arc<dyn PaymentProvider>,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Self {
        let emitter = EventEmitter::new(store.clone(), bus, settings.topics);
        let coordinator = PaymentCoordinator::new(
            store.clone(),
            emitter.clone(),
            provider,
            clock.clone(),
            settings.payment,
        );
        Self {
            conflicts: ConflictChecker::new(store.clone()),
            store,
            emitter,
            coordinator,
            clock,
            policy: settings.policy,
            projection: RwLock::new(BookingHistoryProjection::new()),
        }
    }

    /// Stream id of a booking's event stream.
    #[must_use]
    pub fn booking_stream(booking_id: BookingId) -> StreamId {
        StreamId::new(format!("booking-{booking_id}"))
    }

    /// Current time as seen by the service.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The payment coordinator (intent lookups, manual operations).
    #[must_use]
    pub const fn payments(&self) -> &PaymentCoordinator {
        &self.coordinator
    }

    /// The conflict checker (read-side pre-validation).
    #[must_use]
    pub const fn conflicts(&self) -> &ConflictChecker {
        &self.conflicts
    }

    /// Declare a bookable window on a coach's calendar.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] for an empty window, or storage
    /// errors.
    pub async fn declare_availability(
        &self,
        coach_id: CoachId,
        window: TimeSlot,
    ) -> Result<(), BookingError> {
        self.apply_schedule_command(
            coach_id,
            &ScheduleAction::DeclareAvailability { coach_id, window },
        )
        .await?;
        Ok(())
    }

    /// Create a booking: reserve the slot, authorize payment, confirm.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] for malformed input
    /// - [`BookingError::Conflict`] when the slot overlaps an active booking
    /// - [`BookingError::PaymentDeclined`] / [`BookingError::ProviderTimeout`] /
    ///   [`BookingError::ProviderUnavailable`] when authorization fails -
    ///   the booking is rolled back and the slot is bookable again
    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
    ) -> Result<Booking, BookingError> {
        let now = self.clock.now();
        let slot = TimeSlot::new(request.start, request.duration_minutes);

        if request.duration_minutes == 0 {
            return Err(BookingError::Validation(
                "session duration must be positive".to_string(),
            ));
        }
        if request.start <= now {
            return Err(BookingError::Validation(
                "session start must be in the future".to_string(),
            ));
        }
        if request.amount.is_zero() {
            return Err(BookingError::Validation(
                "payment amount must be positive".to_string(),
            ));
        }

        let booking_id = BookingId::new();
        tracing::info!(
            booking_id = %booking_id,
            player_id = %request.player,
            coach_id = %request.coach,
            slot = %slot,
            "creating booking"
        );

        // Fast pre-check; the reservation append below is the authoritative
        // guard
        if self.conflicts.has_conflict(request.coach, slot).await? {
            metrics::counter!("booking_conflicts_total").increment(1);
            return Err(BookingError::Conflict {
                coach: request.coach,
            });
        }

        if let Err(error) = self.reserve_slot(booking_id, &request, slot).await {
            if matches!(error, BookingError::Conflict { .. }) {
                metrics::counter!("booking_conflicts_total").increment(1);
            }
            return Err(error);
        }

        // Persist the pending booking; if this fails the hold must not leak
        let created = self
            .apply_booking_command(
                booking_id,
                &BookingAction::CreateBooking {
                    booking_id,
                    player_id: request.player,
                    coach_id: request.coach,
                    slot,
                    timezone: request.timezone.clone(),
                },
            )
            .await;
        if let Err(error) = created {
            self.release_slot(booking_id, request.coach).await;
            return Err(error);
        }

        // Authorize; on any failure compensate so the slot frees up
        let intent = match self
            .coordinator
            .authorize(booking_id, request.amount, request.currency)
            .await
        {
            Ok(intent) => intent,
            Err(error) => {
                tracing::warn!(
                    booking_id = %booking_id,
                    %error,
                    "authorization failed, rolling back booking"
                );
                self.rollback_pending(booking_id, request.coach, "payment authorization failed")
                    .await;
                return Err(error);
            },
        };

        let confirmed = self
            .apply_booking_command(
                booking_id,
                &BookingAction::ConfirmBooking {
                    booking_id,
                    intent_id: intent.id,
                },
            )
            .await;

        match confirmed {
            Ok(booking) => {
                metrics::counter!("bookings_created_total").increment(1);
                tracing::info!(booking_id = %booking_id, intent_id = %intent.id, "booking confirmed");
                Ok(booking)
            },
            // Confirmation could not be recorded: the hold must not stay
            // orphaned at the provider
            Err(error) => {
                tracing::error!(
                    booking_id = %booking_id,
                    %error,
                    "failed to confirm booking, voiding authorization"
                );
                if let Err(void_error) = self.coordinator.void_authorization(intent.id).await {
                    tracing::error!(intent_id = %intent.id, %void_error, "failed to void authorization");
                }
                self.rollback_pending(booking_id, request.coach, "confirmation failed")
                    .await;
                Err(error)
            },
        }
    }

    /// Fetch one booking.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::NotFound`] for an unknown id.
    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        let (state, _) = self.load_booking(booking_id).await?;
        state
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound {
                entity: "booking",
                id: booking_id.to_string(),
            })
    }

    /// List a user's bookings, newest session first, paginated.
    pub async fn list_bookings(
        &self,
        user_id: Uuid,
        role: Role,
        status_filter: Option<BookingStatus>,
        page: Page,
    ) -> PageResult<BookingView> {
        self.projection
            .read()
            .await
            .list(user_id, role, status_filter, page)
    }

    /// Confirmed bookings whose session start has arrived.
    pub async fn due_sessions(&self, now: DateTime<Utc>) -> Vec<BookingId> {
        self.projection.read().await.due_for_start(now)
    }

    /// Drive a booking to a target status on behalf of an actor.
    ///
    /// Actor rules: only the platform starts sessions (capture is a side
    /// effect); the platform or the booking's coach completes them; the
    /// booking's player, coach, or an admin cancels.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Forbidden`] when the actor may not drive the
    ///   transition
    /// - [`BookingError::InvalidTransition`] for illegal workflow steps
    /// - [`BookingError::StaleState`] when a concurrent transition won; the
    ///   caller should re-read and retry
    pub async fn transition_status(
        &self,
        booking_id: BookingId,
        target: BookingStatus,
        actor: Actor,
    ) -> Result<Booking, BookingError> {
        match target {
            BookingStatus::InProgress => self.start_session(booking_id, actor).await,
            BookingStatus::Completed => self.complete_session(booking_id, actor).await,
            BookingStatus::Cancelled => {
                self.cancel_booking(booking_id, actor, "cancelled".to_string())
                    .await
            },
            BookingStatus::Confirmed => Err(BookingError::Forbidden {
                reason: "confirmation is driven by payment authorization".to_string(),
            }),
            BookingStatus::Pending => Err(BookingError::InvalidTransition {
                from: "any".to_string(),
                to: BookingStatus::Pending.to_string(),
            }),
        }
    }

    /// Cancel a booking, applying the cancellation policy and compensating
    /// the payment (refund if captured, release if only authorized).
    ///
    /// # Errors
    ///
    /// - [`BookingError::CancellationWindowClosed`] inside the cutoff
    /// - [`BookingError::InvalidTransition`] for in-progress/completed
    ///   bookings
    /// - [`BookingError::Forbidden`] for actors not on the booking
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        actor: Actor,
        reason: String,
    ) -> Result<Booking, BookingError> {
        let (state, version) = self.load_booking(booking_id).await?;
        let booking = state
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound {
                entity: "booking",
                id: booking_id.to_string(),
            })?;

        match actor {
            Actor::Player(id) if id == booking.player => {},
            Actor::Coach(id) if id == booking.coach => {},
            Actor::Admin | Actor::Platform => {},
            _ => {
                return Err(BookingError::Forbidden {
                    reason: "only the booking's player, coach, or an admin may cancel"
                        .to_string(),
                });
            },
        }

        let events = BookingReducer::decide(
            &state,
            &BookingAction::CancelBooking {
                booking_id,
                actor,
                reason: reason.clone(),
            },
            self.clock.now(),
            &self.policy,
        )?;
        let eligibility = events.iter().find_map(|event| match event {
            BookingAction::BookingCancelled {
                refund_eligibility, ..
            } => *refund_eligibility,
            _ => None,
        });

        // Compensate the payment before recording the cancellation: if the
        // provider is unreachable the booking stays confirmed and the
        // caller retries
        if let Some(intent_id) = booking.payment_intent {
            let intent = self.coordinator.get_intent(intent_id).await?;
            match intent.status {
                PaymentIntentStatus::Captured => {
                    let amount = match eligibility {
                        Some(RefundEligibility::Partial) => {
                            Some(intent.amount.percentage(self.policy.partial_refund_percent))
                        },
                        _ => None,
                    };
                    let refund = self
                        .coordinator
                        .refund(intent_id, amount, &format!("booking cancelled: {reason}"))
                        .await?;
                    tracing::info!(
                        booking_id = %booking_id,
                        amount = refund.amount.cents(),
                        full = refund.full,
                        "cancellation refund issued"
                    );
                },
                PaymentIntentStatus::Authorized => {
                    self.coordinator.void_authorization(intent_id).await?;
                },
                _ => {},
            }
        }

        let mut state = state;
        for event in &events {
            BookingReducer::apply_event(&mut state, event);
        }
        let wrapped: Vec<MarketEvent> =
            events.iter().cloned().map(MarketEvent::Booking).collect();
        self.emitter
            .append_and_publish(
                &Self::booking_stream(booking_id),
                version,
                &wrapped,
                self.clock.now(),
            )
            .await
            .map_err(BookingError::from)?;
        self.project(&events).await;

        self.release_slot(booking_id, booking.coach).await;

        metrics::counter!("bookings_cancelled_total").increment(1);
        tracing::info!(booking_id = %booking_id, actor = %actor, "booking cancelled");

        state
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound {
                entity: "booking",
                id: booking_id.to_string(),
            })
    }

    /// Retry any events whose bus publish failed; returns how many are
    /// still pending.
    pub async fn flush_outbox(&self) -> usize {
        self.emitter.flush().await
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    async fn start_session(
        &self,
        booking_id: BookingId,
        actor: Actor,
    ) -> Result<Booking, BookingError> {
        if !matches!(actor, Actor::Platform) {
            return Err(BookingError::Forbidden {
                reason: "only the platform may start a session".to_string(),
            });
        }

        let (mut state, version) = self.load_booking(booking_id).await?;
        let events = BookingReducer::decide(
            &state,
            &BookingAction::StartSession { booking_id },
            self.clock.now(),
            &self.policy,
        )?;

        // Session start triggers capture. Capture is idempotent, so losing
        // the append race below leaves no double charge.
        let intent_id = state
            .get(&booking_id)
            .and_then(|b| b.payment_intent)
            .ok_or_else(|| {
                BookingError::Storage(format!("confirmed booking {booking_id} has no payment intent"))
            })?;
        self.coordinator.capture(intent_id).await?;

        for event in &events {
            BookingReducer::apply_event(&mut state, event);
        }
        let wrapped: Vec<MarketEvent> =
            events.iter().cloned().map(MarketEvent::Booking).collect();
        self.emitter
            .append_and_publish(
                &Self::booking_stream(booking_id),
                version,
                &wrapped,
                self.clock.now(),
            )
            .await
            .map_err(BookingError::from)?;
        self.project(&events).await;

        metrics::counter!("sessions_started_total").increment(1);
        tracing::info!(booking_id = %booking_id, "session started, payment captured");

        state
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound {
                entity: "booking",
                id: booking_id.to_string(),
            })
    }

    async fn complete_session(
        &self,
        booking_id: BookingId,
        actor: Actor,
    ) -> Result<Booking, BookingError> {
        let current = self.get_booking(booking_id).await?;
        match actor {
            Actor::Platform | Actor::Admin => {},
            Actor::Coach(id) if id == current.coach => {},
            _ => {
                return Err(BookingError::Forbidden {
                    reason: "only the platform or the booking's coach may complete a session"
                        .to_string(),
                });
            },
        }

        let booking = self
            .apply_booking_command(booking_id, &BookingAction::CompleteSession { booking_id })
            .await?;

        // A completed session no longer blocks the slot
        self.release_slot(booking_id, booking.coach).await;

        metrics::counter!("sessions_completed_total").increment(1);
        tracing::info!(booking_id = %booking_id, "session completed");
        Ok(booking)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn load_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<(BookingState, courtside_core::stream::Version), BookingError> {
        let events = self
            .store
            .load_events(Self::booking_stream(booking_id), None)
            .await?;
        let version = courtside_core::stream::Version::new(events.len() as u64);

        let mut state = BookingState::new();
        for stored in &events {
            if let MarketEvent::Booking(action) = MarketEvent::decode(stored)? {
                BookingReducer::apply_event(&mut state, &action);
            }
        }
        Ok((state, version))
    }

    /// Load, decide, append with the expected version, project.
    ///
    /// A concurrency conflict on the booking stream means the caller acted
    /// on stale state.
    async fn apply_booking_command(
        &self,
        booking_id: BookingId,
        command: &BookingAction,
    ) -> Result<Booking, BookingError> {
        let (mut state, version) = self.load_booking(booking_id).await?;
        let events = BookingReducer::decide(&state, command, self.clock.now(), &self.policy)?;
        for event in &events {
            BookingReducer::apply_event(&mut state, event);
        }
        let wrapped: Vec<MarketEvent> =
            events.iter().cloned().map(MarketEvent::Booking).collect();
        self.emitter
            .append_and_publish(
                &Self::booking_stream(booking_id),
                version,
                &wrapped,
                self.clock.now(),
            )
            .await
            .map_err(BookingError::from)?;
        self.project(&events).await;

        state
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound {
                entity: "booking",
                id: booking_id.to_string(),
            })
    }

    /// Take the slot hold, retrying once on a lost append race.
    ///
    /// Two concurrent requests for the same slot both pass the overlap
    /// check against the same schedule version; exactly one append commits.
    /// The loser re-reads and now sees the winner's hold as a conflict.
    async fn reserve_slot(
        &self,
        booking_id: BookingId,
        request: &CreateBookingRequest,
        slot: TimeSlot,
    ) -> Result<(), BookingError> {
        for attempt in 0..2 {
            let (schedule, version) = self.conflicts.load_schedule(request.coach).await?;
            let events = ScheduleReducer::decide(
                &schedule,
                &ScheduleAction::ReserveSlot {
                    booking_id,
                    coach_id: request.coach,
                    player_id: request.player,
                    slot,
                },
                self.clock.now(),
            )?;
            let wrapped: Vec<MarketEvent> =
                events.into_iter().map(MarketEvent::Schedule).collect();

            match self
                .emitter
                .append_and_publish(
                    &ConflictChecker::stream_id(request.coach),
                    version,
                    &wrapped,
                    self.clock.now(),
                )
                .await
            {
                Ok(_) => return Ok(()),
                Err(EventStoreError::ConcurrencyConflict { .. }) => {
                    tracing::debug!(
                        booking_id = %booking_id,
                        attempt,
                        "schedule stream moved, re-checking for conflicts"
                    );
                },
                Err(other) => return Err(other.into()),
            }
        }
        // The stream keeps moving under us; surface as a conflict rather
        // than looping
        Err(BookingError::Conflict {
            coach: request.coach,
        })
    }

    async fn apply_schedule_command(
        &self,
        coach_id: CoachId,
        command: &ScheduleAction,
    ) -> Result<(), BookingError> {
        for _attempt in 0..2 {
            let (schedule, version) = self.conflicts.load_schedule(coach_id).await?;
            let events = ScheduleReducer::decide(&schedule, command, self.clock.now())?;
            if events.is_empty() {
                return Ok(());
            }
            let wrapped: Vec<MarketEvent> =
                events.into_iter().map(MarketEvent::Schedule).collect();
            match self
                .emitter
                .append_and_publish(
                    &ConflictChecker::stream_id(coach_id),
                    version,
                    &wrapped,
                    self.clock.now(),
                )
                .await
            {
                Ok(_) => return Ok(()),
                Err(EventStoreError::ConcurrencyConflict { .. }) => {},
                Err(other) => return Err(other.into()),
            }
        }
        Err(BookingError::StaleState)
    }

    /// Best-effort hold release; failures are logged, never propagated,
    /// because the booking-side state change has already committed.
    async fn release_slot(&self, booking_id: BookingId, coach_id: CoachId) {
        let result = self
            .apply_schedule_command(coach_id, &ScheduleAction::ReleaseSlot { booking_id })
            .await;
        if let Err(error) = result {
            tracing::error!(
                booking_id = %booking_id,
                coach_id = %coach_id,
                %error,
                "failed to release slot hold"
            );
        }
    }

    /// Compensation for a failed creation saga: cancel the pending booking
    /// and free the slot.
    async fn rollback_pending(&self, booking_id: BookingId, coach_id: CoachId, reason: &str) {
        let cancelled = self
            .apply_booking_command(
                booking_id,
                &BookingAction::CancelBooking {
                    booking_id,
                    actor: Actor::Platform,
                    reason: reason.to_string(),
                },
            )
            .await;
        if let Err(error) = cancelled {
            tracing::error!(booking_id = %booking_id, %error, "failed to cancel pending booking");
        }
        self.release_slot(booking_id, coach_id).await;
    }

    async fn project(&self, events: &[BookingAction]) {
        let mut projection = self.projection.write().await;
        for event in events {
            let market_event = MarketEvent::Booking(event.clone());
            if let Err(error) = projection.handle_event(&market_event) {
                tracing::error!(%error, "booking history projection failed to apply event");
            }
        }
    }
}

//! Payment coordinator: escrow orchestration against the external provider.
//!
//! Drives authorize → capture / refund for one booking's payment intent,
//! keeping the intent's event stream as the system of record. Provider
//! calls are the failure-prone edge of the system, so every one runs under
//! a timeout, bounded retry with exponential backoff (transient failures
//! only), and a circuit breaker:
//!
//! - a hung provider yields [`BookingError::ProviderTimeout`], never a hung
//!   booking request
//! - a decline is permanent: recorded on the intent and surfaced as
//!   [`BookingError::PaymentDeclined`]
//! - capture and refund are idempotent; a retry after a timeout returns the
//!   existing terminal state without charging twice
//!
//! No lock is held across a provider call: state is re-read and appended
//! with an expected version afterwards.

use crate::aggregates::payment::{PaymentAction, PaymentReducer};
use crate::error::BookingError;
use crate::outbox::EventEmitter;
use crate::projections::MarketEvent;
use crate::provider::{CaptureMode, PaymentProvider, ProviderError};
use crate::types::{
    BookingId, Currency, Money, PaymentIntent, PaymentIntentId, PaymentIntentStatus, PaymentState,
    ProviderRef, RefundResult,
};
use courtside_core::environment::Clock;
use courtside_core::event_store::EventStore;
use courtside_core::stream::{StreamId, Version};
use courtside_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use courtside_runtime::retry::{RetryPolicy, retry_with_predicate};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Tuning for provider calls.
#[derive(Clone, Debug)]
pub struct PaymentSettings {
    /// Per-attempt timeout on a provider call
    pub call_timeout: Duration,
    /// Retry policy for transient failures (bounded attempts)
    pub retry: RetryPolicy,
    /// Circuit breaker configuration
    pub breaker: CircuitBreakerConfig,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

type ProviderCall<T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send>>;

/// Orchestrates the escrow lifecycle against the payment provider.
#[derive(Clone)]
pub struct PaymentCoordinator {
    store: Arc<dyn EventStore>,
    emitter: EventEmitter,
    provider: Arc<dyn PaymentProvider>,
    breaker: CircuitBreaker,
    settings: PaymentSettings,
    clock: Arc<dyn Clock>,
}

impl PaymentCoordinator {
    /// Creates a new coordinator.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        emitter: EventEmitter,
        provider: Arc<dyn PaymentProvider>,
        clock: Arc<dyn Clock>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            store,
            emitter,
            provider,
            breaker: CircuitBreaker::new(settings.breaker.clone()),
            settings,
            clock,
        }
    }

    /// Stream id of a payment intent's event stream.
    #[must_use]
    pub fn stream_id(intent_id: PaymentIntentId) -> StreamId {
        StreamId::new(format!("payment-{intent_id}"))
    }

    /// Authorize (hold) funds for a booking.
    ///
    /// Opens an intent in `requires_action`, creates and confirms a
    /// manual-capture intent at the provider, and records `authorized` only
    /// after provider confirmation succeeds - never optimistically.
    ///
    /// # Errors
    ///
    /// - [`BookingError::PaymentDeclined`] on a permanent decline (the
    ///   intent is marked failed; the caller rolls the booking back)
    /// - [`BookingError::ProviderTimeout`] /
    ///   [`BookingError::ProviderUnavailable`] when retries exhaust
    /// - [`BookingError::Validation`] for a zero amount
    pub async fn authorize(
        &self,
        booking_id: BookingId,
        amount: Money,
        currency: Currency,
    ) -> Result<PaymentIntent, BookingError> {
        let intent_id = PaymentIntentId::new();
        let stream = Self::stream_id(intent_id);
        let now = self.clock.now();

        let mut state = PaymentState::new();
        let opened = PaymentReducer::decide(
            &state,
            &PaymentAction::RequestAuthorization {
                intent_id,
                booking_id,
                amount,
                currency,
            },
            now,
        )?;
        let version = self
            .record(&stream, Version::initial(), &mut state, opened)
            .await?;

        tracing::info!(
            booking_id = %booking_id,
            intent_id = %intent_id,
            amount = amount.cents(),
            currency = %currency,
            "requesting payment authorization"
        );

        let provider = Arc::clone(&self.provider);
        let created = self
            .guarded_call("create_intent", move || {
                let provider = Arc::clone(&provider);
                Box::pin(async move {
                    provider
                        .create_intent(amount, currency, CaptureMode::Manual)
                        .await
                }) as ProviderCall<ProviderRef>
            })
            .await;

        let provider_ref = match created {
            Ok(reference) => reference,
            Err(error) => {
                self.record_failure(&stream, version, &mut state, intent_id, booking_id, &error)
                    .await;
                return Err(error);
            },
        };

        let provider = Arc::clone(&self.provider);
        let reference = provider_ref.clone();
        let confirmed = self
            .guarded_call("confirm", move || {
                let provider = Arc::clone(&provider);
                let reference = reference.clone();
                Box::pin(async move { provider.confirm(&reference).await }) as ProviderCall<()>
            })
            .await;

        if let Err(error) = confirmed {
            metrics::counter!("payments_declined_total").increment(1);
            self.record_failure(&stream, version, &mut state, intent_id, booking_id, &error)
                .await;
            return Err(error);
        }

        let authorized = PaymentReducer::decide(
            &state,
            &PaymentAction::ConfirmAuthorization {
                intent_id,
                provider_ref: provider_ref.clone(),
            },
            self.clock.now(),
        )?;
        if let Err(error) = self.record(&stream, version, &mut state, authorized).await {
            // The hold exists at the provider but could not be recorded;
            // release it so no funds stay orphaned
            if let Err(void_error) = self.provider.void(&provider_ref).await {
                tracing::error!(
                    intent_id = %intent_id,
                    provider_ref = %provider_ref,
                    %void_error,
                    "failed to release unrecorded hold"
                );
            }
            return Err(error);
        }

        metrics::counter!("payments_authorized_total").increment(1);
        self.intent_from(&state, intent_id)
    }

    /// Capture previously authorized funds (session start).
    ///
    /// Idempotent: capturing an already-captured intent returns the
    /// existing result without a second provider charge.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidTransition`] when the intent is not
    ///   authorized
    /// - [`BookingError::NotFound`] for an unknown intent
    /// - provider failures as in [`Self::authorize`]
    pub async fn capture(&self, intent_id: PaymentIntentId) -> Result<PaymentIntent, BookingError> {
        let stream = Self::stream_id(intent_id);
        let (mut state, version) = self.load(intent_id).await?;
        let intent = self.intent_from(&state, intent_id)?;

        if matches!(intent.status, PaymentIntentStatus::Captured) {
            tracing::debug!(intent_id = %intent_id, "capture retry on captured intent, no-op");
            return Ok(intent);
        }

        // Validates the authorized -> captured transition before any
        // provider traffic
        let events = PaymentReducer::decide(
            &state,
            &PaymentAction::CapturePayment { intent_id },
            self.clock.now(),
        )?;

        let provider_ref = Self::provider_ref_of(&intent)?;
        let provider = Arc::clone(&self.provider);
        let reference = provider_ref.clone();
        self.guarded_call("capture", move || {
            let provider = Arc::clone(&provider);
            let reference = reference.clone();
            Box::pin(async move { provider.capture(&reference).await }) as ProviderCall<()>
        })
        .await?;

        match self.record(&stream, version, &mut state, events).await {
            Ok(_) => {},
            // A concurrent caller recorded the capture first; the provider
            // call is idempotent, so converge on the stored state
            Err(BookingError::StaleState) => {
                let (reloaded, _) = self.load(intent_id).await?;
                let intent = self.intent_from(&reloaded, intent_id)?;
                if matches!(intent.status, PaymentIntentStatus::Captured) {
                    return Ok(intent);
                }
                return Err(BookingError::StaleState);
            },
            Err(other) => return Err(other),
        }

        metrics::counter!("payments_captured_total").increment(1);
        tracing::info!(intent_id = %intent_id, provider_ref = %provider_ref, "payment captured");
        self.intent_from(&state, intent_id)
    }

    /// Refund captured funds.
    ///
    /// `amount` defaults to the full captured amount; a partial refund is
    /// terminal (no partial-then-partial). Idempotent: refunding a refunded
    /// intent returns the recorded result.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidTransition`] when the intent is not
    ///   captured
    /// - [`BookingError::Validation`] when the amount exceeds the capture
    /// - provider failures as in [`Self::authorize`]
    pub async fn refund(
        &self,
        intent_id: PaymentIntentId,
        amount: Option<Money>,
        reason: &str,
    ) -> Result<RefundResult, BookingError> {
        let stream = Self::stream_id(intent_id);
        let (mut state, version) = self.load(intent_id).await?;
        let intent = self.intent_from(&state, intent_id)?;

        if let PaymentIntentStatus::Refunded { amount: refunded } = &intent.status {
            let provider_ref = intent
                .refund_ref
                .clone()
                .or_else(|| intent.provider_ref.clone())
                .unwrap_or_else(|| ProviderRef::new("released"));
            return Ok(RefundResult {
                intent: intent_id,
                amount: *refunded,
                provider_ref,
                full: *refunded == intent.amount,
            });
        }

        if !matches!(intent.status, PaymentIntentStatus::Captured) {
            return Err(BookingError::InvalidTransition {
                from: intent.status.to_string(),
                to: "refunded".to_string(),
            });
        }

        let refund_amount = amount.unwrap_or(intent.amount);
        if refund_amount > intent.amount {
            return Err(BookingError::Validation(format!(
                "refund of {refund_amount} exceeds captured amount {}",
                intent.amount
            )));
        }

        let provider_ref = Self::provider_ref_of(&intent)?;
        let provider = Arc::clone(&self.provider);
        let reference = provider_ref.clone();
        let refund_ref = self
            .guarded_call("refund", move || {
                let provider = Arc::clone(&provider);
                let reference = reference.clone();
                Box::pin(async move { provider.refund(&reference, refund_amount).await })
                    as ProviderCall<ProviderRef>
            })
            .await?;

        let events = PaymentReducer::decide(
            &state,
            &PaymentAction::RefundPayment {
                intent_id,
                amount: Some(refund_amount),
                reason: reason.to_string(),
                refund_ref: refund_ref.clone(),
            },
            self.clock.now(),
        )?;
        self.record(&stream, version, &mut state, events).await?;

        metrics::counter!("payments_refunded_total").increment(1);
        tracing::info!(
            intent_id = %intent_id,
            refund_ref = %refund_ref,
            amount = refund_amount.cents(),
            "payment refunded"
        );

        Ok(RefundResult {
            intent: intent_id,
            amount: refund_amount,
            provider_ref: refund_ref,
            full: refund_amount == intent.amount,
        })
    }

    /// Release an authorization that will never be captured.
    ///
    /// The compensation path for a booking rolled back after authorization:
    /// the hold is voided at the provider so no funds stay orphaned.
    /// Idempotent on already-released or failed intents.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidTransition`] when funds were already
    ///   captured (refund instead)
    /// - provider failures as in [`Self::authorize`]
    pub async fn void_authorization(
        &self,
        intent_id: PaymentIntentId,
    ) -> Result<(), BookingError> {
        let stream = Self::stream_id(intent_id);
        let (mut state, version) = self.load(intent_id).await?;
        let intent = self.intent_from(&state, intent_id)?;

        match intent.status {
            PaymentIntentStatus::Authorized => {},
            PaymentIntentStatus::Refunded { .. } | PaymentIntentStatus::Failed { .. } => {
                return Ok(());
            },
            // Confirmation never succeeded; nothing is held at the provider
            PaymentIntentStatus::RequiresAction => {
                let events = PaymentReducer::decide(
                    &state,
                    &PaymentAction::FailPayment {
                        intent_id,
                        reason: "authorization abandoned before confirmation".to_string(),
                    },
                    self.clock.now(),
                )?;
                self.record(&stream, version, &mut state, events).await?;
                return Ok(());
            },
            PaymentIntentStatus::Captured => {
                return Err(BookingError::InvalidTransition {
                    from: intent.status.to_string(),
                    to: "refunded".to_string(),
                });
            },
        }

        let provider_ref = Self::provider_ref_of(&intent)?;
        let provider = Arc::clone(&self.provider);
        let reference = provider_ref.clone();
        self.guarded_call("void", move || {
            let provider = Arc::clone(&provider);
            let reference = reference.clone();
            Box::pin(async move { provider.void(&reference).await }) as ProviderCall<()>
        })
        .await?;

        let events = PaymentReducer::decide(
            &state,
            &PaymentAction::VoidAuthorization { intent_id },
            self.clock.now(),
        )?;
        self.record(&stream, version, &mut state, events).await?;

        tracing::info!(intent_id = %intent_id, "authorization released");
        Ok(())
    }

    /// Current state of an intent.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::NotFound`] for an unknown intent.
    pub async fn get_intent(
        &self,
        intent_id: PaymentIntentId,
    ) -> Result<PaymentIntent, BookingError> {
        let (state, _) = self.load(intent_id).await?;
        self.intent_from(&state, intent_id)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn load(
        &self,
        intent_id: PaymentIntentId,
    ) -> Result<(PaymentState, Version), BookingError> {
        let stream = Self::stream_id(intent_id);
        let events = self.store.load_events(stream, None).await?;
        let version = Version::new(events.len() as u64);

        let mut state = PaymentState::new();
        for stored in &events {
            if let MarketEvent::Payment(action) = MarketEvent::decode(stored)? {
                PaymentReducer::apply_event(&mut state, &action);
            }
        }
        Ok((state, version))
    }

    fn intent_from(
        &self,
        state: &PaymentState,
        intent_id: PaymentIntentId,
    ) -> Result<PaymentIntent, BookingError> {
        state
            .get(&intent_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound {
                entity: "payment intent",
                id: intent_id.to_string(),
            })
    }

    fn provider_ref_of(intent: &PaymentIntent) -> Result<ProviderRef, BookingError> {
        intent.provider_ref.clone().ok_or_else(|| {
            BookingError::Storage(format!(
                "intent {} has no provider reference",
                intent.id
            ))
        })
    }

    /// Append events, apply them to the local state, publish.
    async fn record(
        &self,
        stream: &StreamId,
        expected: Version,
        state: &mut PaymentState,
        events: Vec<PaymentAction>,
    ) -> Result<Version, BookingError> {
        if events.is_empty() {
            return Ok(expected);
        }
        for event in &events {
            PaymentReducer::apply_event(state, event);
        }
        let wrapped: Vec<MarketEvent> = events.into_iter().map(MarketEvent::Payment).collect();
        self.emitter
            .append_and_publish(stream, expected, &wrapped, self.clock.now())
            .await
            .map_err(BookingError::from)
    }

    /// Record a permanent provider failure on the intent; never masks the
    /// original error.
    async fn record_failure(
        &self,
        stream: &StreamId,
        expected: Version,
        state: &mut PaymentState,
        intent_id: PaymentIntentId,
        booking_id: BookingId,
        error: &BookingError,
    ) {
        tracing::error!(
            booking_id = %booking_id,
            intent_id = %intent_id,
            %error,
            "payment authorization failed"
        );
        let failed = PaymentReducer::decide(
            state,
            &PaymentAction::FailPayment {
                intent_id,
                reason: error.to_string(),
            },
            self.clock.now(),
        );
        match failed {
            Ok(events) => {
                if let Err(record_error) = self.record(stream, expected, state, events).await {
                    tracing::error!(intent_id = %intent_id, %record_error, "failed to record payment failure");
                }
            },
            Err(decide_error) => {
                tracing::error!(intent_id = %intent_id, %decide_error, "failed to record payment failure");
            },
        }
    }

    /// Run one provider operation under timeout, bounded retry (transient
    /// failures only), and the circuit breaker.
    async fn guarded_call<T, F>(&self, operation: &'static str, make_call: F) -> Result<T, BookingError>
    where
        F: Fn() -> ProviderCall<T> + Send + Sync,
    {
        let call_timeout = self.settings.call_timeout;
        let result = self
            .breaker
            .call(|| {
                retry_with_predicate(
                    self.settings.retry.clone(),
                    || async {
                        match tokio::time::timeout(call_timeout, make_call()).await {
                            Ok(outcome) => outcome,
                            Err(_elapsed) => Err(ProviderError::Timeout),
                        }
                    },
                    ProviderError::is_transient,
                )
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::Open) => {
                tracing::warn!(operation, "provider circuit open, failing fast");
                Err(BookingError::ProviderUnavailable {
                    reason: "provider circuit breaker open".to_string(),
                })
            },
            Err(CircuitBreakerError::Inner(error)) => {
                tracing::warn!(operation, %error, "provider call failed");
                Err(match error {
                    ProviderError::Declined { reason } => BookingError::PaymentDeclined { reason },
                    ProviderError::InvalidRequest { reason } => {
                        BookingError::PaymentDeclined { reason }
                    },
                    ProviderError::Timeout => BookingError::ProviderTimeout,
                    ProviderError::Transport { message } => {
                        BookingError::ProviderUnavailable { reason: message }
                    },
                })
            },
        }
    }
}

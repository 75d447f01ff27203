//! Payment aggregate: the escrow lifecycle for one booking's payment.
//!
//! ```text
//! RequiresAction ──provider confirm──► Authorized ──capture──► Captured
//!       │                                  │                      │
//!       │ decline                          │ void (rollback)      │ refund
//!       ▼                                  ▼                      ▼
//!    Failed                            Refunded(0)          Refunded(amount)
//! ```
//!
//! Invariants: capture only from `Authorized`; refund only from `Captured`;
//! capture and refund are idempotent (a repeat on a terminal state produces
//! no new events, so retries after a timeout are safe). The aggregate
//! records facts; talking to the external provider is the coordinator's
//! job.

use crate::error::BookingError;
use crate::types::{
    BookingId, Currency, Money, PaymentIntent, PaymentIntentId, PaymentIntentStatus, PaymentState,
    ProviderRef,
};
use chrono::{DateTime, Utc};
use courtside_core::environment::Clock;
use courtside_core::{SmallVec, effect::Effect, reducer::Reducer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the payment aggregate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PaymentAction {
    // Commands
    /// Open a new intent in `RequiresAction`
    RequestAuthorization {
        /// New intent id
        intent_id: PaymentIntentId,
        /// Booking being paid for
        booking_id: BookingId,
        /// Amount to hold
        amount: Money,
        /// Settlement currency
        currency: Currency,
    },

    /// Record provider confirmation of the hold
    ConfirmAuthorization {
        /// Intent that was confirmed
        intent_id: PaymentIntentId,
        /// Provider correlation id
        provider_ref: ProviderRef,
    },

    /// Capture the held funds (session start)
    CapturePayment {
        /// Intent to capture
        intent_id: PaymentIntentId,
    },

    /// Refund captured funds (qualifying cancellation)
    RefundPayment {
        /// Intent to refund
        intent_id: PaymentIntentId,
        /// Amount to refund; `None` means the full captured amount
        amount: Option<Money>,
        /// Refund reason
        reason: String,
        /// Provider reference of the refund
        refund_ref: ProviderRef,
    },

    /// Release an authorization that will never be captured (rollback)
    VoidAuthorization {
        /// Intent to void
        intent_id: PaymentIntentId,
    },

    /// Record a permanent provider failure
    FailPayment {
        /// Intent that failed
        intent_id: PaymentIntentId,
        /// Failure reason
        reason: String,
    },

    // Events
    /// Intent opened, awaiting provider confirmation
    AuthorizationRequested {
        /// Intent id
        intent_id: PaymentIntentId,
        /// Booking being paid for
        booking_id: BookingId,
        /// Amount to hold
        amount: Money,
        /// Settlement currency
        currency: Currency,
        /// When requested
        requested_at: DateTime<Utc>,
    },

    /// Funds held by the provider
    PaymentAuthorized {
        /// Intent id
        intent_id: PaymentIntentId,
        /// Provider correlation id
        provider_ref: ProviderRef,
        /// When authorized
        authorized_at: DateTime<Utc>,
    },

    /// Funds transferred
    PaymentCaptured {
        /// Intent id
        intent_id: PaymentIntentId,
        /// When captured
        captured_at: DateTime<Utc>,
    },

    /// Funds returned after capture
    PaymentRefunded {
        /// Intent id
        intent_id: PaymentIntentId,
        /// Refunded amount
        amount: Money,
        /// Refund reason
        reason: String,
        /// Provider reference of the refund
        refund_ref: ProviderRef,
        /// When refunded
        refunded_at: DateTime<Utc>,
    },

    /// Authorization released without capture
    AuthorizationVoided {
        /// Intent id
        intent_id: PaymentIntentId,
        /// When voided
        voided_at: DateTime<Utc>,
    },

    /// Permanent provider failure
    PaymentFailed {
        /// Intent id
        intent_id: PaymentIntentId,
        /// Failure reason
        reason: String,
        /// When it failed
        failed_at: DateTime<Utc>,
    },
}

impl PaymentAction {
    /// Whether this action is a command (a request, not a fact).
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::RequestAuthorization { .. }
                | Self::ConfirmAuthorization { .. }
                | Self::CapturePayment { .. }
                | Self::RefundPayment { .. }
                | Self::VoidAuthorization { .. }
                | Self::FailPayment { .. }
        )
    }

    /// Stable event type identifier for persisted events.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::AuthorizationRequested { .. } => "AuthorizationRequested.v1",
            Self::PaymentAuthorized { .. } => "PaymentAuthorized.v1",
            Self::PaymentCaptured { .. } => "PaymentCaptured.v1",
            Self::PaymentRefunded { .. } => "PaymentRefunded.v1",
            Self::AuthorizationVoided { .. } => "AuthorizationVoided.v1",
            Self::PaymentFailed { .. } => "PaymentFailed.v1",
            _ => "unknown",
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the payment aggregate.
#[derive(Clone)]
pub struct PaymentEnvironment {
    /// Clock for lifecycle timestamps
    pub clock: Arc<dyn Clock>,
}

impl PaymentEnvironment {
    /// Creates a new `PaymentEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the payment escrow lifecycle.
#[derive(Clone, Debug, Default)]
pub struct PaymentReducer;

fn invalid(from: &PaymentIntentStatus, to: &str) -> BookingError {
    BookingError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

impl PaymentReducer {
    /// Creates a new `PaymentReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decide which events a command produces, or reject it.
    ///
    /// Idempotency: capturing a captured intent and refunding a refunded
    /// intent return `Ok` with no events, so a caller retrying after a
    /// timeout observes the existing terminal state instead of an error.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] for malformed input (refund exceeding
    ///   the captured amount, duplicate intent)
    /// - [`BookingError::InvalidTransition`] for out-of-order lifecycle
    ///   steps (capture before authorization, refund before capture)
    /// - [`BookingError::NotFound`] for an unknown intent
    #[allow(clippy::too_many_lines)] // one arm per escrow transition
    pub fn decide(
        state: &PaymentState,
        command: &PaymentAction,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentAction>, BookingError> {
        match command {
            PaymentAction::RequestAuthorization {
                intent_id,
                booking_id,
                amount,
                currency,
            } => {
                if amount.is_zero() {
                    return Err(BookingError::Validation(
                        "payment amount must be positive".to_string(),
                    ));
                }
                if state.exists(intent_id) {
                    return Err(BookingError::Validation(format!(
                        "payment intent {intent_id} already exists"
                    )));
                }
                Ok(vec![PaymentAction::AuthorizationRequested {
                    intent_id: *intent_id,
                    booking_id: *booking_id,
                    amount: *amount,
                    currency: *currency,
                    requested_at: now,
                }])
            },

            PaymentAction::ConfirmAuthorization {
                intent_id,
                provider_ref,
            } => {
                let intent = Self::lookup(state, intent_id)?;
                match &intent.status {
                    PaymentIntentStatus::RequiresAction => {
                        Ok(vec![PaymentAction::PaymentAuthorized {
                            intent_id: *intent_id,
                            provider_ref: provider_ref.clone(),
                            authorized_at: now,
                        }])
                    },
                    from => Err(invalid(from, "authorized")),
                }
            },

            PaymentAction::CapturePayment { intent_id } => {
                let intent = Self::lookup(state, intent_id)?;
                match &intent.status {
                    PaymentIntentStatus::Authorized => Ok(vec![PaymentAction::PaymentCaptured {
                        intent_id: *intent_id,
                        captured_at: now,
                    }]),
                    // Already captured: idempotent, nothing new happened
                    PaymentIntentStatus::Captured => Ok(Vec::new()),
                    from => Err(invalid(from, "captured")),
                }
            },

            PaymentAction::RefundPayment {
                intent_id,
                amount,
                reason,
                refund_ref,
            } => {
                let intent = Self::lookup(state, intent_id)?;
                match &intent.status {
                    PaymentIntentStatus::Captured => {
                        let refund_amount = amount.unwrap_or(intent.amount);
                        if refund_amount > intent.amount {
                            return Err(BookingError::Validation(format!(
                                "refund of {refund_amount} exceeds captured amount {}",
                                intent.amount
                            )));
                        }
                        Ok(vec![PaymentAction::PaymentRefunded {
                            intent_id: *intent_id,
                            amount: refund_amount,
                            reason: reason.clone(),
                            refund_ref: refund_ref.clone(),
                            refunded_at: now,
                        }])
                    },
                    // Single terminal refund: a repeat is idempotent
                    PaymentIntentStatus::Refunded { .. } => Ok(Vec::new()),
                    from => Err(invalid(from, "refunded")),
                }
            },

            PaymentAction::VoidAuthorization { intent_id } => {
                let intent = Self::lookup(state, intent_id)?;
                match &intent.status {
                    PaymentIntentStatus::Authorized => {
                        Ok(vec![PaymentAction::AuthorizationVoided {
                            intent_id: *intent_id,
                            voided_at: now,
                        }])
                    },
                    // Already released or failed: nothing held anymore
                    PaymentIntentStatus::Refunded { .. } | PaymentIntentStatus::Failed { .. } => {
                        Ok(Vec::new())
                    },
                    from => Err(invalid(from, "refunded")),
                }
            },

            PaymentAction::FailPayment { intent_id, reason } => {
                let intent = Self::lookup(state, intent_id)?;
                match &intent.status {
                    PaymentIntentStatus::RequiresAction | PaymentIntentStatus::Authorized => {
                        Ok(vec![PaymentAction::PaymentFailed {
                            intent_id: *intent_id,
                            reason: reason.clone(),
                            failed_at: now,
                        }])
                    },
                    // Terminal states stay as they are
                    _ => Ok(Vec::new()),
                }
            },

            event => Err(BookingError::Validation(format!(
                "{} is not a command",
                event.event_type()
            ))),
        }
    }

    fn lookup<'a>(
        state: &'a PaymentState,
        intent_id: &PaymentIntentId,
    ) -> Result<&'a PaymentIntent, BookingError> {
        state.get(intent_id).ok_or_else(|| BookingError::NotFound {
            entity: "payment intent",
            id: intent_id.to_string(),
        })
    }

    /// Applies an event to state.
    pub fn apply_event(state: &mut PaymentState, action: &PaymentAction) {
        match action {
            PaymentAction::AuthorizationRequested {
                intent_id,
                booking_id,
                amount,
                currency,
                requested_at,
            } => {
                state.intents.insert(
                    *intent_id,
                    PaymentIntent::new(*intent_id, *booking_id, *amount, *currency, *requested_at),
                );
                state.last_error = None;
            },

            PaymentAction::PaymentAuthorized {
                intent_id,
                provider_ref,
                ..
            } => {
                if let Some(intent) = state.intents.get_mut(intent_id) {
                    intent.status = PaymentIntentStatus::Authorized;
                    intent.provider_ref = Some(provider_ref.clone());
                }
                state.last_error = None;
            },

            PaymentAction::PaymentCaptured { intent_id, .. } => {
                if let Some(intent) = state.intents.get_mut(intent_id) {
                    intent.status = PaymentIntentStatus::Captured;
                }
                state.last_error = None;
            },

            PaymentAction::PaymentRefunded {
                intent_id,
                amount,
                refund_ref,
                ..
            } => {
                if let Some(intent) = state.intents.get_mut(intent_id) {
                    intent.status = PaymentIntentStatus::Refunded { amount: *amount };
                    intent.refund_ref = Some(refund_ref.clone());
                }
                state.last_error = None;
            },

            // A released hold never moved money: refunded amount zero
            PaymentAction::AuthorizationVoided { intent_id, .. } => {
                if let Some(intent) = state.intents.get_mut(intent_id) {
                    intent.status = PaymentIntentStatus::Refunded {
                        amount: Money::from_cents(0),
                    };
                }
                state.last_error = None;
            },

            PaymentAction::PaymentFailed {
                intent_id, reason, ..
            } => {
                if let Some(intent) = state.intents.get_mut(intent_id) {
                    intent.status = PaymentIntentStatus::Failed {
                        reason: reason.clone(),
                    };
                }
                state.last_error = Some(reason.clone());
            },

            // Commands don't modify state
            PaymentAction::RequestAuthorization { .. }
            | PaymentAction::ConfirmAuthorization { .. }
            | PaymentAction::CapturePayment { .. }
            | PaymentAction::RefundPayment { .. }
            | PaymentAction::VoidAuthorization { .. }
            | PaymentAction::FailPayment { .. } => {},
        }
    }
}

impl Reducer for PaymentReducer {
    type State = PaymentState;
    type Action = PaymentAction;
    type Environment = PaymentEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if action.is_command() {
            match Self::decide(state, &action, env.clock.now()) {
                Ok(events) => {
                    for event in &events {
                        Self::apply_event(state, event);
                    }
                },
                Err(error) => {
                    state.last_error = Some(error.to_string());
                },
            }
        } else {
            Self::apply_event(state, &action);
        }
        SmallVec::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courtside_testing::{FixedClock, ReducerTest, assertions};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap()
    }

    fn state_with(intent_id: PaymentIntentId, status: PaymentIntentStatus) -> PaymentState {
        let mut state = PaymentState::new();
        let mut intent = PaymentIntent::new(
            intent_id,
            BookingId::new(),
            Money::from_dollars(50),
            Currency::Usd,
            now(),
        );
        if !matches!(status, PaymentIntentStatus::RequiresAction) {
            intent.provider_ref = Some(ProviderRef::new("pi_test"));
        }
        intent.status = status;
        state.intents.insert(intent_id, intent);
        state
    }

    fn decide(
        state: &PaymentState,
        command: &PaymentAction,
    ) -> Result<Vec<PaymentAction>, BookingError> {
        PaymentReducer::decide(state, command, now())
    }

    #[test]
    fn authorization_flow_reaches_authorized() {
        let intent_id = PaymentIntentId::new();

        ReducerTest::new(PaymentReducer::new())
            .with_env(PaymentEnvironment::new(Arc::new(FixedClock::new(now()))))
            .given_state(state_with(intent_id, PaymentIntentStatus::RequiresAction))
            .when_action(PaymentAction::ConfirmAuthorization {
                intent_id,
                provider_ref: ProviderRef::new("pi_abc"),
            })
            .then_state(move |state| {
                let intent = state.get(&intent_id).unwrap();
                assert_eq!(intent.status, PaymentIntentStatus::Authorized);
                assert_eq!(intent.provider_ref, Some(ProviderRef::new("pi_abc")));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn zero_amount_authorization_is_rejected() {
        let result = decide(
            &PaymentState::new(),
            &PaymentAction::RequestAuthorization {
                intent_id: PaymentIntentId::new(),
                booking_id: BookingId::new(),
                amount: Money::from_cents(0),
                currency: Currency::Usd,
            },
        );
        assert!(matches!(result, Err(BookingError::Validation(_))));
    }

    #[test]
    fn capture_requires_authorized() {
        let intent_id = PaymentIntentId::new();
        let state = state_with(intent_id, PaymentIntentStatus::RequiresAction);

        let result = decide(&state, &PaymentAction::CapturePayment { intent_id });
        assert!(matches!(result, Err(BookingError::InvalidTransition { .. })));
    }

    #[test]
    fn capture_from_authorized_emits_captured() {
        let intent_id = PaymentIntentId::new();
        let state = state_with(intent_id, PaymentIntentStatus::Authorized);

        let events = decide(&state, &PaymentAction::CapturePayment { intent_id }).unwrap();
        assert!(matches!(
            events.as_slice(),
            [PaymentAction::PaymentCaptured { .. }]
        ));
    }

    #[test]
    fn repeated_capture_is_idempotent() {
        let intent_id = PaymentIntentId::new();
        let state = state_with(intent_id, PaymentIntentStatus::Captured);

        let events = decide(&state, &PaymentAction::CapturePayment { intent_id }).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn refund_requires_captured() {
        let intent_id = PaymentIntentId::new();
        let state = state_with(intent_id, PaymentIntentStatus::Authorized);

        let result = decide(
            &state,
            &PaymentAction::RefundPayment {
                intent_id,
                amount: None,
                reason: "cancelled".to_string(),
                refund_ref: ProviderRef::new("re_1"),
            },
        );
        assert!(matches!(result, Err(BookingError::InvalidTransition { .. })));
    }

    #[test]
    fn refund_defaults_to_full_amount() {
        let intent_id = PaymentIntentId::new();
        let state = state_with(intent_id, PaymentIntentStatus::Captured);

        let events = decide(
            &state,
            &PaymentAction::RefundPayment {
                intent_id,
                amount: None,
                reason: "cancelled".to_string(),
                refund_ref: ProviderRef::new("re_1"),
            },
        )
        .unwrap();

        assert!(matches!(
            events.as_slice(),
            [PaymentAction::PaymentRefunded { amount, .. }] if *amount == Money::from_dollars(50)
        ));
    }

    #[test]
    fn refund_cannot_exceed_captured_amount() {
        let intent_id = PaymentIntentId::new();
        let state = state_with(intent_id, PaymentIntentStatus::Captured);

        let result = decide(
            &state,
            &PaymentAction::RefundPayment {
                intent_id,
                amount: Some(Money::from_dollars(60)),
                reason: "cancelled".to_string(),
                refund_ref: ProviderRef::new("re_1"),
            },
        );
        assert!(matches!(result, Err(BookingError::Validation(_))));
    }

    #[test]
    fn second_refund_is_idempotent() {
        let intent_id = PaymentIntentId::new();
        let state = state_with(
            intent_id,
            PaymentIntentStatus::Refunded {
                amount: Money::from_dollars(50),
            },
        );

        let events = decide(
            &state,
            &PaymentAction::RefundPayment {
                intent_id,
                amount: None,
                reason: "again".to_string(),
                refund_ref: ProviderRef::new("re_2"),
            },
        )
        .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn void_releases_an_authorized_hold() {
        let intent_id = PaymentIntentId::new();
        let mut state = state_with(intent_id, PaymentIntentStatus::Authorized);

        let events = decide(&state, &PaymentAction::VoidAuthorization { intent_id }).unwrap();
        for event in &events {
            PaymentReducer::apply_event(&mut state, event);
        }

        assert!(matches!(
            state.get(&intent_id).unwrap().status,
            PaymentIntentStatus::Refunded { amount } if amount.is_zero()
        ));
    }

    #[test]
    fn void_of_captured_funds_is_illegal() {
        let intent_id = PaymentIntentId::new();
        let state = state_with(intent_id, PaymentIntentStatus::Captured);

        let result = decide(&state, &PaymentAction::VoidAuthorization { intent_id });
        assert!(matches!(result, Err(BookingError::InvalidTransition { .. })));
    }

    #[test]
    fn decline_marks_intent_failed() {
        let intent_id = PaymentIntentId::new();
        let mut state = state_with(intent_id, PaymentIntentStatus::RequiresAction);

        let events = decide(
            &state,
            &PaymentAction::FailPayment {
                intent_id,
                reason: "card declined".to_string(),
            },
        )
        .unwrap();
        for event in &events {
            PaymentReducer::apply_event(&mut state, event);
        }

        assert!(matches!(
            &state.get(&intent_id).unwrap().status,
            PaymentIntentStatus::Failed { reason } if reason.contains("declined")
        ));
    }
}

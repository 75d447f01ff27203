//! Payment provider boundary.
//!
//! Abstraction over external payment processors (Stripe, Adyen, ...). The
//! provider is the single most failure-prone dependency of the booking
//! core: every call can fail transiently (network) or permanently
//! (declined, invalid), so the error type distinguishes the two and the
//! coordinator wraps every call in timeout + retry + circuit breaker.
//!
//! All provider operations are idempotent by provider reference, so a
//! retried call after a timeout is safe.

use crate::types::{Currency, Money, ProviderRef};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

/// How the provider should settle an intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureMode {
    /// Hold funds on authorization; transfer only on an explicit capture
    /// (the escrow pattern this core uses)
    Manual,
    /// Transfer immediately on confirmation
    Automatic,
}

/// Errors from the payment provider.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The payment was declined (permanent)
    #[error("declined: {reason}")]
    Declined {
        /// Decline reason
        reason: String,
    },

    /// The request was malformed or the reference unknown (permanent)
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What was wrong
        reason: String,
    },

    /// The provider did not answer in time (transient)
    #[error("provider timed out")]
    Timeout,

    /// Network-level failure reaching the provider (transient)
    #[error("transport error: {message}")]
    Transport {
        /// Transport-level detail
        message: String,
    },
}

impl ProviderError {
    /// Whether a retry with backoff may succeed.
    ///
    /// Declines and invalid requests are permanent; timeouts and transport
    /// failures are worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport { .. })
    }
}

/// External payment provider interface.
///
/// Mirrors the manual-capture escrow surface: create an intent (funds not
/// yet held), confirm it (funds held), capture (funds transferred), refund
/// (funds returned), void (hold released without transfer).
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the coordinator can hold
/// the provider as `Arc<dyn PaymentProvider>`.
pub trait PaymentProvider: Send + Sync {
    /// Create a payment intent with the given capture mode.
    fn create_intent(
        &self,
        amount: Money,
        currency: Currency,
        mode: CaptureMode,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderRef, ProviderError>> + Send + '_>>;

    /// Confirm an intent: in manual capture mode this places the hold.
    fn confirm(
        &self,
        provider_ref: &ProviderRef,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProviderError>> + Send + '_>>;

    /// Capture previously held funds.
    fn capture(
        &self,
        provider_ref: &ProviderRef,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProviderError>> + Send + '_>>;

    /// Refund captured funds; returns the provider's refund reference.
    fn refund(
        &self,
        provider_ref: &ProviderRef,
        amount: Money,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderRef, ProviderError>> + Send + '_>>;

    /// Release a hold that will never be captured.
    fn void(
        &self,
        provider_ref: &ProviderRef,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProviderError>> + Send + '_>>;
}

/// Call counts recorded by [`MockPaymentProvider`].
///
/// Tests assert idempotency through these (e.g. capture reached the
/// provider exactly once).
#[derive(Debug, Default)]
pub struct ProviderCallCounts {
    /// `create_intent` calls
    pub create_intent: AtomicUsize,
    /// `confirm` calls
    pub confirm: AtomicUsize,
    /// `capture` calls
    pub capture: AtomicUsize,
    /// `refund` calls
    pub refund: AtomicUsize,
    /// `void` calls
    pub void: AtomicUsize,
}

/// Mock payment provider for development and tests.
///
/// Succeeds by default with a simulated network delay. Failures are
/// injected per operation as a queue: each call pops and returns the next
/// queued error, then the operation goes back to succeeding - which is
/// exactly the shape needed to exercise retry, decline, and timeout paths.
pub struct MockPaymentProvider {
    delay: Duration,
    confirm_failures: Mutex<VecDeque<ProviderError>>,
    capture_failures: Mutex<VecDeque<ProviderError>>,
    refund_failures: Mutex<VecDeque<ProviderError>>,
    /// Observed call counts
    pub calls: ProviderCallCounts,
}

impl Default for MockPaymentProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPaymentProvider {
    /// Creates a provider that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(5),
            confirm_failures: Mutex::new(VecDeque::new()),
            capture_failures: Mutex::new(VecDeque::new()),
            refund_failures: Mutex::new(VecDeque::new()),
            calls: ProviderCallCounts::default(),
        }
    }

    /// Queue errors for upcoming `confirm` calls.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn queue_confirm_failures(&self, errors: impl IntoIterator<Item = ProviderError>) {
        self.confirm_failures.lock().unwrap().extend(errors);
    }

    /// Queue errors for upcoming `capture` calls.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn queue_capture_failures(&self, errors: impl IntoIterator<Item = ProviderError>) {
        self.capture_failures.lock().unwrap().extend(errors);
    }

    /// Queue errors for upcoming `refund` calls.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn queue_refund_failures(&self, errors: impl IntoIterator<Item = ProviderError>) {
        self.refund_failures.lock().unwrap().extend(errors);
    }

    #[allow(clippy::unwrap_used)] // lock poisoning aborts the test anyway
    fn pop(queue: &Mutex<VecDeque<ProviderError>>) -> Option<ProviderError> {
        queue.lock().unwrap().pop_front()
    }
}

impl PaymentProvider for MockPaymentProvider {
    fn create_intent(
        &self,
        amount: Money,
        currency: Currency,
        mode: CaptureMode,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderRef, ProviderError>> + Send + '_>> {
        self.calls.create_intent.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            let reference = ProviderRef::new(format!("pi_{}", uuid::Uuid::new_v4().simple()));
            tracing::info!(
                provider_ref = %reference,
                amount = amount.cents(),
                currency = %currency,
                manual = matches!(mode, CaptureMode::Manual),
                "mock intent created"
            );
            Ok(reference)
        })
    }

    fn confirm(
        &self,
        provider_ref: &ProviderRef,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProviderError>> + Send + '_>> {
        self.calls.confirm.fetch_add(1, Ordering::SeqCst);
        let injected = Self::pop(&self.confirm_failures);
        let provider_ref = provider_ref.clone();
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            match injected {
                Some(error) => {
                    tracing::warn!(provider_ref = %provider_ref, %error, "mock confirm failed");
                    Err(error)
                },
                None => {
                    tracing::info!(provider_ref = %provider_ref, "mock hold confirmed");
                    Ok(())
                },
            }
        })
    }

    fn capture(
        &self,
        provider_ref: &ProviderRef,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProviderError>> + Send + '_>> {
        self.calls.capture.fetch_add(1, Ordering::SeqCst);
        let injected = Self::pop(&self.capture_failures);
        let provider_ref = provider_ref.clone();
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            match injected {
                Some(error) => Err(error),
                None => {
                    tracing::info!(provider_ref = %provider_ref, "mock funds captured");
                    Ok(())
                },
            }
        })
    }

    fn refund(
        &self,
        provider_ref: &ProviderRef,
        amount: Money,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderRef, ProviderError>> + Send + '_>> {
        self.calls.refund.fetch_add(1, Ordering::SeqCst);
        let injected = Self::pop(&self.refund_failures);
        let provider_ref = provider_ref.clone();
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            match injected {
                Some(error) => Err(error),
                None => {
                    let refund_ref =
                        ProviderRef::new(format!("re_{}", uuid::Uuid::new_v4().simple()));
                    tracing::info!(
                        provider_ref = %provider_ref,
                        refund_ref = %refund_ref,
                        amount = amount.cents(),
                        "mock refund issued"
                    );
                    Ok(refund_ref)
                },
            }
        })
    }

    fn void(
        &self,
        provider_ref: &ProviderRef,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProviderError>> + Send + '_>> {
        self.calls.void.fetch_add(1, Ordering::SeqCst);
        let provider_ref = provider_ref.clone();
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            tracing::info!(provider_ref = %provider_ref, "mock hold released");
            Ok(())
        })
    }
}

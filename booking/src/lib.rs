//! Courtside booking core - the session lifecycle heart of a coaching
//! marketplace.
//!
//! Players book time slots with coaches; the core reserves the slot,
//! detects double-booking, drives the booking through its lifecycle, and
//! coordinates escrow-style payment (authorize at booking, capture at
//! session start, refund on qualifying cancellation).
//!
//! # Architecture
//!
//! ```text
//! Write Side (Event Sourcing):
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │   Schedule   │  │   Booking    │  │   Payment    │
//! │ (per coach)  │  │ (per booking)│  │ (per intent) │
//! └──────────────┘  └──────────────┘  └──────────────┘
//!        │                 │                  │
//!        └─────────────────┴──────────────────┘
//!                          │
//!             Event store (version-checked appends)
//!                          │
//!                          ▼
//!                 ┌─────────────────┐
//!                 │    Event bus    │◄── at-least-once, dedupe by event id
//!                 └─────────────────┘
//!                          │
//!                          ▼
//! Read Side:       booking history projection (list queries, scheduler)
//! ```
//!
//! # Key Properties
//!
//! ## 1. Conflict-safe slot reservation
//!
//! All holds for one coach live on a single schedule stream. Two
//! concurrent requests for overlapping slots both pass the overlap check
//! against the same stream version; exactly one version-checked append
//! commits, and the loser re-reads into a conflict. Completed and
//! cancelled bookings release their holds and never block new requests.
//!
//! ## 2. Escrow payment tied to the lifecycle
//!
//! ```text
//! create ──► authorize (hold funds)
//! session start ──► capture (transfer funds, idempotent)
//! qualifying cancellation ──► refund (full ≥24h ahead, else partial)
//! rollback ──► void (release the hold)
//! ```
//!
//! Authorization failure rolls the booking back: the pending booking is
//! cancelled and the slot is immediately bookable again.
//!
//! ## 3. Optimistic concurrency everywhere
//!
//! Every mutating operation appends with an expected stream version.
//! Concurrent transitions against the same booking: exactly one wins, the
//! other sees a stale-state error and re-reads.

pub mod aggregates;
pub mod app;
pub mod bus;
pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod error;
pub mod outbox;
pub mod projections;
pub mod provider;
pub mod scheduler;
pub mod types;

pub use aggregates::{
    BookingAction, BookingReducer, CancellationPolicy, PaymentAction, PaymentReducer,
    ScheduleAction, ScheduleReducer,
};
pub use app::{BookingApp, BookingService, CreateBookingRequest, ServiceSettings};
pub use config::Config;
pub use conflict::ConflictChecker;
pub use coordinator::{PaymentCoordinator, PaymentSettings};
pub use error::BookingError;
pub use outbox::{EventEmitter, EventTopics, OutboxRelay};
pub use projections::{BookingHistoryProjection, MarketEvent, Projection};
pub use provider::{CaptureMode, MockPaymentProvider, PaymentProvider, ProviderError};
pub use scheduler::SessionScheduler;
pub use types::*;

//! Domain types for the Courtside booking core.
//!
//! Value objects, entities, and aggregate state types for slot reservation,
//! booking lifecycle, and payment escrow.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random id
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an id from a `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a booking
    BookingId
}

uuid_id! {
    /// Identity of a player (external, referenced by id only)
    PlayerId
}

uuid_id! {
    /// Identity of a coach (external, referenced by id only)
    CoachId
}

uuid_id! {
    /// Unique identifier for a payment intent
    PaymentIntentId
}

/// Opaque correlation id issued by the external payment provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderRef(String);

impl ProviderRef {
    /// Creates a new `ProviderRef`
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The reference as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money and Currency (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole dollars
    ///
    /// # Panics
    ///
    /// Panics if the conversion would overflow. Use `checked_from_dollars`
    /// for non-panicking conversion.
    #[must_use]
    #[allow(clippy::panic)]
    pub const fn from_dollars(dollars: u64) -> Self {
        match dollars.checked_mul(100) {
            Some(cents) => Self(cents),
            None => panic!("Money::from_dollars overflow"),
        }
    }

    /// Creates a `Money` value from dollars with overflow checking
    #[must_use]
    pub const fn checked_from_dollars(dollars: u64) -> Option<Self> {
        match dollars.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Returns the amount in whole dollars (rounded down)
    #[must_use]
    pub const fn dollars(&self) -> u64 {
        self.0 / 100
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Subtracts two money amounts (returns None if result would be negative)
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self(self.0 - other.0))
        } else {
            None
        }
    }

    /// Returns the given percentage of this amount (rounded down).
    ///
    /// Used for partial refunds.
    #[must_use]
    pub const fn percentage(self, percent: u32) -> Self {
        Self(self.0 * percent as u64 / 100)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.dollars(), self.0 % 100)
    }
}

/// Supported settlement currencies.
///
/// Immutable on a payment intent once authorized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    /// United States dollar
    Usd,
    /// Euro
    Eur,
    /// Pound sterling
    Gbp,
}

impl Currency {
    /// ISO 4217 currency code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Time slots
// ============================================================================

/// A half-open time interval `[start, start + duration)`.
///
/// All interval math is done on absolute instants; timezones are display
/// metadata only. Two slots where one ends exactly when the other begins do
/// NOT overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// Start instant (UTC)
    pub start: DateTime<Utc>,
    /// Duration in minutes (must be positive)
    pub duration_minutes: u32,
}

impl TimeSlot {
    /// Creates a new `TimeSlot`
    #[must_use]
    pub const fn new(start: DateTime<Utc>, duration_minutes: u32) -> Self {
        Self {
            start,
            duration_minutes,
        }
    }

    /// Exclusive end instant of the slot
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Half-open overlap test: `[a, b)` overlaps `[c, d)` iff `a < d && c < b`.
    ///
    /// Boundary-touching slots do not overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    /// Whether `other` lies entirely within this slot.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.start <= other.start && other.end() <= self.end()
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} +{}min)",
            self.start.format("%Y-%m-%d %H:%M UTC"),
            self.duration_minutes
        )
    }
}

/// A window during which a coach has declared themselves bookable.
///
/// Not authoritative for conflict detection - conflicts are detected against
/// other bookings, not availability gaps. A request outside declared
/// availability is a validation failure distinct from a double-booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    /// The bookable window
    pub window: TimeSlot,
    /// When the coach declared it
    pub declared_at: DateTime<Utc>,
}

// ============================================================================
// Actors and roles
// ============================================================================

/// Who is performing an operation against the booking core.
///
/// The core trusts ids passed in; authentication is an upstream concern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    /// The player on the booking
    Player(PlayerId),
    /// The coach on the booking
    Coach(CoachId),
    /// A marketplace administrator
    Admin,
    /// The platform itself (scheduler, payment rollback)
    Platform,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player(id) => write!(f, "player:{id}"),
            Self::Coach(id) => write!(f, "coach:{id}"),
            Self::Admin => write!(f, "admin"),
            Self::Platform => write!(f, "platform"),
        }
    }
}

/// Which side of a booking a listing query is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// List the user's bookings as a player
    Player,
    /// List the user's bookings as a coach
    Coach,
}

// ============================================================================
// Booking entity
// ============================================================================

/// Booking lifecycle status.
///
/// Legal transitions: `Pending → Confirmed → InProgress → Completed`, with
/// `Cancelled` reachable from `Pending` or `Confirmed` only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    /// Slot reserved, payment not yet authorized
    Pending,
    /// Payment authorized, session upcoming
    Confirmed,
    /// Session underway (payment captured)
    InProgress,
    /// Session finished
    Completed,
    /// Cancelled before the session started
    Cancelled,
}

impl BookingStatus {
    /// Whether a booking in this status still blocks its slot.
    ///
    /// Completed and cancelled bookings never conflict with new requests.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

/// One reserved time slot between a player and a coach.
///
/// Never physically deleted - cancellation is a status, preserving
/// auditability and idempotent replay of events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Unique booking identifier
    pub id: BookingId,
    /// Player on the booking
    pub player: PlayerId,
    /// Coach on the booking
    pub coach: CoachId,
    /// Reserved interval
    pub slot: TimeSlot,
    /// IANA timezone name, advisory display metadata only
    pub timezone: String,
    /// Current lifecycle status
    pub status: BookingStatus,
    /// Payment intent, set once authorization succeeds
    pub payment_intent: Option<PaymentIntentId>,
    /// Why the booking was cancelled, if it was
    pub cancel_reason: Option<String>,
    /// When the booking was created
    pub created_at: DateTime<Utc>,
    /// When the booking was last updated
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Creates a new `Pending` booking
    #[must_use]
    pub const fn new(
        id: BookingId,
        player: PlayerId,
        coach: CoachId,
        slot: TimeSlot,
        timezone: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            player,
            coach,
            slot,
            timezone,
            status: BookingStatus::Pending,
            payment_intent: None,
            cancel_reason: None,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Refund eligibility decided by the cancellation policy.
///
/// The policy value is returned to the caller, not silently applied; the
/// actual refund amount computation is the payment coordinator's concern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundEligibility {
    /// Cancelled with the full refund window to spare
    Full,
    /// Cancelled inside the full refund window; partial refund applies
    Partial,
}

// ============================================================================
// Payment entities
// ============================================================================

/// Payment intent status (escrow lifecycle).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentIntentStatus {
    /// Created, awaiting provider confirmation
    RequiresAction,
    /// Funds held by the provider, not transferred
    Authorized,
    /// Funds transferred
    Captured,
    /// Funds returned (refund after capture, or a released hold)
    Refunded {
        /// Refunded amount (zero for a released hold that never captured)
        amount: Money,
    },
    /// Permanently failed (declined, invalid)
    Failed {
        /// Failure reason from the provider
        reason: String,
    },
}

impl fmt::Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RequiresAction => "requires_action",
            Self::Authorized => "authorized",
            Self::Captured => "captured",
            Self::Refunded { .. } => "refunded",
            Self::Failed { .. } => "failed",
        };
        write!(f, "{label}")
    }
}

/// Escrow lifecycle for one booking's payment.
///
/// Exactly one active intent per booking; a refunded or failed intent may
/// be superseded by a new one. Amount and currency are immutable once
/// authorized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Unique intent identifier
    pub id: PaymentIntentId,
    /// The booking this intent pays for
    pub booking: BookingId,
    /// Amount to hold and later capture
    pub amount: Money,
    /// Settlement currency
    pub currency: Currency,
    /// Current escrow status
    pub status: PaymentIntentStatus,
    /// Opaque provider correlation id, set once the provider intent exists
    pub provider_ref: Option<ProviderRef>,
    /// Provider reference of the refund, if one was issued
    pub refund_ref: Option<ProviderRef>,
    /// When the intent was created
    pub created_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Creates a new intent in `RequiresAction`
    #[must_use]
    pub const fn new(
        id: PaymentIntentId,
        booking: BookingId,
        amount: Money,
        currency: Currency,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            booking,
            amount,
            currency,
            status: PaymentIntentStatus::RequiresAction,
            provider_ref: None,
            refund_ref: None,
            created_at,
        }
    }
}

/// Result of a refund operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefundResult {
    /// The refunded intent
    pub intent: PaymentIntentId,
    /// Amount actually refunded
    pub amount: Money,
    /// Provider reference of the refund
    pub provider_ref: ProviderRef,
    /// Whether the full captured amount was refunded
    pub full: bool,
}

// ============================================================================
// Schedule entities
// ============================================================================

/// An active hold on a coach's calendar, one per active booking.
///
/// Holds are released on cancellation and on completion, so only bookings
/// that still block the slot participate in conflict detection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotHold {
    /// The booking holding the slot
    pub booking_id: BookingId,
    /// The player who requested it
    pub player: PlayerId,
    /// The held interval
    pub slot: TimeSlot,
    /// When the hold was taken
    pub reserved_at: DateTime<Utc>,
}

// ============================================================================
// Aggregate states
// ============================================================================

/// State for a single coach's schedule aggregate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScheduleState {
    /// Active holds indexed by booking id
    pub holds: HashMap<BookingId, SlotHold>,
    /// Declared availability windows
    pub availability: Vec<AvailabilitySlot>,
    /// Last validation error
    pub last_error: Option<String>,
}

impl ScheduleState {
    /// Creates a new empty `ScheduleState`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any active hold overlaps the candidate slot.
    #[must_use]
    pub fn has_overlap(&self, slot: &TimeSlot) -> bool {
        self.holds.values().any(|hold| hold.slot.overlaps(slot))
    }

    /// Whether the slot falls inside some declared availability window.
    ///
    /// A coach with no declared windows accepts any slot; declaration is
    /// opt-in pre-validation.
    #[must_use]
    pub fn within_availability(&self, slot: &TimeSlot) -> bool {
        self.availability.is_empty()
            || self
                .availability
                .iter()
                .any(|declared| declared.window.contains(slot))
    }

    /// Number of active holds
    #[must_use]
    pub fn count(&self) -> usize {
        self.holds.len()
    }
}

/// State for the booking aggregate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BookingState {
    /// Bookings indexed by id
    pub bookings: HashMap<BookingId, Booking>,
    /// Last validation error
    pub last_error: Option<String>,
}

impl BookingState {
    /// Creates a new empty `BookingState`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a booking by id
    #[must_use]
    pub fn get(&self, id: &BookingId) -> Option<&Booking> {
        self.bookings.get(id)
    }

    /// Checks if a booking exists
    #[must_use]
    pub fn exists(&self, id: &BookingId) -> bool {
        self.bookings.contains_key(id)
    }

    /// Number of bookings
    #[must_use]
    pub fn count(&self) -> usize {
        self.bookings.len()
    }
}

/// State for the payment aggregate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentState {
    /// Payment intents indexed by id
    pub intents: HashMap<PaymentIntentId, PaymentIntent>,
    /// Last validation error
    pub last_error: Option<String>,
}

impl PaymentState {
    /// Creates a new empty `PaymentState`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets an intent by id
    #[must_use]
    pub fn get(&self, id: &PaymentIntentId) -> Option<&PaymentIntent> {
        self.intents.get(id)
    }

    /// Checks if an intent exists
    #[must_use]
    pub fn exists(&self, id: &PaymentIntentId) -> bool {
        self.intents.contains_key(id)
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// Page request for listing queries (1-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Page number, starting at 1
    pub number: u32,
    /// Items per page
    pub size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 1,
            size: 20,
        }
    }
}

impl Page {
    /// Creates a page request
    #[must_use]
    pub const fn new(number: u32, size: u32) -> Self {
        Self { number, size }
    }

    /// Offset of the first item on this page
    #[must_use]
    pub const fn offset(&self) -> usize {
        (self.number.saturating_sub(1) as usize) * self.size as usize
    }
}

/// One page of results plus the total count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Total matching items across all pages
    pub total: usize,
    /// The page that was requested
    pub page: Page,
}

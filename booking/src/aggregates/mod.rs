//! Write-side aggregates of the booking core.
//!
//! - [`schedule`]: a coach's calendar of availability and holds (conflict
//!   detection)
//! - [`booking`]: the session lifecycle state machine and cancellation
//!   policy
//! - [`payment`]: the escrow lifecycle for a booking's payment

pub mod booking;
pub mod payment;
pub mod schedule;

pub use booking::{BookingAction, BookingEnvironment, BookingReducer, CancellationPolicy};
pub use payment::{PaymentAction, PaymentEnvironment, PaymentReducer};
pub use schedule::{ScheduleAction, ScheduleEnvironment, ScheduleReducer};

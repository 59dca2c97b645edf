//! Appointment booking against slot capacity

pub(crate) mod engine;
mod error;
mod reminder;

pub use engine::{BookingEngine, BookingRequest};
pub use error::{BookingError, BookingResult};

pub(crate) use engine::{appointment_payload, cancel_in_txn, reserve_slot};

//! Domain models
//!
//! Plain data shared by the booking server and its callers. Ids are
//! snowflake i64 values (see [`crate::util::snowflake_id`]), timestamps are
//! Unix millis.

pub mod appointment;
pub mod order;
pub mod payment;
pub mod service;
pub mod slot;

pub use appointment::{Appointment, AppointmentStatus, Booker};
pub use order::{Order, OrderStatus, PaymentStatus};
pub use payment::Payment;
pub use service::{
    AppointmentFeeMode, Destination, ProcessingTimeOption, Service, ServiceDestinationPricing,
    SubService,
};
pub use slot::{Slot, SlotKey};

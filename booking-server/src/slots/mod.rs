//! Slot generation and administration

mod admin;
mod error;
mod generator;

pub use admin::{ClearDayReport, SlotAdmin};
pub use error::{SlotError, SlotResult};
pub use generator::{GenerationReport, SlotGenerator};

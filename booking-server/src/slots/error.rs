use crate::storage::StorageError;
use chrono::{NaiveDate, NaiveTime};
use shared::{AppError, ErrorCode};
use thiserror::Error;

/// Slot generation / administration errors
#[derive(Debug, Error)]
pub enum SlotError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Slot not found: {0}")]
    NotFound(i64),

    #[error("Invalid date range: {from} .. {to} (today is {today})")]
    InvalidDateRange {
        from: NaiveDate,
        to: NaiveDate,
        today: NaiveDate,
    },

    #[error("Invalid time range: {start} - {end}")]
    InvalidTimeRange { start: NaiveTime, end: NaiveTime },

    #[error("Slot already exists: {date} {start} - {end}")]
    DuplicateSlot {
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    },

    #[error("Slot {slot_id} still has {current} booking(s)")]
    HasBookings { slot_id: i64, current: u32 },

    #[error("Slot {slot_id} capacity {requested} is below current bookings {current}")]
    CapacityBelowBookings {
        slot_id: i64,
        requested: u32,
        current: u32,
    },
}

pub type SlotResult<T> = Result<T, SlotError>;

impl From<SlotError> for AppError {
    fn from(err: SlotError) -> Self {
        match err {
            SlotError::Storage(e) => e.into(),
            SlotError::NotFound(id) => {
                AppError::with_message(ErrorCode::SlotNotFound, format!("Slot not found: {id}"))
                    .with_detail("slot_id", id)
            }
            e @ SlotError::InvalidDateRange { .. } => {
                AppError::with_message(ErrorCode::InvalidDateRange, e.to_string())
            }
            e @ SlotError::InvalidTimeRange { .. } => {
                AppError::with_message(ErrorCode::InvalidTimeRange, e.to_string())
            }
            e @ SlotError::DuplicateSlot { .. } => {
                AppError::with_message(ErrorCode::DuplicateSlot, e.to_string())
            }
            SlotError::HasBookings { slot_id, current } => AppError::with_message(
                ErrorCode::SlotHasBookings,
                format!("Slot {slot_id} still has {current} booking(s)"),
            )
            .with_detail("slot_id", slot_id)
            .with_detail("current_bookings", current),
            e @ SlotError::CapacityBelowBookings { .. } => {
                AppError::with_message(ErrorCode::CapacityBelowBookings, e.to_string())
            }
        }
    }
}

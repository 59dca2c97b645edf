use crate::slots::SlotError;
use crate::storage::StorageError;
use shared::models::AppointmentStatus;
use shared::{AppError, ErrorCode};
use thiserror::Error;

/// Booking engine errors
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error("Slot not found: {0}")]
    SlotNotFound(i64),

    #[error("Slot {slot_id} is not available")]
    SlotUnavailable { slot_id: i64 },

    #[error("Booker already holds appointment {appointment_id} on slot {slot_id}")]
    DuplicateBooking { slot_id: i64, appointment_id: i64 },

    #[error("Appointment {appointment_id} is {status} and cannot be cancelled")]
    NotCancellable {
        appointment_id: i64,
        status: AppointmentStatus,
    },

    #[error("Appointment {appointment_id} cannot move from {from} to {to}")]
    InvalidTransition {
        appointment_id: i64,
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(i64),
}

pub type BookingResult<T> = Result<T, BookingError>;

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::Storage(e) => e.into(),
            BookingError::Slot(e) => e.into(),
            BookingError::SlotNotFound(id) => {
                AppError::with_message(ErrorCode::SlotNotFound, message).with_detail("slot_id", id)
            }
            BookingError::SlotUnavailable { slot_id } => {
                AppError::with_message(ErrorCode::SlotUnavailable, message)
                    .with_detail("slot_id", slot_id)
            }
            BookingError::DuplicateBooking {
                slot_id,
                appointment_id,
            } => AppError::with_message(ErrorCode::DuplicateBooking, message)
                .with_detail("slot_id", slot_id)
                .with_detail("appointment_id", appointment_id),
            BookingError::NotCancellable { appointment_id, status } => {
                AppError::with_message(ErrorCode::NotCancellable, message)
                    .with_detail("appointment_id", appointment_id)
                    .with_detail("status", status.as_str())
            }
            BookingError::InvalidTransition { appointment_id, .. } => {
                AppError::with_message(ErrorCode::InvalidAppointmentTransition, message)
                    .with_detail("appointment_id", appointment_id)
            }
            BookingError::AppointmentNotFound(id) => {
                AppError::with_message(ErrorCode::AppointmentNotFound, message)
                    .with_detail("appointment_id", id)
            }
        }
    }
}

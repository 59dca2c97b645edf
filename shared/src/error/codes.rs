//! Unified error codes for the booking workspace
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 4xxx: Slot and appointment errors
//! - 5xxx: Order and pricing errors
//! - 6xxx: Payment errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// Represented as u16 values so callers in other languages can match on the
/// number without knowing the Rust variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,

    // ==================== 4xxx: Slot / Appointment ====================
    /// Slot not found
    SlotNotFound = 4001,
    /// Slot is disabled or fully booked
    SlotUnavailable = 4002,
    /// Booker already holds an active appointment on the slot
    DuplicateBooking = 4003,
    /// Appointment is not in a cancellable state
    NotCancellable = 4004,
    /// Slot still has bookings and cannot be removed
    SlotHasBookings = 4005,
    /// Date or date range cannot be generated
    InvalidDateRange = 4006,
    /// Appointment not found
    AppointmentNotFound = 4007,
    /// A slot with the same date and time range already exists
    DuplicateSlot = 4008,
    /// Capacity would drop below the current booking count
    CapacityBelowBookings = 4009,
    /// Start time is not before end time
    InvalidTimeRange = 4010,
    /// Appointment status does not allow the requested change
    InvalidAppointmentTransition = 4011,

    // ==================== 5xxx: Order / Pricing ====================
    /// Order not found
    OrderNotFound = 5001,
    /// Order status does not allow the requested transition
    InvalidOrderTransition = 5002,
    /// Referenced service, sub-service, destination or processing time is missing
    PricingInputMissing = 5003,
    /// Order cannot be cancelled from its current status
    OrderNotCancellable = 5004,

    // ==================== 6xxx: Payment ====================
    /// Payment not found
    PaymentNotFound = 6001,
    /// Payment provider failed or returned an unusable response
    PaymentProviderError = 6002,
    /// Payment status does not allow the requested change
    InvalidPaymentTransition = 6003,
    /// Order has already been paid
    OrderAlreadyPaid = 6004,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Storage error
    StorageError = 9002,
}

impl ErrorCode {
    /// Get the numeric code
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Default English message for this code
    pub const fn message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",

            ErrorCode::SlotNotFound => "Slot not found",
            ErrorCode::SlotUnavailable => "Slot is not available",
            ErrorCode::DuplicateBooking => "Appointment already booked for this slot",
            ErrorCode::NotCancellable => "Appointment cannot be cancelled",
            ErrorCode::SlotHasBookings => "Slot has bookings",
            ErrorCode::InvalidDateRange => "Invalid date range",
            ErrorCode::AppointmentNotFound => "Appointment not found",
            ErrorCode::DuplicateSlot => "Slot already exists",
            ErrorCode::CapacityBelowBookings => "Capacity is below current bookings",
            ErrorCode::InvalidTimeRange => "Invalid time range",
            ErrorCode::InvalidAppointmentTransition => "Invalid appointment status change",

            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::InvalidOrderTransition => "Invalid order status change",
            ErrorCode::PricingInputMissing => "Pricing input not found",
            ErrorCode::OrderNotCancellable => "Order cannot be cancelled",

            ErrorCode::PaymentNotFound => "Payment not found",
            ErrorCode::PaymentProviderError => "Payment provider error",
            ErrorCode::InvalidPaymentTransition => "Invalid payment status change",
            ErrorCode::OrderAlreadyPaid => "Order has already been paid",

            ErrorCode::InternalError => "Internal error",
            ErrorCode::StorageError => "Storage error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code as u16
    }
}

/// Error returned when converting an unknown u16 into [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),

            // Slot / Appointment
            4001 => Ok(ErrorCode::SlotNotFound),
            4002 => Ok(ErrorCode::SlotUnavailable),
            4003 => Ok(ErrorCode::DuplicateBooking),
            4004 => Ok(ErrorCode::NotCancellable),
            4005 => Ok(ErrorCode::SlotHasBookings),
            4006 => Ok(ErrorCode::InvalidDateRange),
            4007 => Ok(ErrorCode::AppointmentNotFound),
            4008 => Ok(ErrorCode::DuplicateSlot),
            4009 => Ok(ErrorCode::CapacityBelowBookings),
            4010 => Ok(ErrorCode::InvalidTimeRange),
            4011 => Ok(ErrorCode::InvalidAppointmentTransition),

            // Order / Pricing
            5001 => Ok(ErrorCode::OrderNotFound),
            5002 => Ok(ErrorCode::InvalidOrderTransition),
            5003 => Ok(ErrorCode::PricingInputMissing),
            5004 => Ok(ErrorCode::OrderNotCancellable),

            // Payment
            6001 => Ok(ErrorCode::PaymentNotFound),
            6002 => Ok(ErrorCode::PaymentProviderError),
            6003 => Ok(ErrorCode::InvalidPaymentTransition),
            6004 => Ok(ErrorCode::OrderAlreadyPaid),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::StorageError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::ValidationFailed.code(), 2);
        assert_eq!(ErrorCode::SlotUnavailable.code(), 4002);
        assert_eq!(ErrorCode::DuplicateBooking.code(), 4003);
        assert_eq!(ErrorCode::PricingInputMissing.code(), 5003);
        assert_eq!(ErrorCode::PaymentProviderError.code(), 6002);
        assert_eq!(ErrorCode::StorageError.code(), 9002);
    }

    #[test]
    fn test_try_from_valid() {
        assert_eq!(ErrorCode::try_from(4004), Ok(ErrorCode::NotCancellable));
        assert_eq!(ErrorCode::try_from(6001), Ok(ErrorCode::PaymentNotFound));
    }

    #[test]
    fn test_try_from_invalid() {
        assert_eq!(ErrorCode::try_from(4999), Err(InvalidErrorCode(4999)));
        assert_eq!(ErrorCode::try_from(0), Err(InvalidErrorCode(0)));
    }

    #[test]
    fn test_serialize_as_number() {
        let json = serde_json::to_string(&ErrorCode::SlotHasBookings).unwrap();
        assert_eq!(json, "4005");
        let back: ErrorCode = serde_json::from_str("4005").unwrap();
        assert_eq!(back, ErrorCode::SlotHasBookings);
        assert!(serde_json::from_str::<ErrorCode>("12345").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorCode::NotFound.to_string(), "E0003");
        assert_eq!(ErrorCode::InvalidDateRange.to_string(), "E4006");
    }
}

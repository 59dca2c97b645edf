use crate::booking::BookingError;
use crate::payment::ProviderError;
use crate::pricing::PricingError;
use crate::storage::StorageError;
use shared::models::{OrderStatus, PaymentStatus};
use shared::{AppError, ErrorCode};
use thiserror::Error;

/// Order / payment errors
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    #[error("Order number not found: {0}")]
    OrderNumberNotFound(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(i64),

    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Order {order_id} is {status} and cannot be cancelled")]
    NotCancellable { order_id: i64, status: OrderStatus },

    #[error("Order {order_id} is {status} and does not accept payments")]
    NotPayable { order_id: i64, status: OrderStatus },

    #[error("Payment {payment_id} cannot move from {from} to {to}")]
    InvalidPaymentTransition {
        payment_id: i64,
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Payment {0} has no provider transaction")]
    MissingTransaction(i64),

    #[error("Order already paid: {0}")]
    AlreadyPaid(i64),
}

pub type OrderResult<T> = Result<T, OrderError>;

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        let message = err.to_string();
        match err {
            OrderError::Storage(e) => e.into(),
            OrderError::Booking(e) => e.into(),
            OrderError::Pricing(e) => e.into(),
            OrderError::Provider(e) => e.into(),
            OrderError::OrderNotFound(id) => {
                AppError::with_message(ErrorCode::OrderNotFound, message).with_detail("order_id", id)
            }
            OrderError::OrderNumberNotFound(number) => {
                AppError::with_message(ErrorCode::OrderNotFound, message)
                    .with_detail("order_number", number)
            }
            OrderError::PaymentNotFound(id) => {
                AppError::with_message(ErrorCode::PaymentNotFound, message)
                    .with_detail("payment_id", id)
            }
            OrderError::InvalidTransition { order_id, from, to } => {
                AppError::with_message(ErrorCode::InvalidOrderTransition, message)
                    .with_detail("order_id", order_id)
                    .with_detail("from", from.as_str())
                    .with_detail("to", to.as_str())
            }
            OrderError::NotCancellable { order_id, status } => {
                AppError::with_message(ErrorCode::OrderNotCancellable, message)
                    .with_detail("order_id", order_id)
                    .with_detail("status", status.as_str())
            }
            OrderError::NotPayable { order_id, status } => {
                AppError::with_message(ErrorCode::InvalidOrderTransition, message)
                    .with_detail("order_id", order_id)
                    .with_detail("status", status.as_str())
            }
            OrderError::InvalidPaymentTransition {
                payment_id,
                from,
                to,
            } => AppError::with_message(ErrorCode::InvalidPaymentTransition, message)
                .with_detail("payment_id", payment_id)
                .with_detail("from", from.as_str())
                .with_detail("to", to.as_str()),
            OrderError::MissingTransaction(id) => {
                AppError::with_message(ErrorCode::PaymentProviderError, message)
                    .with_detail("payment_id", id)
            }
            OrderError::AlreadyPaid(id) => {
                AppError::with_message(ErrorCode::OrderAlreadyPaid, message)
                    .with_detail("order_id", id)
            }
        }
    }
}

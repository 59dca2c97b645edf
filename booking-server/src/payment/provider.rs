//! 支付网关接口
//!
//! The booking server never talks to a payment SDK directly. It asks a
//! [`PaymentProvider`] to open a transaction and later to report its state;
//! the order layer reacts to the answer.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::models::Order;
use shared::{AppError, ErrorCode};
use std::collections::HashMap;
use thiserror::Error;

/// Opened provider transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHandle {
    pub transaction_id: String,
    /// Token handed to the client to finish the payment (redirect, USSD, ...)
    pub provider_token: Option<String>,
}

/// Provider-side transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Payment provider timeout")]
    Timeout,

    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::with_message(ErrorCode::PaymentProviderError, err.to_string())
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn initiate_transaction(
        &self,
        order: &Order,
        amount: Decimal,
    ) -> Result<TransactionHandle, ProviderError>;

    async fn verify_transaction(&self, transaction_id: &str)
    -> Result<TransactionStatus, ProviderError>;
}

/// In-process provider for development and tests
///
/// Transactions start `Pending`; tests move them with
/// [`MockPaymentProvider::set_status`].
#[derive(Debug, Default)]
pub struct MockPaymentProvider {
    transactions: Mutex<HashMap<String, TransactionStatus>>,
    unavailable: Mutex<bool>,
    auto_succeed: bool,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every new transaction verifies as `Success` immediately
    pub fn auto_succeed() -> Self {
        Self {
            auto_succeed: true,
            ..Self::default()
        }
    }

    pub fn set_status(&self, transaction_id: &str, status: TransactionStatus) {
        self.transactions
            .lock()
            .insert(transaction_id.to_string(), status);
    }

    /// Simulate an outage: every call fails with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    fn check_available(&self) -> Result<(), ProviderError> {
        if *self.unavailable.lock() {
            return Err(ProviderError::Unavailable("mock outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn initiate_transaction(
        &self,
        order: &Order,
        amount: Decimal,
    ) -> Result<TransactionHandle, ProviderError> {
        self.check_available()?;
        let transaction_id = format!("mock_txn_{}", uuid::Uuid::new_v4());
        let status = if self.auto_succeed {
            TransactionStatus::Success
        } else {
            TransactionStatus::Pending
        };
        self.set_status(&transaction_id, status);

        tracing::info!(
            order_id = order.id,
            %amount,
            transaction_id = %transaction_id,
            "Mock transaction opened"
        );
        Ok(TransactionHandle {
            provider_token: Some(format!("mock_tok_{}", uuid::Uuid::new_v4().simple())),
            transaction_id,
        })
    }

    async fn verify_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionStatus, ProviderError> {
        self.check_available()?;
        self.transactions
            .lock()
            .get(transaction_id)
            .copied()
            .ok_or_else(|| ProviderError::UnknownTransaction(transaction_id.to_string()))
    }
}

//! Payment model

use super::order::PaymentStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Monetary transaction tied to an order, reconciled against the provider
///
/// Once `status` is `Completed`, amount and status only change through a
/// refund.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub currency: String,
    /// e.g. "CARD", "MOBILE_MONEY"
    pub payment_method: String,
    pub status: PaymentStatus,
    /// Provider transaction id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Token handed to the client to finish the provider flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_token: Option<String>,
    /// Completion time (Unix millis)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Payment {
    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }
}

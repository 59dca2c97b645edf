//! External payment provider seam

mod provider;

pub use provider::{
    MockPaymentProvider, PaymentProvider, ProviderError, TransactionHandle, TransactionStatus,
};

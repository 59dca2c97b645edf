//! Orders, payments and the order status machine

mod error;
mod manager;
mod status;

pub use error::{OrderError, OrderResult};
pub use manager::{CheckoutRequest, CheckoutResult, OrderManager, PaymentUpdate};
pub use status::{OrderStatusMachine, StatusChange};

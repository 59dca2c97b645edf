//! Shared types for the travel agency booking workspace
//!
//! Domain models, notification messages, error codes and small utilities
//! used by `booking-server` and by any HTTP layer built on top of it.

pub mod error;
pub mod models;
pub mod notification;
pub mod util;

// Re-exports
pub use error::{AppError, AppResult, ErrorCategory, ErrorCode};
pub use notification::{Notification, NotificationKind};
pub use serde::{Deserialize, Serialize};

//! Notification messages handed to the external notification sink
//!
//! The booking server only decides when to notify and with what payload;
//! channel selection (email, WhatsApp, ...) and formatting belong to the sink.

use crate::models::Booker;
use serde::{Deserialize, Serialize};

/// Notification event kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentConfirmed,
    AppointmentReminder,
    AppointmentCancelled,
    OrderCreated,
    OrderStatusChanged,
    PaymentCompleted,
    DocumentsRequired,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::AppointmentConfirmed => "appointment_confirmed",
            NotificationKind::AppointmentReminder => "appointment_reminder",
            NotificationKind::AppointmentCancelled => "appointment_cancelled",
            NotificationKind::OrderCreated => "order_created",
            NotificationKind::OrderStatusChanged => "order_status_changed",
            NotificationKind::PaymentCompleted => "payment_completed",
            NotificationKind::DocumentsRequired => "documents_required",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification: `notify(recipient, kind, payload)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub recipient: Booker,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    /// Creation time (Unix millis)
    pub created_at: i64,
}

impl Notification {
    pub fn new(recipient: Booker, kind: NotificationKind, payload: serde_json::Value) -> Self {
        Self {
            recipient,
            kind,
            payload,
            created_at: crate::util::now_millis(),
        }
    }
}

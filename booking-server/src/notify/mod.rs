//! Notification dispatch
//!
//! Components call [`Notifier::send`] after their state change has been
//! committed. Delivery failures are logged and dropped, never propagated:
//! a booking or payment must not roll back because an email bounced.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::models::Booker;
use shared::{Notification, NotificationKind};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Notification channel unavailable")]
    Unavailable,
}

/// External notification channel (email, WhatsApp, ...)
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %notification.recipient.key(),
            kind = %notification.kind,
            payload = %notification.payload,
            "Notification"
        );
        Ok(())
    }
}

/// Collects notifications in memory (tests, previews)
#[derive(Debug, Default)]
pub struct MemoryNotificationSink {
    sent: Mutex<Vec<Notification>>,
    failing: Mutex<bool>,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following delivery fail
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent.lock().iter().filter(|n| n.kind == kind).count()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if *self.failing.lock() {
            return Err(NotifyError::Unavailable);
        }
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

/// Best-effort dispatcher in front of a [`NotificationSink`]
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Returns whether the sink accepted the notification
    pub async fn send(
        &self,
        recipient: Booker,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> bool {
        let notification = Notification::new(recipient, kind, payload);
        match self.sink.notify(&notification).await {
            Ok(()) => {
                tracing::debug!(kind = %kind, recipient = %notification.recipient.key(), "Notification dispatched");
                true
            }
            Err(e) => {
                tracing::warn!(
                    kind = %kind,
                    recipient = %notification.recipient.key(),
                    error = %e,
                    "Notification dispatch failed, ignoring"
                );
                false
            }
        }
    }
}

//! Appointment model

use serde::{Deserialize, Serialize};

/// Who holds an appointment
///
/// Registered users and guests are mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Booker {
    /// 注册用户
    Registered { user_id: i64 },
    /// 访客预约
    Guest { name: String, email: String },
}

impl Booker {
    pub fn registered(user_id: i64) -> Self {
        Self::Registered { user_id }
    }

    pub fn guest(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::Guest {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Stable key for duplicate-booking detection
    ///
    /// Guest emails are compared case-insensitively.
    pub fn key(&self) -> String {
        match self {
            Booker::Registered { user_id } => format!("user:{}", user_id),
            Booker::Guest { email, .. } => format!("guest:{}", email.trim().to_lowercase()),
        }
    }

    /// Registered user id, if any
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Booker::Registered { user_id } => Some(*user_id),
            Booker::Guest { .. } => None,
        }
    }
}

/// Appointment status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Scheduled or confirmed: holds one unit of slot capacity
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    pub fn is_cancellable(&self) -> bool {
        self.is_active()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A booking of one booker into one slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Appointment {
    pub id: i64,
    pub booker: Booker,
    pub slot_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<i64>,
    pub status: AppointmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Last reminder send time (Unix millis)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_sent_at: Option<i64>,
    /// Reminder offsets (hours before start) already sent
    #[serde(default)]
    pub reminder_offsets_sent: Vec<u32>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Appointment {
    /// Append a line to the free-text notes
    pub fn append_note(&mut self, line: &str) {
        match &mut self.notes {
            Some(notes) if !notes.is_empty() => {
                notes.push('\n');
                notes.push_str(line);
            }
            _ => self.notes = Some(line.to_string()),
        }
    }

    pub fn reminder_already_sent(&self, hours_before: u32) -> bool {
        self.reminder_offsets_sent.contains(&hours_before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment() -> Appointment {
        Appointment {
            id: 1,
            booker: Booker::registered(7),
            slot_id: 10,
            order_id: None,
            service_id: None,
            status: AppointmentStatus::Scheduled,
            notes: None,
            reminder_sent_at: None,
            reminder_offsets_sent: Vec::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_booker_key() {
        assert_eq!(Booker::registered(7).key(), "user:7");
        assert_eq!(
            Booker::guest("Ana", "  Ana@Example.com ").key(),
            "guest:ana@example.com"
        );
        assert_eq!(Booker::guest("Ana", "a@b.c").user_id(), None);
    }

    #[test]
    fn test_booker_serde_tagged() {
        let json = serde_json::to_string(&Booker::registered(3)).unwrap();
        assert_eq!(json, r#"{"type":"REGISTERED","user_id":3}"#);
        let guest: Booker =
            serde_json::from_str(r#"{"type":"GUEST","name":"Li","email":"li@x.io"}"#).unwrap();
        assert_eq!(guest, Booker::guest("Li", "li@x.io"));
    }

    #[test]
    fn test_status_flags() {
        assert!(AppointmentStatus::Scheduled.is_cancellable());
        assert!(AppointmentStatus::Confirmed.is_cancellable());
        assert!(!AppointmentStatus::Cancelled.is_cancellable());
        assert!(!AppointmentStatus::Completed.is_cancellable());
    }

    #[test]
    fn test_append_note() {
        let mut a = appointment();
        a.append_note("first");
        a.append_note("second");
        assert_eq!(a.notes.as_deref(), Some("first\nsecond"));
    }
}

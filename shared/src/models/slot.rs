//! Appointment slot model

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A bookable time interval on a calendar date
///
/// `current_bookings` never exceeds `max_bookings`. The store only mutates
/// the counter inside a write transaction that re-checks this bound.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Manually disabled by an administrator
    #[serde(default)]
    pub is_disabled: bool,
    pub max_bookings: u32,
    #[serde(default)]
    pub current_bookings: u32,
    /// Dedicated to a single service (None = any service)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Slot {
    /// Available iff not disabled and below capacity
    pub fn is_available(&self) -> bool {
        !self.is_disabled && self.current_bookings < self.max_bookings
    }

    /// Remaining capacity
    pub fn remaining(&self) -> u32 {
        self.max_bookings.saturating_sub(self.current_bookings)
    }

    /// Whether the slot accepts bookings for the given service
    pub fn serves(&self, service_id: Option<i64>) -> bool {
        match (self.service_id, service_id) {
            (None, _) => true,
            (Some(own), Some(requested)) => own == requested,
            (Some(_), None) => false,
        }
    }

    /// Local start date-time (business timezone)
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Identity used for idempotent generation
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.date, self.start_time, self.end_time)
    }
}

/// date + start + end, unique across all slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl SlotKey {
    pub fn new(date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            date,
            start_time,
            end_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(max: u32, current: u32, disabled: bool) -> Slot {
        Slot {
            id: 1,
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            is_disabled: disabled,
            max_bookings: max,
            current_bookings: current,
            service_id: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_availability() {
        assert!(slot(2, 1, false).is_available());
        assert!(!slot(2, 2, false).is_available());
        assert!(!slot(2, 0, true).is_available());
        assert!(!slot(0, 0, false).is_available());
    }

    #[test]
    fn test_remaining_never_underflows() {
        assert_eq!(slot(3, 1, false).remaining(), 2);
        assert_eq!(slot(1, 5, false).remaining(), 0);
    }

    #[test]
    fn test_serves() {
        let mut s = slot(1, 0, false);
        assert!(s.serves(None));
        assert!(s.serves(Some(9)));
        s.service_id = Some(9);
        assert!(s.serves(Some(9)));
        assert!(!s.serves(Some(10)));
        assert!(!s.serves(None));
    }

    #[test]
    fn test_serde_defaults() {
        let json = r#"{"id":5,"date":"2026-10-19","start_time":"10:00:00","end_time":"10:30:00","max_bookings":2,"created_at":0,"updated_at":0}"#;
        let s: Slot = serde_json::from_str(json).unwrap();
        assert_eq!(s.current_bookings, 0);
        assert!(!s.is_disabled);
        assert_eq!(s.service_id, None);
    }
}

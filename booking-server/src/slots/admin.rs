//! Manual slot administration
//!
//! Slots that hold bookings are never deleted; capacity can only shrink
//! down to the current booking count.

use super::error::{SlotError, SlotResult};
use crate::core::Clock;
use crate::storage::BookingStorage;
use chrono::{NaiveDate, NaiveTime};
use shared::models::{Slot, SlotKey};
use shared::util::snowflake_id;
use std::sync::Arc;

/// Outcome of [`SlotAdmin::clear_day`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearDayReport {
    pub deleted: usize,
    /// Slots kept because they still hold bookings
    pub kept: usize,
}

#[derive(Clone)]
pub struct SlotAdmin {
    storage: BookingStorage,
    clock: Arc<dyn Clock>,
}

impl SlotAdmin {
    pub fn new(storage: BookingStorage, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    pub fn get_slot(&self, slot_id: i64) -> SlotResult<Slot> {
        self.storage
            .get_slot(slot_id)?
            .ok_or(SlotError::NotFound(slot_id))
    }

    pub fn create_slot(
        &self,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        max_bookings: u32,
        service_id: Option<i64>,
    ) -> SlotResult<Slot> {
        if start >= end {
            return Err(SlotError::InvalidTimeRange { start, end });
        }

        let txn = self.storage.begin_write()?;
        if self
            .storage
            .find_slot_id_txn(&txn, &SlotKey::new(date, start, end))?
            .is_some()
        {
            return Err(SlotError::DuplicateSlot { date, start, end });
        }

        let now = self.clock.now_millis();
        let slot = Slot {
            id: snowflake_id(),
            date,
            start_time: start,
            end_time: end,
            is_disabled: false,
            max_bookings,
            current_bookings: 0,
            service_id,
            created_at: now,
            updated_at: now,
        };
        self.storage.put_slot(&txn, &slot)?;
        self.storage.commit(txn)?;

        tracing::info!(slot_id = slot.id, %date, %start, %end, max_bookings, "Slot created");
        Ok(slot)
    }

    /// 手动停用 / 启用
    pub fn set_disabled(&self, slot_id: i64, disabled: bool) -> SlotResult<Slot> {
        let slot = self.modify(slot_id, |slot| {
            slot.is_disabled = disabled;
            Ok(())
        })?;
        tracing::info!(slot_id, disabled, "Slot availability changed");
        Ok(slot)
    }

    pub fn update_capacity(&self, slot_id: i64, max_bookings: u32) -> SlotResult<Slot> {
        let slot = self.modify(slot_id, |slot| {
            if max_bookings < slot.current_bookings {
                return Err(SlotError::CapacityBelowBookings {
                    slot_id,
                    requested: max_bookings,
                    current: slot.current_bookings,
                });
            }
            slot.max_bookings = max_bookings;
            Ok(())
        })?;
        tracing::info!(slot_id, max_bookings, "Slot capacity updated");
        Ok(slot)
    }

    pub fn delete_slot(&self, slot_id: i64) -> SlotResult<()> {
        let txn = self.storage.begin_write()?;
        let slot = self
            .storage
            .get_slot_txn(&txn, slot_id)?
            .ok_or(SlotError::NotFound(slot_id))?;
        if slot.current_bookings > 0 {
            return Err(SlotError::HasBookings {
                slot_id,
                current: slot.current_bookings,
            });
        }
        self.storage.remove_slot(&txn, &slot)?;
        self.storage.commit(txn)?;

        tracing::info!(slot_id, date = %slot.date, "Slot deleted");
        Ok(())
    }

    /// Delete every empty slot of a date, booked slots stay
    pub fn clear_day(&self, date: NaiveDate) -> SlotResult<ClearDayReport> {
        let txn = self.storage.begin_write()?;
        let mut report = ClearDayReport::default();
        for slot in self.storage.slots_on_date_txn(&txn, date)? {
            if slot.current_bookings > 0 {
                report.kept += 1;
            } else {
                self.storage.remove_slot(&txn, &slot)?;
                report.deleted += 1;
            }
        }
        self.storage.commit(txn)?;

        tracing::info!(%date, deleted = report.deleted, kept = report.kept, "Cleared day");
        Ok(report)
    }

    fn modify<F>(&self, slot_id: i64, f: F) -> SlotResult<Slot>
    where
        F: FnOnce(&mut Slot) -> SlotResult<()>,
    {
        let txn = self.storage.begin_write()?;
        let mut slot = self
            .storage
            .get_slot_txn(&txn, slot_id)?
            .ok_or(SlotError::NotFound(slot_id))?;
        f(&mut slot)?;
        slot.updated_at = self.clock.now_millis();
        self.storage.put_slot(&txn, &slot)?;
        self.storage.commit(txn)?;
        Ok(slot)
    }
}

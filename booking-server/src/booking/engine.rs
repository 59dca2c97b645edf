//! BookingEngine - 时段预约核心
//!
//! 容量检查与计数递增在同一个 redb 写事务内完成, 写事务串行执行,
//! 因此最后一个名额只会被一个请求拿到。

use super::error::{BookingError, BookingResult};
use crate::core::{Clock, ReminderConfig};
use crate::notify::Notifier;
use crate::slots::SlotGenerator;
use crate::storage::BookingStorage;
use chrono::NaiveDate;
use chrono_tz::Tz;
use redb::WriteTransaction;
use shared::NotificationKind;
use shared::models::{Appointment, AppointmentStatus, Booker, Slot};
use shared::util::snowflake_id;
use std::sync::Arc;

/// A booking attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub booker: Booker,
    pub slot_id: i64,
    pub order_id: Option<i64>,
    pub service_id: Option<i64>,
    pub notes: Option<String>,
}

impl BookingRequest {
    pub fn new(booker: Booker, slot_id: i64) -> Self {
        Self {
            booker,
            slot_id,
            order_id: None,
            service_id: None,
            notes: None,
        }
    }

    pub fn with_order(mut self, order_id: i64) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_service(mut self, service_id: i64) -> Self {
        self.service_id = Some(service_id);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

// ========== Transaction-level operations ==========

/// Check and take one unit of slot capacity, creating the appointment
///
/// Must run inside the caller's write transaction; nothing is visible
/// until that transaction commits.
pub(crate) fn reserve_slot(
    storage: &BookingStorage,
    txn: &WriteTransaction,
    request: &BookingRequest,
    now: i64,
) -> BookingResult<(Appointment, Slot)> {
    let mut slot = storage
        .get_slot_txn(txn, request.slot_id)?
        .ok_or(BookingError::SlotNotFound(request.slot_id))?;

    // 先查重复预约, 否则满员时段上的重复请求会被报成 SlotUnavailable
    if let Some(appointment_id) =
        storage.active_booking_txn(txn, &request.booker.key(), slot.id)?
    {
        return Err(BookingError::DuplicateBooking {
            slot_id: slot.id,
            appointment_id,
        });
    }

    if !slot.is_available() || !slot.serves(request.service_id) {
        return Err(BookingError::SlotUnavailable { slot_id: slot.id });
    }

    let appointment = Appointment {
        id: snowflake_id(),
        booker: request.booker.clone(),
        slot_id: slot.id,
        order_id: request.order_id,
        service_id: request.service_id,
        status: AppointmentStatus::Scheduled,
        notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
        reminder_sent_at: None,
        reminder_offsets_sent: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    slot.current_bookings += 1;
    slot.updated_at = now;

    storage.put_appointment(txn, &appointment)?;
    storage.put_slot(txn, &slot)?;
    Ok((appointment, slot))
}

/// Cancel an active appointment and give its capacity back
pub(crate) fn cancel_in_txn(
    storage: &BookingStorage,
    txn: &WriteTransaction,
    appointment_id: i64,
    reason: &str,
    now: i64,
) -> BookingResult<(Appointment, Option<Slot>)> {
    let mut appointment = storage
        .get_appointment_txn(txn, appointment_id)?
        .ok_or(BookingError::AppointmentNotFound(appointment_id))?;

    if !appointment.status.is_cancellable() {
        return Err(BookingError::NotCancellable {
            appointment_id,
            status: appointment.status,
        });
    }

    appointment.status = AppointmentStatus::Cancelled;
    let reason = reason.trim();
    if !reason.is_empty() {
        appointment.append_note(reason);
    }
    appointment.updated_at = now;

    let slot = match storage.get_slot_txn(txn, appointment.slot_id)? {
        Some(mut slot) => {
            slot.current_bookings = slot.current_bookings.saturating_sub(1);
            slot.updated_at = now;
            storage.put_slot(txn, &slot)?;
            Some(slot)
        }
        None => {
            tracing::warn!(
                appointment_id,
                slot_id = appointment.slot_id,
                "Cancelled appointment references a missing slot"
            );
            None
        }
    };

    storage.put_appointment(txn, &appointment)?;
    Ok((appointment, slot))
}

pub(crate) fn appointment_payload(appointment: &Appointment, slot: Option<&Slot>) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "appointment_id": appointment.id,
        "slot_id": appointment.slot_id,
        "order_id": appointment.order_id,
        "service_id": appointment.service_id,
        "status": appointment.status.as_str(),
    });
    if let Some(slot) = slot {
        payload["date"] = serde_json::json!(slot.date);
        payload["start_time"] = serde_json::json!(slot.start_time.format("%H:%M").to_string());
        payload["end_time"] = serde_json::json!(slot.end_time.format("%H:%M").to_string());
    }
    payload
}

/// 预约引擎
#[derive(Clone)]
pub struct BookingEngine {
    pub(super) storage: BookingStorage,
    pub(super) generator: SlotGenerator,
    pub(super) notifier: Notifier,
    pub(super) reminders: ReminderConfig,
}

impl BookingEngine {
    pub fn new(
        storage: BookingStorage,
        generator: SlotGenerator,
        notifier: Notifier,
        reminders: ReminderConfig,
    ) -> Self {
        Self {
            storage,
            generator,
            notifier,
            reminders,
        }
    }

    pub fn generator(&self) -> &SlotGenerator {
        &self.generator
    }

    pub(super) fn clock(&self) -> &Arc<dyn Clock> {
        self.generator.clock()
    }

    pub(super) fn timezone(&self) -> Tz {
        self.generator.timezone()
    }

    /// Bookable slots on `date`, ordered by start time
    ///
    /// A date without any slot is generated on first read (past dates are
    /// never backfilled). `service_id` keeps general slots plus slots
    /// dedicated to that service.
    pub async fn list_available(
        &self,
        date: NaiveDate,
        service_id: Option<i64>,
    ) -> BookingResult<Vec<Slot>> {
        let generator = self.generator.clone();
        let slots = self
            .storage
            .run_blocking(move |storage| -> BookingResult<Vec<Slot>> {
                let slots = storage.slots_on_date(date)?;
                if !slots.is_empty() || date < generator.today() {
                    return Ok(slots);
                }
                tracing::debug!(%date, "No slots for date, generating on read");
                if generator.generate_for_date(date, None)? == 0 {
                    return Ok(slots);
                }
                Ok(storage.slots_on_date(date)?)
            })
            .await?;

        Ok(slots
            .into_iter()
            .filter(|slot| slot.is_available() && slot.serves(service_id))
            .collect())
    }

    pub async fn book(&self, request: BookingRequest) -> BookingResult<Appointment> {
        let now = self.clock().now_millis();
        let (appointment, slot) = self
            .storage
            .run_blocking(move |storage| -> BookingResult<(Appointment, Slot)> {
                let txn = storage.begin_write()?;
                let reserved = reserve_slot(&storage, &txn, &request, now)?;
                storage.commit(txn)?;
                Ok(reserved)
            })
            .await?;

        tracing::info!(
            appointment_id = appointment.id,
            slot_id = slot.id,
            booker = %appointment.booker.key(),
            current_bookings = slot.current_bookings,
            max_bookings = slot.max_bookings,
            "Appointment booked"
        );
        self.notifier
            .send(
                appointment.booker.clone(),
                NotificationKind::AppointmentConfirmed,
                appointment_payload(&appointment, Some(&slot)),
            )
            .await;
        Ok(appointment)
    }

    pub async fn cancel(&self, appointment_id: i64, reason: &str) -> BookingResult<Appointment> {
        let now = self.clock().now_millis();
        let reason = reason.to_string();
        let (appointment, slot) = self
            .storage
            .run_blocking(move |storage| -> BookingResult<(Appointment, Option<Slot>)> {
                let txn = storage.begin_write()?;
                let cancelled = cancel_in_txn(&storage, &txn, appointment_id, &reason, now)?;
                storage.commit(txn)?;
                Ok(cancelled)
            })
            .await?;

        tracing::info!(
            appointment_id,
            slot_id = appointment.slot_id,
            current_bookings = slot.as_ref().map(|s| s.current_bookings),
            "Appointment cancelled"
        );
        self.notifier
            .send(
                appointment.booker.clone(),
                NotificationKind::AppointmentCancelled,
                appointment_payload(&appointment, slot.as_ref()),
            )
            .await;
        Ok(appointment)
    }

    /// scheduled → confirmed
    pub async fn confirm(&self, appointment_id: i64) -> BookingResult<Appointment> {
        let (appointment, slot) = self
            .transition(appointment_id, AppointmentStatus::Confirmed)
            .await?;
        self.notifier
            .send(
                appointment.booker.clone(),
                NotificationKind::AppointmentConfirmed,
                appointment_payload(&appointment, slot.as_ref()),
            )
            .await;
        Ok(appointment)
    }

    /// scheduled / confirmed → completed
    ///
    /// The slot counter is left as is: the capacity was consumed.
    pub async fn complete(&self, appointment_id: i64) -> BookingResult<Appointment> {
        let (appointment, _) = self
            .transition(appointment_id, AppointmentStatus::Completed)
            .await?;
        Ok(appointment)
    }

    async fn transition(
        &self,
        appointment_id: i64,
        to: AppointmentStatus,
    ) -> BookingResult<(Appointment, Option<Slot>)> {
        let now = self.clock().now_millis();
        let result = self
            .storage
            .run_blocking(move |storage| -> BookingResult<(Appointment, Option<Slot>)> {
                let txn = storage.begin_write()?;
                let mut appointment = storage
                    .get_appointment_txn(&txn, appointment_id)?
                    .ok_or(BookingError::AppointmentNotFound(appointment_id))?;

                let allowed = matches!(
                    (appointment.status, to),
                    (AppointmentStatus::Scheduled, AppointmentStatus::Confirmed)
                        | (
                            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed,
                            AppointmentStatus::Completed
                        )
                );
                if !allowed {
                    return Err(BookingError::InvalidTransition {
                        appointment_id,
                        from: appointment.status,
                        to,
                    });
                }

                appointment.status = to;
                appointment.updated_at = now;
                storage.put_appointment(&txn, &appointment)?;
                let slot = storage.get_slot_txn(&txn, appointment.slot_id)?;
                storage.commit(txn)?;
                Ok((appointment, slot))
            })
            .await?;

        tracing::info!(appointment_id, status = %to, "Appointment status changed");
        Ok(result)
    }

    // ========== Lookups ==========

    pub async fn get_appointment(&self, appointment_id: i64) -> BookingResult<Appointment> {
        self.storage
            .run_blocking(move |storage| -> BookingResult<Appointment> {
                storage
                    .get_appointment(appointment_id)?
                    .ok_or(BookingError::AppointmentNotFound(appointment_id))
            })
            .await
    }

    pub async fn appointments_for_slot(&self, slot_id: i64) -> BookingResult<Vec<Appointment>> {
        self.storage
            .run_blocking(move |storage| -> BookingResult<Vec<Appointment>> {
                Ok(storage.appointments_for_slot(slot_id)?)
            })
            .await
    }

    pub async fn appointments_for_booker(&self, booker: Booker) -> BookingResult<Vec<Appointment>> {
        self.storage
            .run_blocking(move |storage| -> BookingResult<Vec<Appointment>> {
                Ok(storage.appointments_for_booker(&booker)?)
            })
            .await
    }
}

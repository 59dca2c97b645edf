//! 预约提醒
//!
//! Each configured offset (hours before start) is sent at most once per
//! appointment. Sent offsets are recorded on the appointment itself, so two
//! offsets that are close together (3h / 4h) never suppress each other.

use super::engine::{BookingEngine, appointment_payload};
use super::error::{BookingError, BookingResult};
use crate::core::config::MAX_REMINDER_OFFSET_HOURS;
use chrono::Duration;
use shared::NotificationKind;
use shared::models::{Appointment, Slot};

impl BookingEngine {
    /// Send the `hours_before` reminder for one appointment
    ///
    /// Returns `false` when the appointment is no longer active or this
    /// offset was already sent. The offset is recorded before dispatch, a
    /// failed delivery is logged and not retried.
    pub async fn send_reminder(&self, appointment_id: i64, hours_before: u32) -> BookingResult<bool> {
        let now = self.clock().now_millis();
        let claimed = self
            .storage
            .run_blocking(move |storage| -> BookingResult<Option<(Appointment, Option<Slot>)>> {
                let txn = storage.begin_write()?;
                let mut appointment = storage
                    .get_appointment_txn(&txn, appointment_id)?
                    .ok_or(BookingError::AppointmentNotFound(appointment_id))?;

                if !appointment.status.is_active() || appointment.reminder_already_sent(hours_before) {
                    return Ok(None);
                }

                appointment.reminder_offsets_sent.push(hours_before);
                appointment.reminder_sent_at = Some(now);
                appointment.updated_at = now;
                storage.put_appointment(&txn, &appointment)?;
                let slot = storage.get_slot_txn(&txn, appointment.slot_id)?;
                storage.commit(txn)?;
                Ok(Some((appointment, slot)))
            })
            .await?;

        let Some((appointment, slot)) = claimed else {
            tracing::debug!(appointment_id, hours_before, "Reminder skipped");
            return Ok(false);
        };

        let mut payload = appointment_payload(&appointment, slot.as_ref());
        payload["hours_before"] = serde_json::json!(hours_before);
        self.notifier
            .send(
                appointment.booker.clone(),
                NotificationKind::AppointmentReminder,
                payload,
            )
            .await;
        tracing::info!(appointment_id, hours_before, "Reminder sent");
        Ok(true)
    }

    /// Send every reminder that is due now
    ///
    /// For each upcoming active appointment only the smallest due offset is
    /// sent: an appointment booked 90 minutes ahead gets the 2h reminder,
    /// not a late 24h one as well. Idempotent, meant for a periodic trigger.
    pub async fn dispatch_due_reminders(&self) -> BookingResult<usize> {
        let mut offsets = self.reminders.offsets_hours.clone();
        offsets.retain(|&hours| hours <= MAX_REMINDER_OFFSET_HOURS);
        offsets.sort_unstable();
        offsets.dedup();
        let Some(&max_offset) = offsets.last() else {
            return Ok(0);
        };

        let now = self.clock().local_now(self.timezone());
        let Some(until) = now.checked_add_signed(Duration::hours(i64::from(max_offset))) else {
            tracing::warn!(max_offset, "Reminder window out of range, skipped");
            return Ok(0);
        };

        let due = self
            .storage
            .run_blocking(move |storage| -> BookingResult<Vec<(i64, u32)>> {
                let mut due = Vec::new();
                for slot in storage.slots_between(now.date(), until.date())? {
                    let starts_at = slot.starts_at();
                    if starts_at <= now || starts_at > until {
                        continue;
                    }
                    let remaining = starts_at - now;
                    let Some(&offset) = offsets
                        .iter()
                        .find(|&&o| remaining <= Duration::hours(i64::from(o)))
                    else {
                        continue;
                    };
                    for appointment in storage.appointments_for_slot(slot.id)? {
                        if appointment.status.is_active()
                            && !appointment.reminder_already_sent(offset)
                        {
                            due.push((appointment.id, offset));
                        }
                    }
                }
                Ok(due)
            })
            .await?;

        let mut sent = 0;
        for (appointment_id, offset) in due {
            if self.send_reminder(appointment_id, offset).await? {
                sent += 1;
            }
        }
        if sent > 0 {
            tracing::info!(sent, "Dispatched due reminders");
        }
        Ok(sent)
    }
}

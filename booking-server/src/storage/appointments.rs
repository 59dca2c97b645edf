use super::{
    ACTIVE_BOOKINGS_TABLE, APPOINTMENTS_TABLE, BOOKER_APPOINTMENTS_TABLE, BookingStorage,
    ORDER_APPOINTMENTS_TABLE, SLOT_APPOINTMENTS_TABLE, StorageResult,
};
use redb::{ReadableTable, WriteTransaction};
use shared::models::{Appointment, Booker};

fn load_appointment(
    table: &impl ReadableTable<i64, &'static [u8]>,
    appointment_id: i64,
) -> StorageResult<Option<Appointment>> {
    match table.get(appointment_id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

fn load_many(
    table: &impl ReadableTable<i64, &'static [u8]>,
    ids: &[i64],
) -> StorageResult<Vec<Appointment>> {
    let mut appointments = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(appointment) = load_appointment(table, *id)? {
            appointments.push(appointment);
        }
    }
    Ok(appointments)
}

fn ids_for_i64(table: &impl ReadableTable<(i64, i64), ()>, owner: i64) -> StorageResult<Vec<i64>> {
    let mut ids = Vec::new();
    for result in table.range((owner, i64::MIN)..=(owner, i64::MAX))? {
        let (key, _) = result?;
        ids.push(key.value().1);
    }
    Ok(ids)
}

impl BookingStorage {
    // ========== Appointment Operations ==========

    /// Insert or overwrite an appointment and keep every index in step
    ///
    /// `active_bookings` holds the (booker, slot) pair only while the
    /// appointment is scheduled or confirmed.
    pub fn put_appointment(
        &self,
        txn: &WriteTransaction,
        appointment: &Appointment,
    ) -> StorageResult<()> {
        let booker_key = appointment.booker.key();
        {
            let mut table = txn.open_table(APPOINTMENTS_TABLE)?;
            let value = serde_json::to_vec(appointment)?;
            table.insert(appointment.id, value.as_slice())?;
        }
        {
            let mut active = txn.open_table(ACTIVE_BOOKINGS_TABLE)?;
            let pair = (booker_key.as_str(), appointment.slot_id);
            if appointment.status.is_active() {
                active.insert(pair, appointment.id)?;
            } else {
                let owned_by_this = active
                    .get(pair)?
                    .is_some_and(|g| g.value() == appointment.id);
                if owned_by_this {
                    active.remove(pair)?;
                }
            }
        }

        let mut by_slot = txn.open_table(SLOT_APPOINTMENTS_TABLE)?;
        by_slot.insert((appointment.slot_id, appointment.id), ())?;
        let mut by_booker = txn.open_table(BOOKER_APPOINTMENTS_TABLE)?;
        by_booker.insert((booker_key.as_str(), appointment.id), ())?;
        if let Some(order_id) = appointment.order_id {
            let mut by_order = txn.open_table(ORDER_APPOINTMENTS_TABLE)?;
            by_order.insert((order_id, appointment.id), ())?;
        }
        Ok(())
    }

    pub fn get_appointment(&self, appointment_id: i64) -> StorageResult<Option<Appointment>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(APPOINTMENTS_TABLE)?;
        load_appointment(&table, appointment_id)
    }

    pub fn get_appointment_txn(
        &self,
        txn: &WriteTransaction,
        appointment_id: i64,
    ) -> StorageResult<Option<Appointment>> {
        let table = txn.open_table(APPOINTMENTS_TABLE)?;
        load_appointment(&table, appointment_id)
    }

    /// Active appointment id held by `booker_key` on `slot_id`, if any
    pub fn active_booking_txn(
        &self,
        txn: &WriteTransaction,
        booker_key: &str,
        slot_id: i64,
    ) -> StorageResult<Option<i64>> {
        let active = txn.open_table(ACTIVE_BOOKINGS_TABLE)?;
        Ok(active.get((booker_key, slot_id))?.map(|g| g.value()))
    }

    pub fn appointments_for_slot(&self, slot_id: i64) -> StorageResult<Vec<Appointment>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(SLOT_APPOINTMENTS_TABLE)?;
        let table = read_txn.open_table(APPOINTMENTS_TABLE)?;
        let ids = ids_for_i64(&index, slot_id)?;
        load_many(&table, &ids)
    }

    pub fn appointments_for_order(&self, order_id: i64) -> StorageResult<Vec<Appointment>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(ORDER_APPOINTMENTS_TABLE)?;
        let table = read_txn.open_table(APPOINTMENTS_TABLE)?;
        let ids = ids_for_i64(&index, order_id)?;
        load_many(&table, &ids)
    }

    pub fn appointments_for_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: i64,
    ) -> StorageResult<Vec<Appointment>> {
        let ids = {
            let index = txn.open_table(ORDER_APPOINTMENTS_TABLE)?;
            ids_for_i64(&index, order_id)?
        };
        let table = txn.open_table(APPOINTMENTS_TABLE)?;
        load_many(&table, &ids)
    }

    pub fn appointments_for_booker(&self, booker: &Booker) -> StorageResult<Vec<Appointment>> {
        let key = booker.key();
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(BOOKER_APPOINTMENTS_TABLE)?;
        let table = read_txn.open_table(APPOINTMENTS_TABLE)?;

        let mut ids = Vec::new();
        for result in index.range((key.as_str(), i64::MIN)..=(key.as_str(), i64::MAX))? {
            let (k, _) = result?;
            ids.push(k.value().1);
        }
        load_many(&table, &ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::AppointmentStatus;

    fn appointment(id: i64, booker: Booker, slot_id: i64, order_id: Option<i64>) -> Appointment {
        Appointment {
            id,
            booker,
            slot_id,
            order_id,
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
    fn test_active_index_follows_status() {
        let storage = BookingStorage::open_in_memory().unwrap();
        let booker = Booker::registered(42);
        let mut a = appointment(1, booker.clone(), 10, Some(99));

        let txn = storage.begin_write().unwrap();
        storage.put_appointment(&txn, &a).unwrap();
        assert_eq!(storage.active_booking_txn(&txn, &booker.key(), 10).unwrap(), Some(1));

        a.status = AppointmentStatus::Cancelled;
        storage.put_appointment(&txn, &a).unwrap();
        assert_eq!(storage.active_booking_txn(&txn, &booker.key(), 10).unwrap(), None);
        txn.commit().unwrap();

        // History is kept in the secondary indexes
        assert_eq!(storage.appointments_for_slot(10).unwrap().len(), 1);
        assert_eq!(storage.appointments_for_order(99).unwrap().len(), 1);
        assert_eq!(storage.appointments_for_booker(&booker).unwrap().len(), 1);
    }

    #[test]
    fn test_cancelled_does_not_clear_newer_active_booking() {
        let storage = BookingStorage::open_in_memory().unwrap();
        let booker = Booker::guest("Ana", "ana@example.com");
        let mut old = appointment(1, booker.clone(), 10, None);
        old.status = AppointmentStatus::Cancelled;
        let new = appointment(2, booker.clone(), 10, None);

        let txn = storage.begin_write().unwrap();
        storage.put_appointment(&txn, &new).unwrap();
        storage.put_appointment(&txn, &old).unwrap();
        assert_eq!(storage.active_booking_txn(&txn, &booker.key(), 10).unwrap(), Some(2));
        txn.commit().unwrap();
    }

    #[test]
    fn test_booker_lookup_is_scoped() {
        let storage = BookingStorage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();
        storage
            .put_appointment(&txn, &appointment(1, Booker::registered(1), 10, None))
            .unwrap();
        storage
            .put_appointment(&txn, &appointment(2, Booker::registered(2), 10, None))
            .unwrap();
        storage
            .put_appointment(&txn, &appointment(3, Booker::registered(1), 11, None))
            .unwrap();
        txn.commit().unwrap();

        let mine: Vec<i64> = storage
            .appointments_for_booker(&Booker::registered(1))
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(mine, vec![1, 3]);
        assert_eq!(storage.appointments_for_slot(10).unwrap().len(), 2);
    }
}

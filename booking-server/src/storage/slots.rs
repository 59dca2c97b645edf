use super::{BookingStorage, SLOTS_TABLE, SLOT_KEYS_TABLE, StorageResult};
use chrono::{Datelike, NaiveDate, Timelike};
use redb::{ReadableTable, WriteTransaction};
use shared::models::{Slot, SlotKey};

type IndexKey = (i32, u32, u32);

fn index_key(key: &SlotKey) -> IndexKey {
    (
        key.date.num_days_from_ce(),
        key.start_time.num_seconds_from_midnight(),
        key.end_time.num_seconds_from_midnight(),
    )
}

fn day_range(date: NaiveDate) -> std::ops::RangeInclusive<IndexKey> {
    let day = date.num_days_from_ce();
    (day, 0, 0)..=(day, u32::MAX, u32::MAX)
}

fn load_slot(
    table: &impl ReadableTable<i64, &'static [u8]>,
    slot_id: i64,
) -> StorageResult<Option<Slot>> {
    match table.get(slot_id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

/// Slot ids for one date, ordered by start time (then end time)
fn ids_on_date(
    keys: &impl ReadableTable<IndexKey, i64>,
    date: NaiveDate,
) -> StorageResult<Vec<i64>> {
    let mut ids = Vec::new();
    for result in keys.range(day_range(date))? {
        let (_key, value) = result?;
        ids.push(value.value());
    }
    Ok(ids)
}

fn load_many(
    table: &impl ReadableTable<i64, &'static [u8]>,
    ids: &[i64],
) -> StorageResult<Vec<Slot>> {
    let mut slots = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(slot) = load_slot(table, *id)? {
            slots.push(slot);
        }
    }
    Ok(slots)
}

impl BookingStorage {
    // ========== Slot Operations ==========

    /// Insert or overwrite a slot and its unique key index
    ///
    /// The caller checks key uniqueness first (see [`Self::find_slot_id_txn`]).
    pub fn put_slot(&self, txn: &WriteTransaction, slot: &Slot) -> StorageResult<()> {
        let mut table = txn.open_table(SLOTS_TABLE)?;
        let value = serde_json::to_vec(slot)?;
        table.insert(slot.id, value.as_slice())?;

        let mut keys = txn.open_table(SLOT_KEYS_TABLE)?;
        keys.insert(index_key(&slot.key()), slot.id)?;
        Ok(())
    }

    pub fn get_slot(&self, slot_id: i64) -> StorageResult<Option<Slot>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SLOTS_TABLE)?;
        load_slot(&table, slot_id)
    }

    pub fn get_slot_txn(&self, txn: &WriteTransaction, slot_id: i64) -> StorageResult<Option<Slot>> {
        let table = txn.open_table(SLOTS_TABLE)?;
        load_slot(&table, slot_id)
    }

    /// Look up a slot id by its exact date+start+end
    pub fn find_slot_id_txn(
        &self,
        txn: &WriteTransaction,
        key: &SlotKey,
    ) -> StorageResult<Option<i64>> {
        let keys = txn.open_table(SLOT_KEYS_TABLE)?;
        Ok(keys.get(index_key(key))?.map(|g| g.value()))
    }

    /// All slots on a date ordered by start time
    pub fn slots_on_date(&self, date: NaiveDate) -> StorageResult<Vec<Slot>> {
        let read_txn = self.begin_read()?;
        let keys = read_txn.open_table(SLOT_KEYS_TABLE)?;
        let table = read_txn.open_table(SLOTS_TABLE)?;
        let ids = ids_on_date(&keys, date)?;
        load_many(&table, &ids)
    }

    pub fn slots_on_date_txn(
        &self,
        txn: &WriteTransaction,
        date: NaiveDate,
    ) -> StorageResult<Vec<Slot>> {
        let ids = {
            let keys = txn.open_table(SLOT_KEYS_TABLE)?;
            ids_on_date(&keys, date)?
        };
        let table = txn.open_table(SLOTS_TABLE)?;
        load_many(&table, &ids)
    }

    /// Slots in `[from, to]` ordered by date and start time
    pub fn slots_between(&self, from: NaiveDate, to: NaiveDate) -> StorageResult<Vec<Slot>> {
        if from > to {
            return Ok(Vec::new());
        }
        let read_txn = self.begin_read()?;
        let keys = read_txn.open_table(SLOT_KEYS_TABLE)?;
        let table = read_txn.open_table(SLOTS_TABLE)?;

        let start = (from.num_days_from_ce(), 0, 0);
        let end = (to.num_days_from_ce(), u32::MAX, u32::MAX);
        let mut ids = Vec::new();
        for result in keys.range(start..=end)? {
            let (_key, value) = result?;
            ids.push(value.value());
        }
        load_many(&table, &ids)
    }

    pub fn remove_slot(&self, txn: &WriteTransaction, slot: &Slot) -> StorageResult<()> {
        let mut table = txn.open_table(SLOTS_TABLE)?;
        table.remove(slot.id)?;
        let mut keys = txn.open_table(SLOT_KEYS_TABLE)?;
        keys.remove(index_key(&slot.key()))?;
        Ok(())
    }
}

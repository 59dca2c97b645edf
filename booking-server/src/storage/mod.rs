//! redb-based storage layer for slots, appointments, orders and payments
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `slots` | `slot_id` | `Slot` | Slot rows |
//! | `slot_keys` | `(day, start_secs, end_secs)` | `slot_id` | 唯一索引, 同时按日期+开始时间排序 |
//! | `appointments` | `appointment_id` | `Appointment` | Appointment rows |
//! | `active_bookings` | `(booker_key, slot_id)` | `appointment_id` | 同一预约人同一时段只能有一个有效预约 |
//! | `slot_appointments` | `(slot_id, appointment_id)` | `()` | Slot → appointments |
//! | `booker_appointments` | `(booker_key, appointment_id)` | `()` | Booker → appointments |
//! | `order_appointments` | `(order_id, appointment_id)` | `()` | Order → appointments |
//! | `orders` | `order_id` | `Order` | Order rows |
//! | `order_numbers` | `order_number` | `order_id` | 订单号唯一索引 |
//! | `payments` | `payment_id` | `Payment` | Payment rows |
//! | `order_payments` | `(order_id, payment_id)` | `()` | Order → payments |
//! | `transaction_payments` | `transaction_id` | `payment_id` | Provider transaction lookup |
//! | `counters` | `name` | `u64` | Order number counters |
//!
//! Values are JSON-serialized.
//!
//! # Atomicity
//!
//! redb allows a single write transaction at a time. Every booking runs its
//! capacity check, appointment insert and counter increment inside one
//! write transaction, so two concurrent bookings for the last seat are
//! serialized and the second one observes the incremented counter.

mod appointments;
mod orders;
mod slots;

use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const SLOTS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("slots");
const SLOT_KEYS_TABLE: TableDefinition<(i32, u32, u32), i64> = TableDefinition::new("slot_keys");

const APPOINTMENTS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("appointments");
const ACTIVE_BOOKINGS_TABLE: TableDefinition<(&str, i64), i64> =
    TableDefinition::new("active_bookings");
const SLOT_APPOINTMENTS_TABLE: TableDefinition<(i64, i64), ()> =
    TableDefinition::new("slot_appointments");
const BOOKER_APPOINTMENTS_TABLE: TableDefinition<(&str, i64), ()> =
    TableDefinition::new("booker_appointments");
const ORDER_APPOINTMENTS_TABLE: TableDefinition<(i64, i64), ()> =
    TableDefinition::new("order_appointments");

const ORDERS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("orders");
const ORDER_NUMBERS_TABLE: TableDefinition<&str, i64> = TableDefinition::new("order_numbers");
const PAYMENTS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("payments");
const ORDER_PAYMENTS_TABLE: TableDefinition<(i64, i64), ()> =
    TableDefinition::new("order_payments");
const TRANSACTION_PAYMENTS_TABLE: TableDefinition<&str, i64> =
    TableDefinition::new("transaction_payments");

const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blocking task failed: {0}")]
    Join(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for shared::AppError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "Storage failure");
        shared::AppError::storage(err.to_string())
    }
}

/// Booking storage backed by redb
#[derive(Clone)]
pub struct BookingStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for BookingStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingStorage").finish_non_exhaustive()
    }
}

impl BookingStorage {
    /// Open or create the database at the given path
    ///
    /// Commits are durable once `commit()` returns (redb default
    /// `Durability::Immediate`).
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// In-memory database, nothing survives a drop
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SLOTS_TABLE)?;
            let _ = write_txn.open_table(SLOT_KEYS_TABLE)?;
            let _ = write_txn.open_table(APPOINTMENTS_TABLE)?;
            let _ = write_txn.open_table(ACTIVE_BOOKINGS_TABLE)?;
            let _ = write_txn.open_table(SLOT_APPOINTMENTS_TABLE)?;
            let _ = write_txn.open_table(BOOKER_APPOINTMENTS_TABLE)?;
            let _ = write_txn.open_table(ORDER_APPOINTMENTS_TABLE)?;
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(ORDER_NUMBERS_TABLE)?;
            let _ = write_txn.open_table(PAYMENTS_TABLE)?;
            let _ = write_txn.open_table(ORDER_PAYMENTS_TABLE)?;
            let _ = write_txn.open_table(TRANSACTION_PAYMENTS_TABLE)?;
            let _ = write_txn.open_table(COUNTERS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a write transaction (blocks until the current writer commits)
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    pub fn begin_read(&self) -> StorageResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    pub fn commit(&self, txn: WriteTransaction) -> StorageResult<()> {
        Ok(txn.commit()?)
    }

    /// Run blocking storage work off the async runtime
    pub async fn run_blocking<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<StorageError> + Send + 'static,
        F: FnOnce(BookingStorage) -> Result<T, E> + Send + 'static,
    {
        let storage = self.clone();
        tokio::task::spawn_blocking(move || f(storage))
            .await
            .map_err(|e| E::from(StorageError::Join(e.to_string())))?
    }

    // ========== Counters ==========

    /// Increment a named counter and return the new value
    pub fn increment_counter(&self, txn: &WriteTransaction, name: &str) -> StorageResult<u64> {
        let mut table = txn.open_table(COUNTERS_TABLE)?;
        let current = table.get(name)?.map(|g| g.value()).unwrap_or(0);
        let next = current + 1;
        table.insert(name, next)?;
        Ok(next)
    }

    pub fn get_counter(&self, name: &str) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COUNTERS_TABLE)?;
        Ok(table.get(name)?.map(|g| g.value()).unwrap_or(0))
    }
}

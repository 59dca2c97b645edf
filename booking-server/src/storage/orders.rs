use super::{
    BookingStorage, ORDER_NUMBERS_TABLE, ORDER_PAYMENTS_TABLE, ORDERS_TABLE, PAYMENTS_TABLE,
    StorageResult, TRANSACTION_PAYMENTS_TABLE,
};
use redb::{ReadableTable, WriteTransaction};
use shared::models::{Order, Payment};

fn load<T: serde::de::DeserializeOwned>(
    table: &impl ReadableTable<i64, &'static [u8]>,
    id: i64,
) -> StorageResult<Option<T>> {
    match table.get(id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

impl BookingStorage {
    // ========== Order Operations ==========

    pub fn put_order(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        let mut table = txn.open_table(ORDERS_TABLE)?;
        let value = serde_json::to_vec(order)?;
        table.insert(order.id, value.as_slice())?;

        let mut numbers = txn.open_table(ORDER_NUMBERS_TABLE)?;
        numbers.insert(order.order_number.as_str(), order.id)?;
        Ok(())
    }

    pub fn get_order(&self, order_id: i64) -> StorageResult<Option<Order>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        load(&table, order_id)
    }

    pub fn get_order_txn(&self, txn: &WriteTransaction, order_id: i64) -> StorageResult<Option<Order>> {
        let table = txn.open_table(ORDERS_TABLE)?;
        load(&table, order_id)
    }

    pub fn find_order_by_number(&self, order_number: &str) -> StorageResult<Option<Order>> {
        let read_txn = self.begin_read()?;
        let numbers = read_txn.open_table(ORDER_NUMBERS_TABLE)?;
        let Some(order_id) = numbers.get(order_number)?.map(|g| g.value()) else {
            return Ok(None);
        };
        let table = read_txn.open_table(ORDERS_TABLE)?;
        load(&table, order_id)
    }

    pub fn order_number_exists_txn(
        &self,
        txn: &WriteTransaction,
        order_number: &str,
    ) -> StorageResult<bool> {
        let numbers = txn.open_table(ORDER_NUMBERS_TABLE)?;
        Ok(numbers.get(order_number)?.is_some())
    }

    // ========== Payment Operations ==========

    pub fn put_payment(&self, txn: &WriteTransaction, payment: &Payment) -> StorageResult<()> {
        let mut table = txn.open_table(PAYMENTS_TABLE)?;
        let previous: Option<Payment> = load(&table, payment.id)?;
        let value = serde_json::to_vec(payment)?;
        table.insert(payment.id, value.as_slice())?;

        let mut by_order = txn.open_table(ORDER_PAYMENTS_TABLE)?;
        by_order.insert((payment.order_id, payment.id), ())?;

        let mut by_txn = txn.open_table(TRANSACTION_PAYMENTS_TABLE)?;
        // 交易号被替换时删除旧索引
        if let Some(old) = previous.and_then(|p| p.transaction_id)
            && payment.transaction_id.as_deref() != Some(old.as_str())
        {
            let owned = by_txn.get(old.as_str())?.map(|g| g.value()) == Some(payment.id);
            if owned {
                by_txn.remove(old.as_str())?;
            }
        }
        if let Some(transaction_id) = payment.transaction_id.as_deref() {
            by_txn.insert(transaction_id, payment.id)?;
        }
        Ok(())
    }

    pub fn get_payment(&self, payment_id: i64) -> StorageResult<Option<Payment>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(PAYMENTS_TABLE)?;
        load(&table, payment_id)
    }

    pub fn get_payment_txn(
        &self,
        txn: &WriteTransaction,
        payment_id: i64,
    ) -> StorageResult<Option<Payment>> {
        let table = txn.open_table(PAYMENTS_TABLE)?;
        load(&table, payment_id)
    }

    /// Payment by provider transaction id (callback / webhook lookup)
    pub fn find_payment_by_transaction(&self, transaction_id: &str) -> StorageResult<Option<Payment>> {
        let read_txn = self.begin_read()?;
        let by_txn = read_txn.open_table(TRANSACTION_PAYMENTS_TABLE)?;
        let Some(payment_id) = by_txn.get(transaction_id)?.map(|g| g.value()) else {
            return Ok(None);
        };
        let table = read_txn.open_table(PAYMENTS_TABLE)?;
        load(&table, payment_id)
    }

    /// Payments of an order, oldest id first
    pub fn payments_for_order(&self, order_id: i64) -> StorageResult<Vec<Payment>> {
        let read_txn = self.begin_read()?;
        let by_order = read_txn.open_table(ORDER_PAYMENTS_TABLE)?;
        let table = read_txn.open_table(PAYMENTS_TABLE)?;

        let mut payments = Vec::new();
        for result in by_order.range((order_id, i64::MIN)..=(order_id, i64::MAX))? {
            let (key, _) = result?;
            if let Some(payment) = load(&table, key.value().1)? {
                payments.push(payment);
            }
        }
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::models::{OrderStatus, PaymentStatus};

    fn order(id: i64, number: &str) -> Order {
        Order {
            id,
            user_id: 1,
            service_id: 1,
            sub_service_id: None,
            destination_id: None,
            processing_time_id: None,
            order_number: number.to_string(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total_amount: Decimal::new(14000, 0),
            currency: "XAF".to_string(),
            additional_data: serde_json::Value::Null,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn payment(id: i64, order_id: i64, transaction_id: Option<&str>) -> Payment {
        Payment {
            id,
            order_id,
            user_id: 1,
            amount: Decimal::new(14000, 0),
            currency: "XAF".to_string(),
            payment_method: "mobile_money".to_string(),
            status: PaymentStatus::Pending,
            transaction_id: transaction_id.map(str::to_string),
            provider_token: None,
            payment_date: None,
            failure_reason: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_order_number_lookup() {
        let storage = BookingStorage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();
        storage.put_order(&txn, &order(1, "TRV2026101910001")).unwrap();
        assert!(storage.order_number_exists_txn(&txn, "TRV2026101910001").unwrap());
        txn.commit().unwrap();

        let found = storage.find_order_by_number("TRV2026101910001").unwrap().unwrap();
        assert_eq!(found.id, 1);
        assert!(storage.find_order_by_number("TRV2026101910002").unwrap().is_none());
    }

    #[test]
    fn test_payments_indexed_by_order_and_transaction() {
        let storage = BookingStorage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();
        storage.put_order(&txn, &order(1, "A")).unwrap();
        storage.put_payment(&txn, &payment(10, 1, Some("mock_txn_a"))).unwrap();
        storage.put_payment(&txn, &payment(11, 1, None)).unwrap();
        storage.put_payment(&txn, &payment(12, 2, None)).unwrap();
        txn.commit().unwrap();

        let ids: Vec<i64> = storage.payments_for_order(1).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(
            storage.find_payment_by_transaction("mock_txn_a").unwrap().map(|p| p.id),
            Some(10)
        );
        assert!(storage.find_payment_by_transaction("nope").unwrap().is_none());
    }

    #[test]
    fn test_replaced_transaction_id_drops_old_index() {
        let storage = BookingStorage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();
        storage.put_payment(&txn, &payment(10, 1, Some("mock_txn_a"))).unwrap();
        txn.commit().unwrap();

        let txn = storage.begin_write().unwrap();
        storage.put_payment(&txn, &payment(10, 1, Some("gateway_ref_b"))).unwrap();
        txn.commit().unwrap();

        assert!(storage.find_payment_by_transaction("mock_txn_a").unwrap().is_none());
        assert_eq!(
            storage.find_payment_by_transaction("gateway_ref_b").unwrap().map(|p| p.id),
            Some(10)
        );

        // 重写同一交易号不影响索引
        let txn = storage.begin_write().unwrap();
        storage.put_payment(&txn, &payment(10, 1, Some("gateway_ref_b"))).unwrap();
        txn.commit().unwrap();
        assert!(storage.find_payment_by_transaction("gateway_ref_b").unwrap().is_some());
    }
}

//! OrderManager - 订单与支付
//!
//! Checkout writes the order and (optionally) its appointment in one redb
//! write transaction: either both exist or neither does. Payment state is
//! driven by the provider's verification result and always reconciled
//! against the order through [`OrderStatusMachine`].
//!
//! Notifications go out after commit and never fail the operation.

use super::error::{OrderError, OrderResult};
use super::status::{OrderStatusMachine, StatusChange};
use crate::booking::{BookingRequest, appointment_payload, cancel_in_txn, reserve_slot};
use crate::core::Clock;
use crate::notify::Notifier;
use crate::payment::{PaymentProvider, TransactionStatus};
use crate::pricing::{PriceQuote, PriceRequest, PricingCalculator};
use crate::storage::BookingStorage;
use chrono_tz::Tz;
use redb::WriteTransaction;
use shared::NotificationKind;
use shared::models::{
    Appointment, Booker, Order, OrderStatus, Payment, PaymentStatus, Slot,
};
use shared::util::snowflake_id;
use std::sync::Arc;

/// Order number prefix: TRV{yyyymmdd}{10000+n}
const ORDER_NUMBER_PREFIX: &str = "TRV";
const ORDER_NUMBER_BASE: u64 = 10_000;

/// Checkout input
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub user_id: i64,
    pub service_id: i64,
    pub sub_service_id: Option<i64>,
    pub destination_id: Option<i64>,
    pub processing_time_id: Option<i64>,
    /// Form answers
    pub additional_data: serde_json::Value,
    /// Book this slot together with the order
    pub slot_id: Option<i64>,
    pub appointment_notes: Option<String>,
}

impl CheckoutRequest {
    pub fn new(user_id: i64, service_id: i64) -> Self {
        Self {
            user_id,
            service_id,
            sub_service_id: None,
            destination_id: None,
            processing_time_id: None,
            additional_data: serde_json::Value::Null,
            slot_id: None,
            appointment_notes: None,
        }
    }

    pub fn with_sub_service(mut self, sub_service_id: i64) -> Self {
        self.sub_service_id = Some(sub_service_id);
        self
    }

    pub fn with_destination(mut self, destination_id: i64) -> Self {
        self.destination_id = Some(destination_id);
        self
    }

    pub fn with_processing_time(mut self, processing_time_id: i64) -> Self {
        self.processing_time_id = Some(processing_time_id);
        self
    }

    pub fn with_slot(mut self, slot_id: i64) -> Self {
        self.slot_id = Some(slot_id);
        self
    }

    pub fn with_additional_data(mut self, data: serde_json::Value) -> Self {
        self.additional_data = data;
        self
    }

    fn price_request(&self) -> PriceRequest {
        PriceRequest {
            service_id: self.service_id,
            sub_service_id: self.sub_service_id,
            destination_id: self.destination_id,
            processing_time_id: self.processing_time_id,
            with_appointment: self.slot_id.is_some(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutResult {
    pub order: Order,
    pub appointment: Option<Appointment>,
    pub quote: PriceQuote,
}

/// Result of a payment state update
#[derive(Debug, Clone)]
pub struct PaymentUpdate {
    pub payment: Payment,
    pub order: Order,
    /// false: the payment was already in the requested state
    pub applied: bool,
    pub status_change: Option<StatusChange>,
}

impl PaymentUpdate {
    fn unchanged(payment: Payment, order: Order) -> Self {
        Self {
            payment,
            order,
            applied: false,
            status_change: None,
        }
    }
}

type Released = Vec<(Appointment, Option<Slot>)>;

// ========== Transaction helpers ==========

/// Allocate the next order number of `day` inside `txn`
///
/// The counter lives in the same transaction as the order, an aborted
/// checkout gives its number back.
fn allocate_order_number(
    storage: &BookingStorage,
    txn: &WriteTransaction,
    day: &str,
) -> OrderResult<String> {
    let counter = format!("order_number:{day}");
    loop {
        let n = storage.increment_counter(txn, &counter)?;
        let candidate = format!("{ORDER_NUMBER_PREFIX}{day}{}", ORDER_NUMBER_BASE + n);
        if !storage.order_number_exists_txn(txn, &candidate)? {
            return Ok(candidate);
        }
        tracing::warn!(order_number = %candidate, "Order number already taken, skipping");
    }
}

/// Cancel the order's active appointments, releasing slot capacity
fn release_appointments(
    storage: &BookingStorage,
    txn: &WriteTransaction,
    order_id: i64,
    reason: &str,
    now: i64,
) -> OrderResult<Released> {
    let mut released = Vec::new();
    for appointment in storage.appointments_for_order_txn(txn, order_id)? {
        if appointment.status.is_active() {
            released.push(cancel_in_txn(storage, txn, appointment.id, reason, now)?);
        }
    }
    Ok(released)
}

fn order_payload(order: &Order) -> serde_json::Value {
    serde_json::json!({
        "order_id": order.id,
        "order_number": order.order_number,
        "status": order.status.as_str(),
        "payment_status": order.payment_status.as_str(),
        "total_amount": order.total_amount.to_string(),
        "currency": order.currency,
    })
}

/// 订单管理器
#[derive(Clone)]
pub struct OrderManager {
    storage: BookingStorage,
    calculator: PricingCalculator,
    provider: Arc<dyn PaymentProvider>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl OrderManager {
    pub fn new(
        storage: BookingStorage,
        calculator: PricingCalculator,
        provider: Arc<dyn PaymentProvider>,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
        tz: Tz,
    ) -> Self {
        Self {
            storage,
            calculator,
            provider,
            notifier,
            clock,
            tz,
        }
    }

    pub fn calculator(&self) -> &PricingCalculator {
        &self.calculator
    }

    // ========== Checkout ==========

    /// Price and create an order, booking its slot in the same transaction
    pub async fn checkout(&self, request: CheckoutRequest) -> OrderResult<CheckoutResult> {
        let quote = self.calculator.quote(&request.price_request())?;
        let now = self.clock.now_millis();
        let day = self.clock.today(self.tz).format("%Y%m%d").to_string();
        let total = quote.total;
        let currency = quote.currency.clone();

        let (order, reserved) = self
            .storage
            .run_blocking(move |storage| -> OrderResult<(Order, Option<(Appointment, Slot)>)> {
                let txn = storage.begin_write()?;
                let order_number = allocate_order_number(&storage, &txn, &day)?;
                let order = Order {
                    id: snowflake_id(),
                    user_id: request.user_id,
                    service_id: request.service_id,
                    sub_service_id: request.sub_service_id,
                    destination_id: request.destination_id,
                    processing_time_id: request.processing_time_id,
                    order_number,
                    status: OrderStatus::Pending,
                    payment_status: PaymentStatus::Pending,
                    total_amount: total,
                    currency,
                    additional_data: request.additional_data,
                    created_at: now,
                    updated_at: now,
                };
                storage.put_order(&txn, &order)?;

                let reserved = match request.slot_id {
                    Some(slot_id) => {
                        let mut booking =
                            BookingRequest::new(Booker::registered(order.user_id), slot_id)
                                .with_order(order.id)
                                .with_service(order.service_id);
                        if let Some(notes) = request.appointment_notes {
                            booking = booking.with_notes(notes);
                        }
                        Some(reserve_slot(&storage, &txn, &booking, now)?)
                    }
                    None => None,
                };

                storage.commit(txn)?;
                Ok((order, reserved))
            })
            .await?;

        tracing::info!(
            order_id = order.id,
            order_number = %order.order_number,
            user_id = order.user_id,
            total = %order.total_amount,
            currency = %order.currency,
            slot_id = reserved.as_ref().map(|(_, slot)| slot.id),
            "Order created"
        );

        let owner = Booker::registered(order.user_id);
        self.notifier
            .send(owner.clone(), NotificationKind::OrderCreated, order_payload(&order))
            .await;

        let appointment = match reserved {
            Some((appointment, slot)) => {
                self.notifier
                    .send(
                        owner,
                        NotificationKind::AppointmentConfirmed,
                        appointment_payload(&appointment, Some(&slot)),
                    )
                    .await;
                Some(appointment)
            }
            None => None,
        };

        Ok(CheckoutResult {
            order,
            appointment,
            quote,
        })
    }

    // ========== Payments ==========

    /// Open a provider transaction and record a pending payment
    pub async fn initiate_payment(&self, order_id: i64, method: &str) -> OrderResult<Payment> {
        let order = self.get_order(order_id).await?;
        if order.payment_status == PaymentStatus::Completed {
            return Err(OrderError::AlreadyPaid(order_id));
        }
        if order.status != OrderStatus::Pending {
            return Err(OrderError::NotPayable {
                order_id,
                status: order.status,
            });
        }

        let handle = self
            .provider
            .initiate_transaction(&order, order.total_amount)
            .await
            .inspect_err(|e| {
                tracing::warn!(order_id, provider = self.provider.name(), error = %e, "Payment initiation failed");
            })?;

        let now = self.clock.now_millis();
        let payment = Payment {
            id: snowflake_id(),
            order_id,
            user_id: order.user_id,
            amount: order.total_amount,
            currency: order.currency.clone(),
            payment_method: method.to_string(),
            status: PaymentStatus::Pending,
            transaction_id: Some(handle.transaction_id),
            provider_token: handle.provider_token,
            payment_date: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        let stored = payment.clone();
        self.storage
            .run_blocking(move |storage| -> OrderResult<()> {
                let txn = storage.begin_write()?;
                storage.put_payment(&txn, &stored)?;
                storage.commit(txn)?;
                Ok(())
            })
            .await?;

        tracing::info!(
            order_id,
            payment_id = payment.id,
            transaction_id = ?payment.transaction_id,
            method,
            "Payment initiated"
        );
        Ok(payment)
    }

    /// Ask the provider for the transaction state and apply it
    ///
    /// Pending or ambiguous answers leave the payment as is. Provider errors
    /// are returned without touching the payment.
    pub async fn verify_payment(&self, payment_id: i64) -> OrderResult<PaymentUpdate> {
        let payment = self.get_payment(payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            let order = self.get_order(payment.order_id).await?;
            return Ok(PaymentUpdate::unchanged(payment, order));
        }

        let transaction_id = payment
            .transaction_id
            .clone()
            .ok_or(OrderError::MissingTransaction(payment_id))?;
        let status = self
            .provider
            .verify_transaction(&transaction_id)
            .await
            .inspect_err(|e| {
                tracing::warn!(payment_id, transaction_id = %transaction_id, error = %e, "Payment verification failed");
            })?;

        match status {
            TransactionStatus::Success => self.complete_payment(payment_id, None).await,
            TransactionStatus::Failed => {
                self.fail_payment(payment_id, "Payment failed at provider")
                    .await
            }
            TransactionStatus::Pending => {
                tracing::debug!(payment_id, transaction_id = %transaction_id, "Payment still pending");
                let order = self.get_order(payment.order_id).await?;
                Ok(PaymentUpdate::unchanged(payment, order))
            }
        }
    }

    /// Mark a payment completed (idempotent)
    ///
    /// Completing an already completed payment changes nothing and sends
    /// nothing.
    pub async fn complete_payment(
        &self,
        payment_id: i64,
        transaction_id: Option<String>,
    ) -> OrderResult<PaymentUpdate> {
        let now = self.clock.now_millis();
        let update = self
            .storage
            .run_blocking(move |storage| -> OrderResult<PaymentUpdate> {
                let txn = storage.begin_write()?;
                let (mut payment, mut order) = load_payment_and_order(&storage, &txn, payment_id)?;

                match payment.status {
                    PaymentStatus::Completed => return Ok(PaymentUpdate::unchanged(payment, order)),
                    PaymentStatus::Pending => {}
                    from => {
                        return Err(OrderError::InvalidPaymentTransition {
                            payment_id,
                            from,
                            to: PaymentStatus::Completed,
                        });
                    }
                }

                payment.status = PaymentStatus::Completed;
                payment.payment_date = Some(now);
                payment.updated_at = now;
                if let Some(transaction_id) = transaction_id {
                    payment.transaction_id = Some(transaction_id);
                }
                let status_change = OrderStatusMachine::apply_payment_completed(&mut order, now);

                storage.put_payment(&txn, &payment)?;
                storage.put_order(&txn, &order)?;
                storage.commit(txn)?;
                Ok(PaymentUpdate {
                    payment,
                    order,
                    applied: true,
                    status_change,
                })
            })
            .await?;

        if update.applied {
            tracing::info!(
                payment_id,
                order_id = update.order.id,
                amount = %update.payment.amount,
                "Payment completed"
            );
            let mut payload = order_payload(&update.order);
            payload["payment_id"] = serde_json::json!(update.payment.id);
            payload["amount"] = serde_json::json!(update.payment.amount.to_string());
            payload["transaction_id"] = serde_json::json!(update.payment.transaction_id);
            self.notifier
                .send(
                    Booker::registered(update.payment.user_id),
                    NotificationKind::PaymentCompleted,
                    payload,
                )
                .await;
        } else {
            tracing::debug!(payment_id, "Payment already completed, nothing to do");
        }
        if let Some(change) = update.status_change {
            self.notify_status_change(&update.order, change).await;
        }
        Ok(update)
    }

    /// Mark a pending payment failed
    pub async fn fail_payment(&self, payment_id: i64, reason: &str) -> OrderResult<PaymentUpdate> {
        let now = self.clock.now_millis();
        let reason = reason.trim().to_string();
        let update = self
            .storage
            .run_blocking(move |storage| -> OrderResult<PaymentUpdate> {
                let txn = storage.begin_write()?;
                let (mut payment, mut order) = load_payment_and_order(&storage, &txn, payment_id)?;

                match payment.status {
                    PaymentStatus::Failed => return Ok(PaymentUpdate::unchanged(payment, order)),
                    PaymentStatus::Pending => {}
                    from => {
                        return Err(OrderError::InvalidPaymentTransition {
                            payment_id,
                            from,
                            to: PaymentStatus::Failed,
                        });
                    }
                }

                payment.status = PaymentStatus::Failed;
                payment.failure_reason = (!reason.is_empty()).then_some(reason);
                payment.updated_at = now;
                let status_change = OrderStatusMachine::apply_payment_failed(&mut order, now);

                storage.put_payment(&txn, &payment)?;
                storage.put_order(&txn, &order)?;
                storage.commit(txn)?;
                Ok(PaymentUpdate {
                    payment,
                    order,
                    applied: true,
                    status_change,
                })
            })
            .await?;

        if update.applied {
            tracing::info!(
                payment_id,
                order_id = update.order.id,
                reason = ?update.payment.failure_reason,
                "Payment failed"
            );
        }
        if let Some(change) = update.status_change {
            self.notify_status_change(&update.order, change).await;
        }
        Ok(update)
    }

    /// completed → refunded
    ///
    /// A processing order is cancelled and its appointments released.
    pub async fn refund_payment(&self, payment_id: i64) -> OrderResult<PaymentUpdate> {
        let now = self.clock.now_millis();
        let (update, released) = self
            .storage
            .run_blocking(move |storage| -> OrderResult<(PaymentUpdate, Released)> {
                let txn = storage.begin_write()?;
                let (mut payment, mut order) = load_payment_and_order(&storage, &txn, payment_id)?;

                match payment.status {
                    PaymentStatus::Refunded => {
                        return Ok((PaymentUpdate::unchanged(payment, order), Vec::new()));
                    }
                    PaymentStatus::Completed => {}
                    from => {
                        return Err(OrderError::InvalidPaymentTransition {
                            payment_id,
                            from,
                            to: PaymentStatus::Refunded,
                        });
                    }
                }

                payment.status = PaymentStatus::Refunded;
                payment.updated_at = now;
                let status_change = OrderStatusMachine::apply_refund(&mut order, now);
                let released = match status_change {
                    Some(change) if change.to == OrderStatus::Cancelled => {
                        release_appointments(&storage, &txn, order.id, "Order refunded", now)?
                    }
                    _ => Vec::new(),
                };

                storage.put_payment(&txn, &payment)?;
                storage.put_order(&txn, &order)?;
                storage.commit(txn)?;
                Ok((
                    PaymentUpdate {
                        payment,
                        order,
                        applied: true,
                        status_change,
                    },
                    released,
                ))
            })
            .await?;

        if update.applied {
            tracing::info!(
                payment_id,
                order_id = update.order.id,
                amount = %update.payment.amount,
                released = released.len(),
                "Payment refunded"
            );
        }
        if let Some(change) = update.status_change {
            self.notify_status_change(&update.order, change).await;
        }
        self.notify_released(released).await;
        Ok(update)
    }

    // ========== Order lifecycle ==========

    /// pending / processing → cancelled, releasing booked slots
    pub async fn cancel_order(&self, order_id: i64, reason: &str) -> OrderResult<Order> {
        let now = self.clock.now_millis();
        let reason = reason.to_string();
        let (order, change, released) = self
            .storage
            .run_blocking(
                move |storage| -> OrderResult<(Order, Option<StatusChange>, Released)> {
                    let txn = storage.begin_write()?;
                    let mut order = storage
                        .get_order_txn(&txn, order_id)?
                        .ok_or(OrderError::OrderNotFound(order_id))?;

                    if !matches!(order.status, OrderStatus::Pending | OrderStatus::Processing) {
                        return Err(OrderError::NotCancellable {
                            order_id,
                            status: order.status,
                        });
                    }

                    let change =
                        OrderStatusMachine::transition(&mut order, OrderStatus::Cancelled, now)?;
                    let released = release_appointments(&storage, &txn, order_id, &reason, now)?;
                    storage.put_order(&txn, &order)?;
                    storage.commit(txn)?;
                    Ok((order, change, released))
                },
            )
            .await?;

        tracing::info!(
            order_id,
            order_number = %order.order_number,
            released = released.len(),
            "Order cancelled"
        );
        if let Some(change) = change {
            self.notify_status_change(&order, change).await;
        }
        self.notify_released(released).await;
        Ok(order)
    }

    /// processing → completed
    pub async fn complete_order(&self, order_id: i64) -> OrderResult<Order> {
        let now = self.clock.now_millis();
        let (order, change) = self
            .storage
            .run_blocking(move |storage| -> OrderResult<(Order, Option<StatusChange>)> {
                let txn = storage.begin_write()?;
                let mut order = storage
                    .get_order_txn(&txn, order_id)?
                    .ok_or(OrderError::OrderNotFound(order_id))?;
                let change = OrderStatusMachine::transition(&mut order, OrderStatus::Completed, now)?;
                if change.is_some() {
                    storage.put_order(&txn, &order)?;
                    storage.commit(txn)?;
                }
                Ok((order, change))
            })
            .await?;

        if let Some(change) = change {
            tracing::info!(order_id, order_number = %order.order_number, "Order completed");
            self.notify_status_change(&order, change).await;
        }
        Ok(order)
    }

    /// Ask the order owner for supporting documents
    ///
    /// Returns whether the notification was accepted by the sink.
    pub async fn request_documents(&self, order_id: i64, documents: &[String]) -> OrderResult<bool> {
        let order = self.get_order(order_id).await?;
        let mut payload = order_payload(&order);
        payload["documents"] = serde_json::json!(documents);

        tracing::info!(order_id, count = documents.len(), "Documents requested");
        Ok(self
            .notifier
            .send(
                Booker::registered(order.user_id),
                NotificationKind::DocumentsRequired,
                payload,
            )
            .await)
    }

    // ========== Lookups ==========

    pub async fn get_order(&self, order_id: i64) -> OrderResult<Order> {
        self.storage
            .run_blocking(move |storage| -> OrderResult<Order> {
                storage
                    .get_order(order_id)?
                    .ok_or(OrderError::OrderNotFound(order_id))
            })
            .await
    }

    pub async fn find_order_by_number(&self, order_number: &str) -> OrderResult<Order> {
        let order_number = order_number.trim().to_string();
        self.storage
            .run_blocking(move |storage| -> OrderResult<Order> {
                storage
                    .find_order_by_number(&order_number)?
                    .ok_or(OrderError::OrderNumberNotFound(order_number))
            })
            .await
    }

    pub async fn get_payment(&self, payment_id: i64) -> OrderResult<Payment> {
        self.storage
            .run_blocking(move |storage| -> OrderResult<Payment> {
                storage
                    .get_payment(payment_id)?
                    .ok_or(OrderError::PaymentNotFound(payment_id))
            })
            .await
    }

    /// Payment for a provider callback
    pub async fn find_payment_by_transaction(&self, transaction_id: &str) -> OrderResult<Option<Payment>> {
        let transaction_id = transaction_id.to_string();
        self.storage
            .run_blocking(move |storage| -> OrderResult<Option<Payment>> {
                Ok(storage.find_payment_by_transaction(&transaction_id)?)
            })
            .await
    }

    pub async fn payments_for_order(&self, order_id: i64) -> OrderResult<Vec<Payment>> {
        self.storage
            .run_blocking(move |storage| -> OrderResult<Vec<Payment>> {
                Ok(storage.payments_for_order(order_id)?)
            })
            .await
    }

    pub async fn appointments_for_order(&self, order_id: i64) -> OrderResult<Vec<Appointment>> {
        self.storage
            .run_blocking(move |storage| -> OrderResult<Vec<Appointment>> {
                Ok(storage.appointments_for_order(order_id)?)
            })
            .await
    }

    // ========== Notifications ==========

    async fn notify_status_change(&self, order: &Order, change: StatusChange) {
        tracing::info!(
            order_id = order.id,
            from = %change.from,
            to = %change.to,
            "Order status changed"
        );
        let mut payload = order_payload(order);
        payload["from"] = serde_json::json!(change.from.as_str());
        payload["to"] = serde_json::json!(change.to.as_str());
        self.notifier
            .send(
                Booker::registered(order.user_id),
                NotificationKind::OrderStatusChanged,
                payload,
            )
            .await;
    }

    async fn notify_released(&self, released: Released) {
        for (appointment, slot) in released {
            self.notifier
                .send(
                    appointment.booker.clone(),
                    NotificationKind::AppointmentCancelled,
                    appointment_payload(&appointment, slot.as_ref()),
                )
                .await;
        }
    }
}

fn load_payment_and_order(
    storage: &BookingStorage,
    txn: &WriteTransaction,
    payment_id: i64,
) -> OrderResult<(Payment, Order)> {
    let payment = storage
        .get_payment_txn(txn, payment_id)?
        .ok_or(OrderError::PaymentNotFound(payment_id))?;
    let order = storage
        .get_order_txn(txn, payment.order_id)?
        .ok_or(OrderError::OrderNotFound(payment.order_id))?;
    Ok((payment, order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::BookingError;
    use crate::core::{FixedClock, PricingConfig};
    use crate::notify::MemoryNotificationSink;
    use crate::payment::{MockPaymentProvider, ProviderError};
    use crate::pricing::{PricingCatalog, PricingError};
    use crate::slots::SlotAdmin;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use shared::models::{
        AppointmentFeeMode, AppointmentStatus, Destination, Service, ServiceDestinationPricing,
    };

    struct Harness {
        orders: OrderManager,
        admin: SlotAdmin,
        storage: BookingStorage,
        provider: Arc<MockPaymentProvider>,
        sink: Arc<MemoryNotificationSink>,
    }

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    /// Monday 2026-10-19 07:00 UTC
    fn harness() -> Harness {
        let storage = BookingStorage::open_in_memory().unwrap();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 10, 19, 7, 0, 0).unwrap(),
        ));
        let catalog = PricingCatalog::new();
        catalog.upsert_service(Service {
            id: 1,
            name: "Visa assistance".into(),
            price: dec(10000),
            appointment_fee: None,
            appointment_fee_mode: AppointmentFeeMode::ServicePlusAppointment,
            requires_appointment: true,
            is_active: true,
        });
        catalog.upsert_destination(Destination {
            id: 7,
            name: "France".into(),
            country_code: Some("FR".into()),
        });
        catalog.set_destination_price(ServiceDestinationPricing {
            service_id: 1,
            destination_id: 7,
            price: dec(12000),
        });

        let provider = Arc::new(MockPaymentProvider::new());
        let sink = Arc::new(MemoryNotificationSink::new());
        let orders = OrderManager::new(
            storage.clone(),
            PricingCalculator::new(catalog, PricingConfig::default()),
            provider.clone(),
            Notifier::new(sink.clone()),
            clock.clone(),
            chrono_tz::UTC,
        );
        let admin = SlotAdmin::new(storage.clone(), clock);
        Harness {
            orders,
            admin,
            storage,
            provider,
            sink,
        }
    }

    fn slot(h: &Harness, max: u32) -> Slot {
        h.admin
            .create_slot(
                NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                max,
                None,
            )
            .unwrap()
    }

    async fn paid_order(h: &Harness, request: CheckoutRequest) -> (Order, Payment) {
        let order = h.orders.checkout(request).await.unwrap().order;
        let payment = h.orders.initiate_payment(order.id, "MOBILE_MONEY").await.unwrap();
        h.provider.set_status(
            payment.transaction_id.as_deref().unwrap(),
            TransactionStatus::Success,
        );
        let update = h.orders.verify_payment(payment.id).await.unwrap();
        (update.order, update.payment)
    }

    #[tokio::test]
    async fn test_checkout_with_slot() {
        let h = harness();
        let slot = slot(&h, 2);

        let result = h
            .orders
            .checkout(
                CheckoutRequest::new(5, 1)
                    .with_destination(7)
                    .with_slot(slot.id)
                    .with_additional_data(serde_json::json!({"passport": "AA123"})),
            )
            .await
            .unwrap();

        // 12000 destination override + 2000 default appointment fee
        assert_eq!(result.quote.total, dec(14000));
        assert_eq!(result.order.total_amount, dec(14000));
        assert_eq!(result.order.order_number, "TRV2026101910001");
        assert_eq!(result.order.status, OrderStatus::Pending);
        assert_eq!(result.order.payment_status, PaymentStatus::Pending);

        let appointment = result.appointment.unwrap();
        assert_eq!(appointment.order_id, Some(result.order.id));
        assert_eq!(appointment.booker, Booker::registered(5));
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);
        assert_eq!(h.storage.get_slot(slot.id).unwrap().unwrap().current_bookings, 1);

        let second = h.orders.checkout(CheckoutRequest::new(6, 1)).await.unwrap();
        assert_eq!(second.order.order_number, "TRV2026101910002");
        assert_eq!(second.order.total_amount, dec(10000));
        assert!(second.appointment.is_none());

        assert_eq!(h.sink.count(NotificationKind::OrderCreated), 2);
        assert_eq!(h.sink.count(NotificationKind::AppointmentConfirmed), 1);

        let found = h.orders.find_order_by_number("TRV2026101910001").await.unwrap();
        assert_eq!(found.id, result.order.id);
        assert_eq!(h.orders.appointments_for_order(found.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_checkout_is_atomic() {
        let h = harness();
        let slot = slot(&h, 1);

        h.orders
            .checkout(CheckoutRequest::new(5, 1).with_slot(slot.id))
            .await
            .unwrap();
        let err = h
            .orders
            .checkout(CheckoutRequest::new(6, 1).with_slot(slot.id))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::Booking(BookingError::SlotUnavailable { .. })
        ));

        // 失败的下单不留订单, 也不消耗单号
        assert!(matches!(
            h.orders.find_order_by_number("TRV2026101910002").await,
            Err(OrderError::OrderNumberNotFound(_))
        ));
        let next = h.orders.checkout(CheckoutRequest::new(6, 1)).await.unwrap();
        assert_eq!(next.order.order_number, "TRV2026101910002");
        assert_eq!(h.sink.count(NotificationKind::OrderCreated), 2);
    }

    #[tokio::test]
    async fn test_checkout_pricing_error_writes_nothing() {
        let h = harness();
        let err = h
            .orders
            .checkout(CheckoutRequest::new(5, 1).with_destination(99))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Pricing(PricingError::InputMissing { .. })));
        assert_eq!(h.storage.get_counter("order_number:20261019").unwrap(), 0);
        assert!(h.sink.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_payment_completion_is_idempotent() {
        let h = harness();
        let (order, payment) = paid_order(&h, CheckoutRequest::new(5, 1)).await;
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.payment_status, PaymentStatus::Completed);
        assert!(payment.is_completed());
        assert!(payment.payment_date.is_some());

        let again = h.orders.complete_payment(payment.id, None).await.unwrap();
        assert!(!again.applied);
        assert!(again.status_change.is_none());
        let verified = h.orders.verify_payment(payment.id).await.unwrap();
        assert!(!verified.applied);

        assert_eq!(h.sink.count(NotificationKind::PaymentCompleted), 1);
        assert_eq!(h.sink.count(NotificationKind::OrderStatusChanged), 1);

        assert!(matches!(
            h.orders.initiate_payment(order.id, "CARD").await,
            Err(OrderError::AlreadyPaid(_))
        ));
        let by_txn = h
            .orders
            .find_payment_by_transaction(payment.transaction_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_txn.id, payment.id);
    }

    #[tokio::test]
    async fn test_complete_with_new_transaction_id_reindexes() {
        let h = harness();
        let order = h.orders.checkout(CheckoutRequest::new(5, 1)).await.unwrap().order;
        let payment = h.orders.initiate_payment(order.id, "MOBILE_MONEY").await.unwrap();
        let initial = payment.transaction_id.clone().unwrap();

        let update = h
            .orders
            .complete_payment(payment.id, Some("gateway_ref_42".to_string()))
            .await
            .unwrap();
        assert!(update.applied);
        assert_eq!(update.payment.transaction_id.as_deref(), Some("gateway_ref_42"));

        assert!(h.orders.find_payment_by_transaction(&initial).await.unwrap().is_none());
        let found = h
            .orders
            .find_payment_by_transaction("gateway_ref_42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, payment.id);
    }

    #[tokio::test]
    async fn test_payment_failure_fails_order() {
        let h = harness();
        let order = h.orders.checkout(CheckoutRequest::new(5, 1)).await.unwrap().order;
        let payment = h.orders.initiate_payment(order.id, "CARD").await.unwrap();
        h.provider.set_status(
            payment.transaction_id.as_deref().unwrap(),
            TransactionStatus::Failed,
        );

        let update = h.orders.verify_payment(payment.id).await.unwrap();
        assert_eq!(update.payment.status, PaymentStatus::Failed);
        assert_eq!(update.payment.failure_reason.as_deref(), Some("Payment failed at provider"));
        assert_eq!(update.order.status, OrderStatus::Failed);
        assert_eq!(update.order.payment_status, PaymentStatus::Failed);

        // 失败的订单不可再付款, 也不可被迟到的成功回调修改
        assert!(matches!(
            h.orders.initiate_payment(order.id, "CARD").await,
            Err(OrderError::NotPayable { .. })
        ));
        assert!(matches!(
            h.orders.complete_payment(payment.id, None).await,
            Err(OrderError::InvalidPaymentTransition { .. })
        ));
        assert_eq!(h.sink.count(NotificationKind::OrderStatusChanged), 1);
    }

    #[tokio::test]
    async fn test_verify_pending_and_provider_errors() {
        let h = harness();
        let order = h.orders.checkout(CheckoutRequest::new(5, 1)).await.unwrap().order;
        let payment = h.orders.initiate_payment(order.id, "CARD").await.unwrap();

        let update = h.orders.verify_payment(payment.id).await.unwrap();
        assert!(!update.applied);
        assert_eq!(update.payment.status, PaymentStatus::Pending);

        h.provider.set_unavailable(true);
        assert!(matches!(
            h.orders.verify_payment(payment.id).await,
            Err(OrderError::Provider(ProviderError::Unavailable(_)))
        ));
        assert!(matches!(
            h.orders.initiate_payment(order.id, "CARD").await,
            Err(OrderError::Provider(_))
        ));
        let stored = h.orders.get_payment(payment.id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(h.orders.payments_for_order(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_order_releases_slot() {
        let h = harness();
        let slot = slot(&h, 1);
        let order = h
            .orders
            .checkout(CheckoutRequest::new(5, 1).with_slot(slot.id))
            .await
            .unwrap()
            .order;

        let cancelled = h.orders.cancel_order(order.id, "Trip postponed").await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(h.storage.get_slot(slot.id).unwrap().unwrap().current_bookings, 0);

        let appointments = h.orders.appointments_for_order(order.id).await.unwrap();
        assert_eq!(appointments[0].status, AppointmentStatus::Cancelled);
        assert_eq!(appointments[0].notes.as_deref(), Some("Trip postponed"));
        assert_eq!(h.sink.count(NotificationKind::AppointmentCancelled), 1);
        assert_eq!(h.sink.count(NotificationKind::OrderStatusChanged), 1);

        assert!(matches!(
            h.orders.cancel_order(order.id, "again").await,
            Err(OrderError::NotCancellable { .. })
        ));
    }

    #[tokio::test]
    async fn test_refund_cancels_processing_order() {
        let h = harness();
        let slot = slot(&h, 1);
        let (order, payment) = paid_order(&h, CheckoutRequest::new(5, 1).with_slot(slot.id)).await;
        assert_eq!(order.status, OrderStatus::Processing);

        let update = h.orders.refund_payment(payment.id).await.unwrap();
        assert_eq!(update.payment.status, PaymentStatus::Refunded);
        assert_eq!(update.order.status, OrderStatus::Cancelled);
        assert_eq!(update.order.payment_status, PaymentStatus::Refunded);
        assert_eq!(h.storage.get_slot(slot.id).unwrap().unwrap().current_bookings, 0);

        let again = h.orders.refund_payment(payment.id).await.unwrap();
        assert!(!again.applied);
        // processing 与 cancelled 各一次
        assert_eq!(h.sink.count(NotificationKind::OrderStatusChanged), 2);
    }

    #[tokio::test]
    async fn test_complete_order() {
        let h = harness();
        let pending = h.orders.checkout(CheckoutRequest::new(5, 1)).await.unwrap().order;
        assert!(matches!(
            h.orders.complete_order(pending.id).await,
            Err(OrderError::InvalidTransition { .. })
        ));

        let (order, _) = paid_order(&h, CheckoutRequest::new(6, 1)).await;
        let done = h.orders.complete_order(order.id).await.unwrap();
        assert_eq!(done.status, OrderStatus::Completed);
        assert!(matches!(
            h.orders.cancel_order(order.id, "").await,
            Err(OrderError::NotCancellable { .. })
        ));
        // Repeated completion is a no-op
        h.orders.complete_order(order.id).await.unwrap();
        assert_eq!(h.sink.count(NotificationKind::OrderStatusChanged), 2);
    }

    #[tokio::test]
    async fn test_request_documents() {
        let h = harness();
        let order = h.orders.checkout(CheckoutRequest::new(5, 1)).await.unwrap().order;
        let docs = vec!["passport".to_string(), "bank statement".to_string()];
        assert!(h.orders.request_documents(order.id, &docs).await.unwrap());

        let sent = h.sink.notifications();
        let last = sent.last().unwrap();
        assert_eq!(last.kind, NotificationKind::DocumentsRequired);
        assert_eq!(last.recipient, Booker::registered(5));
        assert_eq!(last.payload["documents"][1], "bank statement");

        assert!(matches!(
            h.orders.request_documents(12345, &docs).await,
            Err(OrderError::OrderNotFound(12345))
        ));
    }
}

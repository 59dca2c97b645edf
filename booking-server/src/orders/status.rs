//! OrderStatusMachine - 订单状态流转
//!
//! ```text
//! pending ──payment ok──▶ processing ──▶ completed
//!    │                        │
//!    ├──payment failed──▶ failed ◀──┤
//!    └──────cancel──────▶ cancelled ◀┘ (cancel / refund)
//! ```
//!
//! `processing` is only ever reached with a completed payment. Terminal
//! orders (completed / cancelled / failed) never move again; a retry is a
//! new order.

use super::error::{OrderError, OrderResult};
use shared::models::{Order, OrderStatus, PaymentStatus};

/// An applied order status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

pub struct OrderStatusMachine;

impl OrderStatusMachine {
    pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (from, to),
            (Pending, Processing | Cancelled | Failed) | (Processing, Completed | Cancelled | Failed)
        )
    }

    /// Manual transition (cancel / complete / ...)
    ///
    /// Moving to the current status is a no-op returning `None`.
    pub fn transition(order: &mut Order, to: OrderStatus, now: i64) -> OrderResult<Option<StatusChange>> {
        if order.status == to {
            return Ok(None);
        }
        let paid = order.payment_status == PaymentStatus::Completed;
        if !Self::can_transition(order.status, to) || (to == OrderStatus::Processing && !paid) {
            return Err(OrderError::InvalidTransition {
                order_id: order.id,
                from: order.status,
                to,
            });
        }
        Ok(Some(Self::set(order, to, now)))
    }

    /// A payment for this order completed
    pub fn apply_payment_completed(order: &mut Order, now: i64) -> Option<StatusChange> {
        if order.status.is_terminal() {
            // 终态订单不再变化, 付款记录本身仍标记为完成
            tracing::warn!(
                order_id = order.id,
                status = %order.status,
                "Payment completed on a terminal order, order left unchanged"
            );
            return None;
        }
        order.payment_status = PaymentStatus::Completed;
        order.updated_at = now;
        match order.status {
            OrderStatus::Pending => Some(Self::set(order, OrderStatus::Processing, now)),
            _ => None,
        }
    }

    /// A payment for this order failed
    ///
    /// Only an unpaid pending order fails; an order already paid through
    /// another payment keeps its state.
    ///
    /// A `processing` order is left alone even though it is not terminal:
    /// processing means another payment already completed, so one failed
    /// attempt must not fail a paid order.
    pub fn apply_payment_failed(order: &mut Order, now: i64) -> Option<StatusChange> {
        if order.status != OrderStatus::Pending || order.payment_status == PaymentStatus::Completed
        {
            return None;
        }
        order.payment_status = PaymentStatus::Failed;
        Some(Self::set(order, OrderStatus::Failed, now))
    }

    /// The completed payment was refunded
    pub fn apply_refund(order: &mut Order, now: i64) -> Option<StatusChange> {
        if order.payment_status != PaymentStatus::Completed {
            return None;
        }
        order.payment_status = PaymentStatus::Refunded;
        order.updated_at = now;
        match order.status {
            OrderStatus::Processing => Some(Self::set(order, OrderStatus::Cancelled, now)),
            _ => None,
        }
    }

    fn set(order: &mut Order, to: OrderStatus, now: i64) -> StatusChange {
        let change = StatusChange {
            from: order.status,
            to,
        };
        order.status = to;
        order.updated_at = now;
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn order(status: OrderStatus, payment_status: PaymentStatus) -> Order {
        Order {
            id: 1,
            user_id: 1,
            service_id: 1,
            sub_service_id: None,
            destination_id: None,
            processing_time_id: None,
            order_number: "TRV2026101910001".into(),
            status,
            payment_status,
            total_amount: Decimal::new(14000, 0),
            currency: "XAF".into(),
            additional_data: serde_json::Value::Null,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        let all = [Pending, Processing, Completed, Cancelled, Failed];
        for from in all {
            for to in all {
                let expected = matches!(
                    (from, to),
                    (Pending, Processing)
                        | (Pending, Cancelled)
                        | (Pending, Failed)
                        | (Processing, Completed)
                        | (Processing, Cancelled)
                        | (Processing, Failed)
                );
                assert_eq!(
                    OrderStatusMachine::can_transition(from, to),
                    expected,
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_processing_requires_payment() {
        let mut o = order(OrderStatus::Pending, PaymentStatus::Pending);
        assert!(matches!(
            OrderStatusMachine::transition(&mut o, OrderStatus::Processing, 5),
            Err(OrderError::InvalidTransition { .. })
        ));

        let change = OrderStatusMachine::apply_payment_completed(&mut o, 5).unwrap();
        assert_eq!(change.from, OrderStatus::Pending);
        assert_eq!(change.to, OrderStatus::Processing);
        assert!(o.is_consistent());
        assert_eq!(o.updated_at, 5);

        // 重复到账不再产生状态变化
        assert!(OrderStatusMachine::apply_payment_completed(&mut o, 6).is_none());
        assert_eq!(o.status, OrderStatus::Processing);
    }

    #[test]
    fn test_terminal_orders_do_not_move() {
        let mut o = order(OrderStatus::Cancelled, PaymentStatus::Pending);
        assert!(OrderStatusMachine::apply_payment_completed(&mut o, 1).is_none());
        assert_eq!(o.status, OrderStatus::Cancelled);
        assert_eq!(o.payment_status, PaymentStatus::Pending);
        assert!(
            OrderStatusMachine::transition(&mut o, OrderStatus::Pending, 1).is_err()
        );
        assert!(OrderStatusMachine::transition(&mut o, OrderStatus::Cancelled, 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_payment_failure() {
        let mut o = order(OrderStatus::Pending, PaymentStatus::Pending);
        let change = OrderStatusMachine::apply_payment_failed(&mut o, 1).unwrap();
        assert_eq!(change.to, OrderStatus::Failed);
        assert_eq!(o.payment_status, PaymentStatus::Failed);

        // 已通过其他付款到账的订单不受影响
        let mut paid = order(OrderStatus::Processing, PaymentStatus::Completed);
        assert!(OrderStatusMachine::apply_payment_failed(&mut paid, 1).is_none());
        assert_eq!(paid.status, OrderStatus::Processing);
        assert_eq!(paid.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn test_refund() {
        let mut o = order(OrderStatus::Processing, PaymentStatus::Completed);
        let change = OrderStatusMachine::apply_refund(&mut o, 1).unwrap();
        assert_eq!(change.to, OrderStatus::Cancelled);
        assert_eq!(o.payment_status, PaymentStatus::Refunded);

        let mut done = order(OrderStatus::Completed, PaymentStatus::Completed);
        assert!(OrderStatusMachine::apply_refund(&mut done, 1).is_none());
        assert_eq!(done.status, OrderStatus::Completed);
        assert_eq!(done.payment_status, PaymentStatus::Refunded);
    }
}

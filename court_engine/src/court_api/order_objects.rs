use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType, Paise, Payment, PaymentMethod};

/// An order together with its sub-orders and its payment.
///
/// For a parent order, `aggregate_status` summarises where the sub-orders are. For any other order it is simply the
/// order's own status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWithChildren {
    pub order: Order,
    pub sub_orders: Vec<Order>,
    pub payment: Option<Payment>,
    pub aggregate_status: OrderStatusType,
}

impl OrderWithChildren {
    pub fn new(order: Order, sub_orders: Vec<Order>, payment: Option<Payment>) -> Self {
        let aggregate_status = aggregate_status(&order, &sub_orders);
        Self { order, sub_orders, payment, aggregate_status }
    }
}

/// The status a customer should see for a split checkout.
///
/// While any sub-order is live, the checkout is only as far along as its slowest live sub-order. Once all of them are
/// terminal, it is completed if any vendor delivered, rejected if every vendor rejected, and cancelled otherwise.
pub fn aggregate_status(order: &Order, sub_orders: &[Order]) -> OrderStatusType {
    if sub_orders.is_empty() {
        return order.status;
    }
    let slowest_live = sub_orders.iter().filter(|o| !o.status.is_terminal()).map(|o| o.status).min_by_key(|s| s.rank());
    if let Some(status) = slowest_live {
        return status;
    }
    if sub_orders.iter().any(|o| o.status == OrderStatusType::Completed) {
        OrderStatusType::Completed
    } else if sub_orders.iter().all(|o| o.status == OrderStatusType::Rejected) {
        OrderStatusType::Rejected
    } else {
        OrderStatusType::Cancelled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOrderLine {
    pub menu_item_id: String,
    pub quantity: i64,
    /// A price agreed at the counter. Defaults to the menu price.
    #[serde(default)]
    pub unit_price: Option<Paise>,
    #[serde(default)]
    pub customizations: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOrderRequest {
    pub vendor_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub lines: Vec<ManualOrderLine>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOrderResult {
    pub order: Order,
    pub payment: Payment,
    pub ack_token: String,
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db_types::{OrderPaymentStatus, StatusHistory};
    use OrderStatusType::*;

    fn order(id: i64, status: OrderStatusType) -> Order {
        let now = Utc::now();
        Order {
            id,
            order_number: format!("ORD-{id}"),
            court_id: "c1".into(),
            parent_order_id: Some(1),
            is_sub_order: true,
            vendor_id: Some(format!("v{id}")),
            customer_id: "asha".into(),
            status,
            subtotal: 100.into(),
            total: 100.into(),
            payment_status: OrderPaymentStatus::Paid,
            payment_method: PaymentMethod::Online,
            cancellation_reason: None,
            rating: None,
            version: 1,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            preparing_at: None,
            ready_at: None,
            completed_at: None,
            cancelled_at: None,
            lines: vec![],
            history: StatusHistory::default(),
        }
    }

    #[test]
    fn aggregate_follows_the_slowest_live_sub_order() {
        let parent = order(1, Confirmed);
        let subs = vec![order(2, Ready), order(3, Preparing), order(4, Cancelled)];
        assert_eq!(aggregate_status(&parent, &subs), Preparing);
    }

    #[test]
    fn aggregate_of_finished_sub_orders() {
        let parent = order(1, Confirmed);
        assert_eq!(aggregate_status(&parent, &[order(2, Completed), order(3, Rejected)]), Completed);
        assert_eq!(aggregate_status(&parent, &[order(2, Rejected), order(3, Rejected)]), Rejected);
        assert_eq!(aggregate_status(&parent, &[order(2, Cancelled), order(3, Rejected)]), Cancelled);
        assert_eq!(aggregate_status(&parent, &[]), Confirmed);
    }
}

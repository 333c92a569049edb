use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{
    NewAllocation,
    NewAuditEntry,
    NewOrder,
    NewPayment,
    Order,
    OrderPaymentStatus,
    OrderStatusType,
    Payment,
    PaymentAllocation,
    PayoutBatch,
};

/// A single status move for one order, as decided by the state machine.
///
/// Storage applies the change only if the order still has `expected_version`. Otherwise the whole enclosing
/// operation fails with `ConcurrentModification`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: i64,
    pub expected_version: i64,
    pub from: OrderStatusType,
    pub to: OrderStatusType,
    pub actor: String,
    pub note: Option<String>,
    pub cancellation_reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// The result of splitting a checkout: an optional parent, the orders that carry lines, and the payment that settles
/// the whole set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderSet {
    pub parent: Option<NewOrder>,
    pub orders: Vec<NewOrder>,
    pub payment: NewPayment,
    /// The actor recorded against the initial status history entries
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

impl NewOrderSet {
    pub fn root(&self) -> Option<&NewOrder> {
        self.parent.as_ref().or_else(|| self.orders.first())
    }
}

/// Orders as they were stored by [`crate::OrderManagement::insert_order_set`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertedOrders {
    /// The parent order for multi-vendor checkouts, or the single order otherwise
    pub root: Order,
    /// The vendor sub-orders. Empty for single-vendor checkouts.
    pub sub_orders: Vec<Order>,
    pub payment: Payment,
}

impl InsertedOrders {
    /// The orders that carry lines and are fulfilled by a vendor
    pub fn vendor_orders(&self) -> Vec<&Order> {
        if self.sub_orders.is_empty() {
            vec![&self.root]
        } else {
            self.sub_orders.iter().collect()
        }
    }
}

/// Everything that changes atomically when a gateway payment is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCompletion {
    pub payment_id: i64,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
    pub processed_at: DateTime<Utc>,
    /// Orders whose payment status becomes `paid`
    pub paid_order_ids: Vec<i64>,
    pub status_changes: Vec<StatusChange>,
    pub allocations: Vec<NewAllocation>,
    pub audit: NewAuditEntry,
}

/// Result of claiming a vendor's pending allocations for a payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutClaim {
    pub batch: PayoutBatch,
    pub allocations: Vec<PaymentAllocation>,
}

/// Whether a gateway webhook event id was seen for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookRecordResult {
    Recorded,
    AlreadyProcessed,
}

#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    pub court_id: Option<String>,
    pub customer_id: Option<String>,
    pub vendor_id: Option<String>,
    pub parent_order_id: Option<i64>,
    pub statuses: Vec<OrderStatusType>,
    pub payment_status: Option<OrderPaymentStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub top_level_only: bool,
    pub limit: Option<i64>,
}

impl OrderQueryFilter {
    pub fn for_court<S: Into<String>>(court_id: S) -> Self {
        Self { court_id: Some(court_id.into()), ..Default::default() }
    }

    pub fn with_customer_id<S: Into<String>>(mut self, customer_id: S) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_vendor_id<S: Into<String>>(mut self, vendor_id: S) -> Self {
        self.vendor_id = Some(vendor_id.into());
        self
    }

    pub fn with_parent_order_id(mut self, parent_order_id: i64) -> Self {
        self.parent_order_id = Some(parent_order_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_payment_status(mut self, status: OrderPaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Exclude sub-orders, returning only parent orders and single-vendor orders
    pub fn top_level_only(mut self) -> Self {
        self.top_level_only = true;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.court_id.is_none() &&
            self.customer_id.is_none() &&
            self.vendor_id.is_none() &&
            self.parent_order_id.is_none() &&
            self.statuses.is_empty() &&
            self.payment_status.is_none() &&
            self.since.is_none() &&
            self.until.is_none() &&
            !self.top_level_only
    }
}

use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType, PayoutBatch, VendorAccount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    /// A new order was placed. Emitted once per order in a split set.
    Created,
    StatusChanged,
    Paid,
    Rated,
}

impl OrderEventKind {
    /// The event name clients see on the notification channels
    pub fn event_name(&self) -> &'static str {
        match self {
            OrderEventKind::Created => "order:new",
            OrderEventKind::StatusChanged => "order:status",
            OrderEventKind::Paid => "order:paid",
            OrderEventKind::Rated => "order:rated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub kind: OrderEventKind,
    pub order: Order,
    pub previous_status: Option<OrderStatusType>,
}

impl OrderEvent {
    pub fn created(order: Order) -> Self {
        Self { kind: OrderEventKind::Created, order, previous_status: None }
    }

    pub fn status_changed(order: Order, previous_status: OrderStatusType) -> Self {
        Self { kind: OrderEventKind::StatusChanged, order, previous_status: Some(previous_status) }
    }

    pub fn paid(order: Order) -> Self {
        Self { kind: OrderEventKind::Paid, order, previous_status: None }
    }

    pub fn rated(order: Order) -> Self {
        Self { kind: OrderEventKind::Rated, order, previous_status: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SettlementEvent {
    /// A payout batch was handed to the gateway, or the gateway reported back on it
    PayoutUpdated { batch: PayoutBatch },
    /// The gateway changed the state of a vendor's account
    AccountUpdated { account: VendorAccount },
}

impl SettlementEvent {
    pub fn vendor_id(&self) -> &str {
        match self {
            SettlementEvent::PayoutUpdated { batch } => batch.vendor_id.as_str(),
            SettlementEvent::AccountUpdated { account } => account.vendor_id.as_str(),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            SettlementEvent::PayoutUpdated { .. } => "payout:status",
            SettlementEvent::AccountUpdated { .. } => "account:status",
        }
    }
}

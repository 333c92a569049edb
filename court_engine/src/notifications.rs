//! Fan-out of engine events to vendor, customer and order-room channels.
//!
//! Channels are plain strings:
//! * `vendor:{vendor_id}` for a vendor's dashboard,
//! * `customer:{customer_id}` for a customer's devices,
//! * `order:{root_order_id}` for everyone watching one checkout, keyed by the parent order (or the order itself when
//!   there was no split).
//!
//! The transport is injected as a [`NotificationPublisher`]. Delivery is best effort: failures are logged and
//! swallowed. The router only ever runs from event hooks, i.e. after the state change it reports has been committed.
use std::{fmt::Debug, sync::Arc};

use log::*;
use serde_json::{json, Value};
use thiserror::Error;

use crate::events::{EventHooks, OrderEvent, OrderEventKind, SettlementEvent};

#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("Nobody is listening on {0}")]
    NoSubscribers(String),
    #[error("Notification transport failed. {0}")]
    Transport(String),
}

/// A notification transport, such as a websocket hub or an in-process broadcast channel.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, channel: &str, event_name: &str, payload: Value) -> Result<(), PublishError>;
}

pub fn vendor_channel(vendor_id: &str) -> String {
    format!("vendor:{vendor_id}")
}

pub fn customer_channel(customer_id: &str) -> String {
    format!("customer:{customer_id}")
}

pub fn order_room(root_order_id: i64) -> String {
    format!("order:{root_order_id}")
}

#[derive(Clone)]
pub struct NotificationRouter {
    publisher: Arc<dyn NotificationPublisher>,
}

impl Debug for NotificationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NotificationRouter")
    }
}

impl NotificationRouter {
    pub fn new(publisher: Arc<dyn NotificationPublisher>) -> Self {
        Self { publisher }
    }

    pub fn notify_vendor(&self, vendor_id: &str, event_name: &str, payload: Value) {
        self.send(&vendor_channel(vendor_id), event_name, payload);
    }

    pub fn notify_customer(&self, customer_id: &str, event_name: &str, payload: Value) {
        self.send(&customer_channel(customer_id), event_name, payload);
    }

    pub fn notify_order_room(&self, root_order_id: i64, event_name: &str, payload: Value) {
        self.send(&order_room(root_order_id), event_name, payload);
    }

    fn send(&self, channel: &str, event_name: &str, payload: Value) {
        match self.publisher.publish(channel, event_name, payload) {
            Ok(()) => trace!("📣️ {event_name} sent to {channel}"),
            Err(PublishError::NoSubscribers(_)) => trace!("📣️ Nobody on {channel} for {event_name}"),
            Err(e) => warn!("📣️ Could not deliver {event_name} to {channel}. {e}"),
        }
    }

    /// Decides who hears about an order event.
    ///
    /// Vendors hear about their own orders, customers about the order they placed (a split checkout is reported once,
    /// through the parent), and the order room hears everything.
    pub fn route_order_event(&self, event: &OrderEvent) {
        let order = &event.order;
        let name = event.kind.event_name();
        let payload = json!({
            "order_id": order.id,
            "order_number": order.order_number,
            "root_order_id": order.root_id(),
            "status": order.status,
            "previous_status": event.previous_status,
            "payment_status": order.payment_status,
            "order": order,
        });
        if let Some(vendor_id) = &order.vendor_id {
            self.notify_vendor(vendor_id, name, payload.clone());
        }
        let customer_hears = match event.kind {
            OrderEventKind::Created | OrderEventKind::Paid => !order.is_sub_order,
            OrderEventKind::StatusChanged => true,
            OrderEventKind::Rated => false,
        };
        if customer_hears {
            self.notify_customer(&order.customer_id, name, payload.clone());
        }
        self.notify_order_room(order.root_id(), name, payload);
    }

    pub fn route_settlement_event(&self, event: &SettlementEvent) {
        match serde_json::to_value(event) {
            Ok(payload) => self.notify_vendor(event.vendor_id(), event.event_name(), payload),
            Err(e) => error!("📣️ Could not serialize settlement event for {}. {e}", event.vendor_id()),
        }
    }

    /// Registers the router as order and settlement hooks.
    pub fn install(&self, hooks: &mut EventHooks) {
        let router = self.clone();
        hooks.on_order_event(move |ev| {
            let router = router.clone();
            Box::pin(async move { router.route_order_event(&ev) })
        });
        let router = self.clone();
        hooks.on_settlement_event(move |ev| {
            let router = router.clone();
            Box::pin(async move { router.route_settlement_event(&ev) })
        });
    }
}

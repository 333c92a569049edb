//! Food Court Engine
//!
//! The engine lets the vendors of a food court sell through one ordering surface. A customer fills a single cart from
//! several vendors; at checkout the cart is split into one order per vendor under a parent order that carries the
//! payment. Each vendor order then moves through its own state machine, and once paid, each vendor's share is
//! allocated and later paid out in fee-deducted batches.
//!
//! The library is divided into these sections:
//! 1. Storage ([`mod@db`]). The storage traits, and their SQLite implementation, [`SqliteDatabase`]. The types stored
//!    in the database live in [`db_types`] and are public.
//! 2. The public API ([`mod@court_api`]): carts, order flow, payments and settlement. The APIs are generic over the
//!    storage traits and over the [`PaymentGateway`].
//! 3. Events ([`mod@events`]). Every committed change is published as an event. The [`NotificationRouter`] turns
//!    those events into messages on vendor, customer and order channels of an injected [`NotificationPublisher`].
mod db;

pub mod court_api;
pub mod db_types;
pub mod events;
pub mod gateway;
pub mod helpers;
pub mod notifications;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use court_api::{
    cart_api::CartApi,
    cart_objects,
    errors::CourtError,
    order_flow_api::OrderFlowApi,
    order_objects,
    payment_api::PaymentApi,
    payment_objects,
    settlement_api::SettlementApi,
    settlement_objects,
    transitions,
};
#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use db::traits::{
    AuditManagement,
    CartManagement,
    CourtDatabase,
    CourtManagement,
    InsertedOrders,
    NewOrderSet,
    OrderManagement,
    OrderQueryFilter,
    PaymentCompletion,
    PaymentManagement,
    PayoutClaim,
    SettlementManagement,
    StatusChange,
    WebhookRecordResult,
};
pub use gateway::PaymentGateway;
pub use notifications::{NotificationPublisher, NotificationRouter, PublishError};

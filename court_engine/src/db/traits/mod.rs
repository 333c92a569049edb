//! # Storage contracts
//!
//! This module defines the behaviour a storage backend must provide to drive the food court engine. The engine APIs in
//! [`crate::court_api`] are generic over these traits and never touch SQL directly.
//!
//! * [`CourtManagement`] resolves tenants (courts) and reads the catalogue of vendors and menu items.
//! * [`CartManagement`] owns the one-active-cart-per-customer rule and the cart total invariant.
//! * [`OrderManagement`] inserts split orders atomically and applies versioned status changes.
//! * [`PaymentManagement`] tracks payment intents and their completion.
//! * [`SettlementManagement`] claims payment allocations for payouts and mirrors gateway account state.
//! * [`AuditManagement`] is the append-only audit log.
//!
//! [`CourtDatabase`] bundles all of the above.
mod audit_management;
mod cart_management;
mod court_management;
mod order_management;
mod payment_management;
mod settlement_management;

mod data_objects;

pub use audit_management::AuditManagement;
pub use cart_management::CartManagement;
pub use court_management::CourtManagement;
pub use data_objects::{
    InsertedOrders,
    NewOrderSet,
    OrderQueryFilter,
    PaymentCompletion,
    PayoutClaim,
    StatusChange,
    WebhookRecordResult,
};
pub use order_management::OrderManagement;
pub use payment_management::PaymentManagement;
pub use settlement_management::SettlementManagement;

/// A complete storage backend for the engine.
pub trait CourtDatabase:
    CourtManagement + CartManagement + OrderManagement + PaymentManagement + SettlementManagement + AuditManagement
{
    /// The URL of the database
    fn url(&self) -> &str;
}

use thiserror::Error;

use crate::db_types::OrderStatusType;

/// The single error type surfaced by the engine's APIs and storage traits.
///
/// Every variant is a precondition failure that leaves the system unchanged, except `DatabaseError`, which is only
/// returned after the enclosing transaction has been rolled back.
#[derive(Debug, Clone, Error)]
pub enum CourtError {
    #[error("Invalid input. {0}")]
    ValidationError(String),
    #[error("{0} was not found")]
    NotFound(String),
    #[error("Access denied. {0}")]
    Forbidden(String),
    #[error("Cannot move order from {from} to {to}. {reason}")]
    InvalidTransition { from: OrderStatusType, to: OrderStatusType, reason: String },
    #[error("The signature is invalid.")]
    InvalidSignature,
    #[error("The record was modified concurrently. Reload and try again.")]
    ConcurrentModification,
    #[error("The payment gateway is unavailable. {0}")]
    GatewayUnavailable(String),
    #[error("{0} has already been processed")]
    AlreadyProcessed(String),
    #[error("Menu item {0} is unavailable")]
    ItemUnavailable(String),
    #[error("There is no active cart for this customer")]
    CartNotFound,
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("Order {0} has already been rated")]
    AlreadyRated(i64),
    #[error("Vendor {0} has no pending payouts")]
    NoPendingPayouts(String),
    #[error("Vendor {0} cannot receive payouts. {1}")]
    VendorIneligible(String, String),
    #[error("Order number {0} is already taken")]
    DuplicateOrderNumber(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for CourtError {
    fn from(e: sqlx::Error) -> Self {
        CourtError::DatabaseError(e.to_string())
    }
}

impl CourtError {
    pub fn invalid_transition<S: Into<String>>(from: OrderStatusType, to: OrderStatusType, reason: S) -> Self {
        Self::InvalidTransition { from, to, reason: reason.into() }
    }

    pub fn forbidden<S: Into<String>>(reason: S) -> Self {
        Self::Forbidden(reason.into())
    }

    pub fn validation<S: Into<String>>(reason: S) -> Self {
        Self::ValidationError(reason.into())
    }
}

use std::str::FromStr;

use court_engine::{
    db_types::{Order, OrderStatusType, Vendor},
    payment_objects::IntentRef,
    CourtError,
    InsertedOrders,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddLineParams {
    pub menu_item_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub customizations: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetQuantityParams {
    pub quantity: i64,
}

/// The orders a checkout produced, and the payment intent to complete them with.
///
/// The orders exist even when the gateway could not be reached. In that case `intent` is empty, `intent_error` says
/// why, and the client can ask for an intent again through `POST /api/orders/{id}/pay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub orders: InsertedOrders,
    pub intent: Option<IntentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateParams {
    pub status: OrderStatusType,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelParams {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingParams {
    pub rating: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingResult {
    pub order: Order,
    pub vendor: Vendor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckLookupParams {
    pub token: String,
}

/// Query string for `GET /api/stream`. Naming an order adds its checkout's room to the caller's channels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub order_id: Option<i64>,
}

/// Query string for `GET /api/orders`. Admins must name a vendor; vendors may only name themselves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderListQuery {
    #[serde(default)]
    pub vendor_id: Option<String>,
    /// Comma separated, e.g. `pending,confirmed`
    #[serde(default)]
    pub status: Option<String>,
}

impl OrderListQuery {
    pub fn statuses(&self) -> Result<Vec<OrderStatusType>, CourtError> {
        let Some(list) = self.status.as_deref() else {
            return Ok(vec![]);
        };
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| OrderStatusType::from_str(s).map_err(|e| CourtError::validation(e.to_string())))
            .collect()
    }
}

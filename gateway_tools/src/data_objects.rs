use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request body for `POST /v1/orders`. Amounts are in the currency's minor unit (paise for INR).
#[derive(Debug, Clone, Serialize)]
pub struct NewGatewayOrder {
    pub amount: i64,
    pub currency: String,
    /// Our own reference, echoed back by the gateway
    pub receipt: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub notes: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_paid: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    pub status: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /v1/transfers`.
#[derive(Debug, Clone, Serialize)]
pub struct NewTransfer {
    /// The destination fund account
    pub account: String,
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub notes: HashMap<String, String>,
}

impl NewTransfer {
    pub fn new(account: impl Into<String>, amount: i64, reference: impl Into<String>) -> Self {
        let mut notes = HashMap::with_capacity(1);
        notes.insert("reference".to_string(), reference.into());
        Self { account: account.into(), amount, currency: "INR".to_string(), notes }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayTransfer {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gateway_orders_deserialize() {
        let json = r#"{
            "id": "order_NAqb6V1j1dTeXw",
            "entity": "order",
            "amount": 25000,
            "amount_paid": 0,
            "amount_due": 25000,
            "currency": "INR",
            "receipt": "ORD-20260301120000-ABCDEF",
            "status": "created",
            "attempts": 0,
            "notes": [],
            "created_at": 1772366400
        }"#;
        let order: GatewayOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.id, "order_NAqb6V1j1dTeXw");
        assert_eq!(order.amount, 25_000);
        assert_eq!(order.receipt.as_deref(), Some("ORD-20260301120000-ABCDEF"));
        assert_eq!(order.created_at.timestamp(), 1_772_366_400);
    }

    #[test]
    fn empty_notes_are_left_out() {
        let order =
            NewGatewayOrder { amount: 100, currency: "INR".into(), receipt: "r1".into(), notes: HashMap::new() };
        let json = serde_json::to_value(&order).unwrap();
        assert!(json.get("notes").is_none());
        let transfer = serde_json::to_value(NewTransfer::new("fa_1", 500, "payout-7")).unwrap();
        assert_eq!(transfer["notes"]["reference"], "payout-7");
        assert_eq!(transfer["currency"], "INR");
    }
}

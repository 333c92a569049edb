use std::time::Duration;

use court_common::Secret;
use serde::{Deserialize, Serialize};

use crate::db_types::Paise;

/// What the client needs to open the gateway's checkout for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRef {
    pub order_id: i64,
    pub payment_id: i64,
    pub gateway_order_id: String,
    pub amount: Paise,
    pub currency: String,
}

/// The gateway's signed payment callback, as relayed by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub order_id: i64,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentConfig {
    /// Shared secret the gateway signs payment callbacks with
    pub signing_secret: Secret<String>,
    pub gateway_timeout: Duration,
}

impl PaymentConfig {
    pub fn new<S: Into<String>>(signing_secret: S, gateway_timeout: Duration) -> Self {
        Self { signing_secret: Secret::new(signing_secret.into()), gateway_timeout }
    }
}

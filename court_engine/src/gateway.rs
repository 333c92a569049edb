//! The payment gateway, as seen by the engine.
//!
//! The engine never talks HTTP itself. Anything that can mint payment intents and send transfers to a vendor's fund
//! account can drive the payment and settlement flows by implementing [`PaymentGateway`]. Signature checks on the
//! gateway's callbacks are done locally with the shared secrets (see [`crate::helpers`]), so they are not part of the
//! trait.
use std::collections::HashMap;

use court_common::{Paise, INR_CURRENCY_CODE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("The gateway did not respond in time")]
    Timeout,
    #[error("The gateway rejected the request. {0}")]
    Rejected(String),
    #[error("Could not reach the gateway. {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRequest {
    pub amount: Paise,
    pub currency: String,
    /// Our reference for the intent. The root order number.
    pub reference: String,
    pub metadata: HashMap<String, String>,
}

impl IntentRequest {
    pub fn new<S: Into<String>>(amount: Paise, reference: S) -> Self {
        Self { amount, currency: INR_CURRENCY_CODE.to_string(), reference: reference.into(), metadata: HashMap::new() }
    }

    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The gateway's reference to a payment intent. The client completes the payment against `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub id: String,
    pub amount: Paise,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub fund_account_id: String,
    pub amount: Paise,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayTransfer {
    pub transfer_id: String,
}

#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone {
    async fn create_intent(&self, request: IntentRequest) -> Result<GatewayIntent, GatewayError>;

    async fn create_transfer(&self, request: TransferRequest) -> Result<GatewayTransfer, GatewayError>;
}

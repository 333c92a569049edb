use std::time::Duration;

use court_common::Secret;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
pub struct SettlementConfig {
    /// Shared secret the gateway signs webhook deliveries with
    pub webhook_secret: Secret<String>,
    pub gateway_timeout: Duration,
}

impl SettlementConfig {
    pub fn new<S: Into<String>>(webhook_secret: S, gateway_timeout: Duration) -> Self {
        Self { webhook_secret: Secret::new(webhook_secret.into()), gateway_timeout }
    }
}

pub const PAYOUT_REFERENCE_PREFIX: &str = "payout-";

/// The reference a payout batch's transfer is sent with.
pub fn payout_reference(batch_id: i64) -> String {
    format!("{PAYOUT_REFERENCE_PREFIX}{batch_id}")
}

/// A webhook delivery from the gateway.
///
/// ```json
/// { "id": "evt_29", "event": "account.suspended",
///   "payload": { "account": { "entity": { "id": "acc_7" } } } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayWebhook {
    pub id: String,
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub account: Option<EntityWrapper>,
    #[serde(default)]
    pub transfer: Option<EntityWrapper>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityWrapper {
    pub entity: WebhookEntity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEntity {
    pub id: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
    /// Our reference for a transfer, `payout-{batch id}`
    #[serde(default)]
    pub reference: Option<String>,
}

impl WebhookEntity {
    /// The payout batch id carried in a transfer's reference, if it is one of ours.
    pub fn payout_batch_id(&self) -> Option<i64> {
        self.reference.as_deref()?.strip_prefix(PAYOUT_REFERENCE_PREFIX)?.parse().ok()
    }
}

impl GatewayWebhook {
    pub fn account_id(&self) -> Option<&str> {
        self.payload.account.as_ref().map(|a| a.entity.id.as_str())
    }

    pub fn transfer(&self) -> Option<&WebhookEntity> {
        self.payload.transfer.as_ref().map(|t| &t.entity)
    }
}

/// The webhook events the engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    AccountActivated,
    AccountSuspended,
    FundsOnHold,
    FundsReleased,
    TransferProcessed,
    TransferFailed,
}

impl WebhookKind {
    pub fn parse(event: &str) -> Option<Self> {
        match event {
            "account.activated" => Some(Self::AccountActivated),
            "account.suspended" => Some(Self::AccountSuspended),
            "account.funds_on_hold" => Some(Self::FundsOnHold),
            "account.funds_released" => Some(Self::FundsReleased),
            "transfer.processed" => Some(Self::TransferProcessed),
            "transfer.failed" => Some(Self::TransferFailed),
            _ => None,
        }
    }
}

/// How a webhook delivery was handled.
///
/// `Deferred` deliveries are not remembered and are answered with a failure status, so that the gateway sends them
/// again. The others are acknowledged with a success status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied { event: String },
    /// An event kind we don't act on, or one about an account we don't know
    Ignored { event: String },
    Duplicate { event_id: String },
    /// A transfer event that matches no payout batch yet
    Deferred { event: String },
}

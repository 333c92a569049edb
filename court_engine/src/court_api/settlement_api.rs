use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;
use serde_json::json;

use crate::{
    court_api::{
        errors::CourtError,
        payment_api::with_timeout,
        settlement_objects::{
            payout_reference,
            GatewayWebhook,
            SettlementConfig,
            WebhookEntity,
            WebhookKind,
            WebhookOutcome,
        },
    },
    db::traits::{AuditManagement, CourtManagement, SettlementManagement},
    db_types::{
        Actor,
        GatewayAccountStatus,
        NewAuditEntry,
        PayoutBatch,
        PayoutBatchStatus,
        Role,
        VendorAccount,
        VendorAccountUpdate,
    },
    events::{EventProducers, SettlementEvent},
    gateway::{PaymentGateway, TransferRequest},
    helpers::verify_webhook_signature,
};

const GATEWAY_ACTOR: &str = "system:gateway";
const RECONCILER_ACTOR: &str = "system:reconciler";

/// `SettlementApi` pays vendors their share of completed payments and keeps vendor accounts in step with the
/// gateway's webhooks.
pub struct SettlementApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    config: SettlementConfig,
}

impl<B, G> Debug for SettlementApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi")
    }
}

impl<B, G> SettlementApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers, config: SettlementConfig) -> Self {
        Self { db, gateway, producers, config }
    }
}

impl<B, G> SettlementApi<B, G>
where
    B: CourtManagement + SettlementManagement + AuditManagement,
    G: PaymentGateway,
{
    /// Pays out everything the vendor is owed in one gateway transfer, less the court's platform fee.
    ///
    /// The pending allocations are claimed into an `initiated` batch first, the transfer is requested with no
    /// transaction open, and only then is the transfer id committed and the allocations moved to `processing`. If the
    /// gateway fails, the claim is released and nothing is left in flight.
    pub async fn batch_payout(&self, actor: &Actor, vendor_id: &str) -> Result<PayoutBatch, CourtError> {
        if !matches!(actor.role, Role::Admin | Role::System) {
            return Err(CourtError::forbidden("only court admins can trigger payouts"));
        }
        let court = self.db.resolve_court(&actor.court_id).await?;
        self.db
            .fetch_vendor(&court.id, vendor_id)
            .await?
            .ok_or_else(|| CourtError::NotFound(format!("Vendor {vendor_id}")))?;
        let account = self
            .db
            .fetch_vendor_account(vendor_id)
            .await?
            .filter(|a| a.court_id == court.id)
            .ok_or_else(|| CourtError::VendorIneligible(vendor_id.into(), "no gateway account is linked".into()))?;
        let fund_account_id = payout_destination(&account)?;

        let claim = self
            .db
            .claim_pending_allocations(&court.id, vendor_id, court.platform_fee_bps)
            .await?
            .ok_or_else(|| CourtError::NoPendingPayouts(vendor_id.into()))?;
        let batch = claim.batch;
        debug!(
            "🏦️ Batch #{} for {vendor_id}: {} allocation(s), gross {}, fee {}, net {}",
            batch.id,
            claim.allocations.len(),
            batch.gross_amount,
            batch.platform_fee,
            batch.vendor_amount
        );

        let request =
            TransferRequest { fund_account_id, amount: batch.vendor_amount, reference: payout_reference(batch.id) };
        let transfer = match with_timeout(self.config.gateway_timeout, self.gateway.create_transfer(request)).await {
            Ok(transfer) => transfer,
            Err(e) => {
                match self.db.release_payout_batch(batch.id, &e.to_string()).await {
                    Ok(failed) => {
                        self.producers.publish_settlement_event(SettlementEvent::PayoutUpdated { batch: failed })
                    },
                    Err(release_err) => error!(
                        "🏦️ Transfer for batch #{} failed and the claim could not be released. {release_err}",
                        batch.id
                    ),
                }
                return Err(e);
            },
        };

        let detail = json!({
            "vendor_id": vendor_id,
            "transfer_id": transfer.transfer_id,
            "gross": batch.gross_amount,
            "fee": batch.platform_fee,
            "net": batch.vendor_amount,
            "payments": batch.payment_ids,
        });
        let audit = NewAuditEntry::new("payout_batch", batch.id, "transfer_initiated", &actor.label())
            .with_court(court.id.as_str())
            .with_detail(detail.to_string());
        let batch = self.db.commit_payout_batch(batch.id, &transfer.transfer_id, audit).await?;
        info!(
            "🏦️ Transfer {} of {} sent to {vendor_id} for {} payment(s)",
            transfer.transfer_id,
            batch.vendor_amount,
            batch.payment_ids.len()
        );
        self.producers.publish_settlement_event(SettlementEvent::PayoutUpdated { batch: batch.clone() });
        Ok(batch)
    }

    /// Fails every batch that has sat in `initiated` for longer than `older_than`, and returns its allocations to the
    /// pending pool.
    ///
    /// A batch stays `initiated` only if the process stopped between claiming the allocations and committing the
    /// transfer id. A transfer that did go out for such a batch is picked up from its webhook by reference, as long as
    /// the webhook arrives before the batch is released here.
    pub async fn reconcile_stale_batches(&self, older_than: Duration) -> Result<Vec<PayoutBatch>, CourtError> {
        let cutoff = Utc::now() - older_than;
        let stale = self.db.fetch_stale_initiated_batches(cutoff).await?;
        let mut released = Vec::with_capacity(stale.len());
        for batch in stale {
            let reason = format!("no transfer was confirmed within {} minutes", older_than.num_minutes());
            let failed = match self.db.release_payout_batch(batch.id, &reason).await {
                Ok(failed) => failed,
                Err(CourtError::AlreadyProcessed(_)) => {
                    debug!("🏦️ Batch #{} moved on before it could be released", batch.id);
                    continue;
                },
                Err(e) => return Err(e),
            };
            warn!("🏦️ Released stale payout batch #{} for {}. {reason}", failed.id, failed.vendor_id);
            let detail = json!({ "vendor_id": failed.vendor_id, "gross": failed.gross_amount, "reason": reason });
            let entry = NewAuditEntry::new("payout_batch", failed.id, "released_stale", RECONCILER_ACTOR)
                .with_court(failed.court_id.as_str())
                .with_detail(detail.to_string());
            if let Err(e) = self.db.append_audit_entry(entry).await {
                error!("🏦️ Could not write the audit entry for released batch #{}. {e}", failed.id);
            }
            self.producers.publish_settlement_event(SettlementEvent::PayoutUpdated { batch: failed.clone() });
            released.push(failed);
        }
        Ok(released)
    }

    /// Applies a gateway webhook delivery.
    ///
    /// The signature over the raw body is checked before anything else. Event ids are remembered, so a redelivered
    /// event is acknowledged without being applied again. Event kinds the engine does not act on are acknowledged
    /// too, so the gateway never retries them. Transfer events that match no batch yet are deferred: they are not
    /// remembered, so the gateway's redelivery is applied once the batch exists.
    pub async fn handle_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookOutcome, CourtError> {
        if !verify_webhook_signature(self.config.webhook_secret.reveal(), raw_body, signature) {
            warn!("🏦️ Rejected a webhook with an invalid signature");
            return Err(CourtError::InvalidSignature);
        }
        let hook: GatewayWebhook = serde_json::from_slice(raw_body)
            .map_err(|e| CourtError::validation(format!("Malformed webhook payload. {e}")))?;
        if self.db.webhook_event_seen(&hook.id).await? {
            debug!("🏦️ Webhook event {} ({}) was already processed", hook.id, hook.event);
            return Ok(WebhookOutcome::Duplicate { event_id: hook.id });
        }
        let outcome = match WebhookKind::parse(&hook.event) {
            Some(kind) => self.apply_webhook(kind, &hook).await?,
            None => {
                info!("🏦️ Ignoring webhook event {} of kind {}", hook.id, hook.event);
                WebhookOutcome::Ignored { event: hook.event.clone() }
            },
        };
        if matches!(outcome, WebhookOutcome::Deferred { .. }) {
            return Ok(outcome);
        }
        self.db.record_webhook_event(&hook.id, &hook.event).await?;
        Ok(outcome)
    }

    async fn apply_webhook(&self, kind: WebhookKind, hook: &GatewayWebhook) -> Result<WebhookOutcome, CourtError> {
        let update = VendorAccountUpdate::default();
        let update = match kind {
            WebhookKind::AccountActivated => update.with_status(GatewayAccountStatus::Activated),
            WebhookKind::AccountSuspended => update.with_status(GatewayAccountStatus::Suspended),
            WebhookKind::FundsOnHold => update.with_funds_on_hold(true),
            WebhookKind::FundsReleased => update.with_funds_on_hold(false),
            WebhookKind::TransferProcessed | WebhookKind::TransferFailed => {
                return self.apply_transfer_webhook(kind, hook).await;
            },
        };
        let account_id = hook
            .account_id()
            .ok_or_else(|| CourtError::validation(format!("{} event {} has no account", hook.event, hook.id)))?;
        let Some(account) = self.db.update_vendor_account(account_id, update).await? else {
            warn!("🏦️ Webhook {} is about account {account_id}, which is not linked to any vendor", hook.id);
            return Ok(WebhookOutcome::Ignored { event: hook.event.clone() });
        };
        info!(
            "🏦️ Account {account_id} of {} is now {} (funds on hold: {})",
            account.vendor_id, account.activation_status, account.funds_on_hold
        );
        self.audit_webhook("vendor_account", &account.vendor_id, Some(&account.court_id), hook).await;
        self.producers.publish_settlement_event(SettlementEvent::AccountUpdated { account });
        Ok(WebhookOutcome::Applied { event: hook.event.clone() })
    }

    async fn apply_transfer_webhook(
        &self,
        kind: WebhookKind,
        hook: &GatewayWebhook,
    ) -> Result<WebhookOutcome, CourtError> {
        let transfer = hook
            .transfer()
            .ok_or_else(|| CourtError::validation(format!("{} event {} has no transfer", hook.event, hook.id)))?;
        let mut batch = self.finish_transfer(kind, transfer).await?;
        if batch.is_none() {
            if let Some(batch_id) = transfer.payout_batch_id() {
                batch = match self.adopt_transfer(batch_id, transfer, hook).await? {
                    Some(true) => self.finish_transfer(kind, transfer).await?,
                    Some(false) => return Ok(WebhookOutcome::Ignored { event: hook.event.clone() }),
                    None => None,
                };
            }
        }
        let Some(batch) = batch else {
            warn!("🏦️ Webhook {} is about transfer {}, which matches no payout batch yet", hook.id, transfer.id);
            return Ok(WebhookOutcome::Deferred { event: hook.event.clone() });
        };
        info!("🏦️ Payout batch #{} for {} is now {}", batch.id, batch.vendor_id, batch.status);
        self.audit_webhook("payout_batch", &batch.id.to_string(), Some(&batch.court_id), hook).await;
        self.producers.publish_settlement_event(SettlementEvent::PayoutUpdated { batch });
        Ok(WebhookOutcome::Applied { event: hook.event.clone() })
    }

    async fn finish_transfer(
        &self,
        kind: WebhookKind,
        transfer: &WebhookEntity,
    ) -> Result<Option<PayoutBatch>, CourtError> {
        if kind == WebhookKind::TransferProcessed {
            self.db.settle_transfer(&transfer.id).await
        } else {
            let reason = transfer.failure_reason.as_deref().unwrap_or("the gateway reported the transfer as failed");
            self.db.fail_transfer(&transfer.id, reason).await
        }
    }

    /// Attaches a transfer the gateway reports on to the batch named in its reference, when the batch never got to
    /// record its transfer id.
    ///
    /// Returns `Some(true)` if the transfer now belongs to the batch, `Some(false)` if the batch had already been
    /// released, and `None` if there is no such batch.
    async fn adopt_transfer(
        &self,
        batch_id: i64,
        transfer: &WebhookEntity,
        hook: &GatewayWebhook,
    ) -> Result<Option<bool>, CourtError> {
        let Some(batch) = self.db.fetch_payout_batch(batch_id).await? else {
            return Ok(None);
        };
        match batch.status {
            PayoutBatchStatus::Initiated => {},
            PayoutBatchStatus::Failed if batch.transfer_id.is_none() => {
                error!(
                    "🏦️ Transfer {} went out for batch #{batch_id}, which was already released. Its allocations may be \
                     paid twice and need to be checked by hand",
                    transfer.id
                );
                self.audit_webhook("payout_batch", &batch_id.to_string(), Some(&batch.court_id), hook).await;
                return Ok(Some(false));
            },
            // The batch has a transfer id of its own, so the lookup by transfer id was the right one
            _ => return Ok(None),
        }
        let detail = json!({ "transfer_id": transfer.id, "event_id": hook.id });
        let audit = NewAuditEntry::new("payout_batch", batch_id, "transfer_adopted", GATEWAY_ACTOR)
            .with_court(batch.court_id.as_str())
            .with_detail(detail.to_string());
        match self.db.commit_payout_batch(batch_id, &transfer.id, audit).await {
            Ok(_) => {
                info!("🏦️ Batch #{batch_id} picked up transfer {} from a gateway webhook", transfer.id);
                Ok(Some(true))
            },
            // The payout committed its own transfer id in the meantime
            Err(CourtError::AlreadyProcessed(_)) => Ok(Some(true)),
            Err(e) => Err(e),
        }
    }

    async fn audit_webhook(&self, entity_type: &str, entity_id: &str, court_id: Option<&str>, hook: &GatewayWebhook) {
        let mut entry = NewAuditEntry::new(entity_type, entity_id, hook.event.as_str(), GATEWAY_ACTOR)
            .with_detail(json!({ "event_id": hook.id }).to_string());
        if let Some(court_id) = court_id {
            entry = entry.with_court(court_id);
        }
        if let Err(e) = self.db.append_audit_entry(entry).await {
            error!("🏦️ Could not write the audit entry for webhook {}. {e}", hook.id);
        }
    }
}

/// The fund account a payout can go to, or the reason the vendor cannot be paid right now.
fn payout_destination(account: &VendorAccount) -> Result<String, CourtError> {
    let ineligible = |reason: &str| CourtError::VendorIneligible(account.vendor_id.clone(), reason.to_string());
    match account.activation_status {
        GatewayAccountStatus::Suspended => return Err(ineligible("the gateway account is suspended")),
        GatewayAccountStatus::Created => return Err(ineligible("the gateway account is not activated yet")),
        GatewayAccountStatus::Activated => {},
    }
    if account.funds_on_hold {
        return Err(ineligible("the gateway is holding the vendor's funds"));
    }
    match &account.fund_account_id {
        Some(id) if !id.is_empty() && account.can_receive_payouts() => Ok(id.clone()),
        _ => Err(ineligible("no fund account is configured")),
    }
}

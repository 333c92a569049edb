use chrono::{DateTime, Utc};

use crate::{
    court_api::errors::CourtError,
    db::traits::{PayoutClaim, WebhookRecordResult},
    db_types::{NewAuditEntry, PaymentAllocation, PayoutBatch, VendorAccount, VendorAccountUpdate},
};

/// Vendor settlement: payout batches, vendor gateway accounts and webhook bookkeeping.
#[allow(async_fn_in_trait)]
pub trait SettlementManagement: Clone {
    async fn fetch_vendor_account(&self, vendor_id: &str) -> Result<Option<VendorAccount>, CourtError>;

    /// Applies the update to the vendor account with the given gateway account id. Returns `None` if no vendor is
    /// linked to that account.
    async fn update_vendor_account(
        &self,
        gateway_account_id: &str,
        update: VendorAccountUpdate,
    ) -> Result<Option<VendorAccount>, CourtError>;

    /// Fetches the allocations for the vendor that are still waiting to be paid out and not claimed by a batch.
    async fn fetch_pending_allocations(
        &self,
        court_id: &str,
        vendor_id: &str,
    ) -> Result<Vec<PaymentAllocation>, CourtError>;

    /// Claims every unclaimed pending allocation for the vendor into a new batch in the `initiated` state. The platform
    /// fee is `fee_bps` basis points of each allocation, rounded per allocation and summed, so a payment's fee does
    /// not depend on which batch it lands in.
    ///
    /// The claim is atomic, so two concurrent payouts can never include the same allocation. Returns `None` if there
    /// was nothing to claim.
    async fn claim_pending_allocations(
        &self,
        court_id: &str,
        vendor_id: &str,
        fee_bps: i64,
    ) -> Result<Option<PayoutClaim>, CourtError>;

    /// Records the gateway transfer id on an initiated batch and moves the batch and its allocations to
    /// `processing`. Payments whose allocations are all in flight follow.
    async fn commit_payout_batch(
        &self,
        batch_id: i64,
        transfer_id: &str,
        audit: NewAuditEntry,
    ) -> Result<PayoutBatch, CourtError>;

    /// Marks an initiated batch as failed and returns its allocations to the pending pool.
    async fn release_payout_batch(&self, batch_id: i64, reason: &str) -> Result<PayoutBatch, CourtError>;

    /// Marks the batch with the given transfer id as processed, and its allocations as paid.
    async fn settle_transfer(&self, transfer_id: &str) -> Result<Option<PayoutBatch>, CourtError>;

    /// Marks the batch with the given transfer id as failed, and returns its allocations to the pending pool.
    async fn fail_transfer(&self, transfer_id: &str, reason: &str) -> Result<Option<PayoutBatch>, CourtError>;

    async fn fetch_payout_batch(&self, batch_id: i64) -> Result<Option<PayoutBatch>, CourtError>;

    /// Batches still `initiated` that were created before `created_before`. These never had a transfer committed.
    async fn fetch_stale_initiated_batches(&self, created_before: DateTime<Utc>)
        -> Result<Vec<PayoutBatch>, CourtError>;

    async fn webhook_event_seen(&self, event_id: &str) -> Result<bool, CourtError>;

    /// Records a processed gateway event id. Recording the same id twice is harmless.
    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> Result<WebhookRecordResult, CourtError>;
}

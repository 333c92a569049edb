use chrono::Duration;
use court_engine::{
    AuditManagement,
    CourtError,
    CourtManagement,
    PaymentGateway,
    SettlementApi,
    SettlementManagement,
    SqliteDatabase,
};
use log::*;
use tokio::task::JoinHandle;

use crate::gateway_bridge::GatewayBridge;

/// Releases payout batches that have been stuck in `initiated` for longer than `stale_after`, every `period`.
/// Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_payout_reconciler(
    api: SettlementApi<SqliteDatabase, GatewayBridge>,
    stale_after: Duration,
    period: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        info!("🏦️ Payout reconciler started. Batches initiated {} minutes ago are released", stale_after.num_minutes());
        loop {
            timer.tick().await;
            match reconcile_payouts(&api, stale_after).await {
                Ok(0) => trace!("🏦️ No stale payout batches"),
                Ok(n) => warn!("🏦️ {n} stale payout batch(es) released"),
                Err(e) => error!("🏦️ Error running the payout reconciler. {e}"),
            }
        }
    })
}

pub async fn reconcile_payouts<B, G>(api: &SettlementApi<B, G>, stale_after: Duration) -> Result<usize, CourtError>
where
    B: CourtManagement + SettlementManagement + AuditManagement,
    G: PaymentGateway,
{
    let released = api.reconcile_stale_batches(stale_after).await?;
    if !released.is_empty() {
        debug!("🏦️ Released batches: {:?}", released.iter().map(|b| b.id).collect::<Vec<_>>());
    }
    Ok(released.len())
}

#[cfg(test)]
mod test {
    use court_engine::{
        db_types::{CourtSettings, PayoutBatchStatus},
        test_utils::{seed, signed_verification, TestSystem},
    };

    use super::*;

    #[tokio::test]
    async fn stranded_batches_are_released() {
        let system = TestSystem::new("worker-hall", CourtSettings::default()).await;
        system.add_vendor("dosa-hut", &[("masala-dosa", 12_000)]).await;
        let asha = system.customer("asha");
        system.carts.add_line(&asha, "masala-dosa", 1, None).await.unwrap();
        let snapshot = system.carts.checkout(&asha).await.unwrap();
        let inserted = system.orders.split_and_create(&snapshot).await.unwrap();
        let intent = system.payments.create_intent(&asha, inserted.root.id).await.unwrap();
        let verification = signed_verification(inserted.root.id, &intent.gateway_order_id, "pay_1");
        system.payments.verify_and_complete(&asha, verification).await.unwrap();
        let claim = system.db.claim_pending_allocations("worker-hall", "dosa-hut", 250).await.unwrap().unwrap();

        assert_eq!(reconcile_payouts(&system.settlement, Duration::minutes(30)).await.unwrap(), 0);
        seed::backdate_payout_batch(&system.db, claim.batch.id, 45).await;
        assert_eq!(reconcile_payouts(&system.settlement, Duration::minutes(30)).await.unwrap(), 1);
        let batch = system.db.fetch_payout_batch(claim.batch.id).await.unwrap().unwrap();
        assert_eq!(batch.status, PayoutBatchStatus::Failed);
        system.teardown().await;
    }
}

use chrono::Duration;
use court_engine::{
    db_types::{CourtSettings, GatewayAccountStatus, Paise, PayoutBatchStatus, PayoutStatus},
    settlement_objects::WebhookOutcome,
    test_utils::{rupees, seed, signed_transfer_webhook, signed_verification, signed_webhook, TestSystem},
    AuditManagement,
    CourtError,
    InsertedOrders,
    PaymentManagement,
    SettlementManagement,
};

async fn food_hall() -> TestSystem {
    let system = TestSystem::new("food-hall", CourtSettings::default()).await;
    system.add_vendor("dosa-hut", &[("masala-dosa", 10_000)]).await;
    system.add_vendor("chaat-corner", &[("pani-puri", 5_000)]).await;
    system
}

/// A paid 250 rupee checkout: 200 for dosa-hut, 50 for chaat-corner
async fn paid_checkout(system: &TestSystem, customer: &str) -> InsertedOrders {
    let actor = system.customer(customer);
    system.carts.add_line(&actor, "masala-dosa", 2, None).await.unwrap();
    system.carts.add_line(&actor, "pani-puri", 1, None).await.unwrap();
    let snapshot = system.carts.checkout(&actor).await.unwrap();
    let inserted = system.orders.split_and_create(&snapshot).await.unwrap();
    let intent = system.payments.create_intent(&actor, inserted.root.id).await.unwrap();
    let verification = signed_verification(inserted.root.id, &intent.gateway_order_id, &format!("pay_{customer}"));
    system.payments.verify_and_complete(&actor, verification).await.unwrap();
    inserted
}

#[tokio::test]
async fn a_payout_sends_the_vendor_share_less_the_platform_fee() {
    let system = food_hall().await;
    system.link_payout_account("dosa-hut").await;
    let first = paid_checkout(&system, "asha").await;
    let second = paid_checkout(&system, "ravi").await;

    let batch = system.settlement.batch_payout(&system.admin(), "dosa-hut").await.unwrap();
    assert_eq!(batch.status, PayoutBatchStatus::Processing);
    assert_eq!(batch.gross_amount, rupees(400));
    assert_eq!(batch.platform_fee, rupees(10));
    assert_eq!(batch.vendor_amount, rupees(390));
    assert_eq!(batch.transfer_id.as_deref(), Some("trf_mock_1"));
    let mut payments = batch.payment_ids.clone();
    payments.sort();
    assert_eq!(payments, vec![first.payment.id, second.payment.id]);

    let transfers = system.gateway.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].fund_account_id, "fa_dosa-hut");
    assert_eq!(transfers[0].amount, rupees(390));

    // chaat-corner's share is untouched, so the payments still have money waiting
    let pending = system.db.fetch_pending_allocations("food-hall", "chaat-corner").await.unwrap();
    assert_eq!(pending.len(), 2);
    let payment = system.db.fetch_payment_for_order(first.root.id).await.unwrap().unwrap();
    assert_eq!(payment.vendor_payout_status, PayoutStatus::Pending);

    let err = system.settlement.batch_payout(&system.admin(), "dosa-hut").await.unwrap_err();
    assert!(matches!(err, CourtError::NoPendingPayouts(_)), "{err}");

    let audit = system.db.fetch_audit_entries("payout_batch", &batch.id.to_string()).await.unwrap();
    assert_eq!(audit[0].action, "transfer_initiated");
    assert!(system.publisher.wait_for("vendor:dosa-hut", "payout:status").await.is_some());
    system.teardown().await;
}

#[tokio::test]
async fn the_platform_fee_is_rounded_per_payment() {
    let system = food_hall().await;
    system.add_vendor("tea-stall", &[("masala-chai", 1_019)]).await;
    system.link_payout_account("tea-stall").await;
    for customer in ["asha", "ravi"] {
        let actor = system.customer(customer);
        system.carts.add_line(&actor, "masala-chai", 1, None).await.unwrap();
        let snapshot = system.carts.checkout(&actor).await.unwrap();
        let inserted = system.orders.split_and_create(&snapshot).await.unwrap();
        let intent = system.payments.create_intent(&actor, inserted.root.id).await.unwrap();
        let verification = signed_verification(inserted.root.id, &intent.gateway_order_id, &format!("pay_{customer}"));
        system.payments.verify_and_complete(&actor, verification).await.unwrap();
    }

    // 2.5% of 10.19 is 25.475 paise, so 25 paise per payment. On the gross of 20.38 it would come to 51.
    let batch = system.settlement.batch_payout(&system.admin(), "tea-stall").await.unwrap();
    assert_eq!(batch.gross_amount, Paise::from(2_038));
    assert_eq!(batch.platform_fee, Paise::from(50));
    assert_eq!(batch.vendor_amount, Paise::from(1_988));
    assert_eq!(batch.gross_amount, batch.platform_fee + batch.vendor_amount);
    system.teardown().await;
}

#[tokio::test]
async fn a_failed_transfer_releases_the_whole_batch() {
    let system = food_hall().await;
    system.link_payout_account("dosa-hut").await;
    paid_checkout(&system, "asha").await;

    system.gateway.set_transfer_failure(true);
    let err = system.settlement.batch_payout(&system.admin(), "dosa-hut").await.unwrap_err();
    assert!(matches!(err, CourtError::GatewayUnavailable(_)), "{err}");
    let pending = system.db.fetch_pending_allocations("food-hall", "dosa-hut").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending.iter().all(|a| a.payout_status == PayoutStatus::Pending && a.payout_batch_id.is_none()));
    let failed = system.publisher.wait_for("vendor:dosa-hut", "payout:status").await.expect("vendor told");
    assert_eq!(failed.payload["batch"]["status"], "failed");

    system.gateway.set_transfer_failure(false);
    let batch = system.settlement.batch_payout(&system.admin(), "dosa-hut").await.unwrap();
    assert_eq!(batch.gross_amount, rupees(200));
    assert!(system.db.fetch_pending_allocations("food-hall", "dosa-hut").await.unwrap().is_empty());
    system.teardown().await;
}

#[tokio::test]
async fn only_admins_pay_out_and_only_to_eligible_vendors() {
    let system = food_hall().await;
    paid_checkout(&system, "asha").await;

    let err = system.settlement.batch_payout(&system.vendor("dosa-hut"), "dosa-hut").await.unwrap_err();
    assert!(matches!(err, CourtError::Forbidden(_)));
    let err = system.settlement.batch_payout(&system.admin(), "no-such-vendor").await.unwrap_err();
    assert!(matches!(err, CourtError::NotFound(_)), "{err}");
    let err = system.settlement.batch_payout(&system.admin(), "dosa-hut").await.unwrap_err();
    assert!(matches!(err, CourtError::VendorIneligible(..)), "{err}");

    seed::seed_vendor_account(&system.db, "food-hall", "chaat-corner", "acc_chaat", None, GatewayAccountStatus::Activated)
        .await;
    let err = system.settlement.batch_payout(&system.admin(), "chaat-corner").await.unwrap_err();
    assert!(matches!(err, CourtError::VendorIneligible(..)), "no fund account: {err}");
    assert!(system.gateway.transfers().is_empty());
    system.teardown().await;
}

#[tokio::test]
async fn a_suspended_account_keeps_its_money_pending() {
    let system = food_hall().await;
    system.link_payout_account("dosa-hut").await;
    paid_checkout(&system, "asha").await;

    let (body, signature) = signed_webhook("evt_1", "account.suspended", "account", "acc_dosa-hut");
    let outcome = system.settlement.handle_webhook(&body, &signature).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Applied { event: "account.suspended".into() });
    let account = system.db.fetch_vendor_account("dosa-hut").await.unwrap().unwrap();
    assert_eq!(account.activation_status, GatewayAccountStatus::Suspended);
    assert!(system.publisher.wait_for("vendor:dosa-hut", "account:status").await.is_some());

    let err = system.settlement.batch_payout(&system.admin(), "dosa-hut").await.unwrap_err();
    assert!(matches!(err, CourtError::VendorIneligible(..)), "{err}");
    let pending = system.db.fetch_pending_allocations("food-hall", "dosa-hut").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].amount, rupees(200));

    let (body, signature) = signed_webhook("evt_2", "account.activated", "account", "acc_dosa-hut");
    system.settlement.handle_webhook(&body, &signature).await.unwrap();
    assert!(system.settlement.batch_payout(&system.admin(), "dosa-hut").await.is_ok());
    system.teardown().await;
}

#[tokio::test]
async fn funds_on_hold_block_payouts_until_released() {
    let system = food_hall().await;
    system.link_payout_account("dosa-hut").await;
    paid_checkout(&system, "asha").await;

    let (body, signature) = signed_webhook("evt_hold", "account.funds_on_hold", "account", "acc_dosa-hut");
    system.settlement.handle_webhook(&body, &signature).await.unwrap();
    let err = system.settlement.batch_payout(&system.admin(), "dosa-hut").await.unwrap_err();
    assert!(matches!(err, CourtError::VendorIneligible(..)), "{err}");

    let (body, signature) = signed_webhook("evt_release", "account.funds_released", "account", "acc_dosa-hut");
    system.settlement.handle_webhook(&body, &signature).await.unwrap();
    assert!(system.settlement.batch_payout(&system.admin(), "dosa-hut").await.is_ok());
    system.teardown().await;
}

#[tokio::test]
async fn transfer_webhooks_settle_or_reopen_a_batch() {
    let system = food_hall().await;
    system.link_payout_account("dosa-hut").await;
    system.link_payout_account("chaat-corner").await;
    let inserted = paid_checkout(&system, "asha").await;

    let dosa_batch = system.settlement.batch_payout(&system.admin(), "dosa-hut").await.unwrap();
    let chaat_batch = system.settlement.batch_payout(&system.admin(), "chaat-corner").await.unwrap();
    let payment = system.db.fetch_payment_for_order(inserted.root.id).await.unwrap().unwrap();
    assert_eq!(payment.vendor_payout_status, PayoutStatus::Processing);

    let transfer = dosa_batch.transfer_id.clone().unwrap();
    let (body, signature) = signed_webhook("evt_t1", "transfer.processed", "transfer", &transfer);
    system.settlement.handle_webhook(&body, &signature).await.unwrap();
    let settled = system.db.fetch_payout_batch(dosa_batch.id).await.unwrap().unwrap();
    assert_eq!(settled.status, PayoutBatchStatus::Processed);

    let transfer = chaat_batch.transfer_id.clone().unwrap();
    let (body, signature) = signed_webhook("evt_t2", "transfer.failed", "transfer", &transfer);
    system.settlement.handle_webhook(&body, &signature).await.unwrap();
    let failed = system.db.fetch_payout_batch(chaat_batch.id).await.unwrap().unwrap();
    assert_eq!(failed.status, PayoutBatchStatus::Failed);
    assert!(failed.failure_reason.is_some());

    let pending = system.db.fetch_pending_allocations("food-hall", "chaat-corner").await.unwrap();
    assert_eq!(pending.len(), 1);
    let payment = system.db.fetch_payment_for_order(inserted.root.id).await.unwrap().unwrap();
    assert_eq!(payment.vendor_payout_status, PayoutStatus::Pending);

    let retry = system.settlement.batch_payout(&system.admin(), "chaat-corner").await.unwrap();
    let transfer = retry.transfer_id.clone().unwrap();
    let (body, signature) = signed_webhook("evt_t3", "transfer.processed", "transfer", &transfer);
    system.settlement.handle_webhook(&body, &signature).await.unwrap();
    let payment = system.db.fetch_payment_for_order(inserted.root.id).await.unwrap().unwrap();
    assert_eq!(payment.vendor_payout_status, PayoutStatus::Paid);
    system.teardown().await;
}

#[tokio::test]
async fn webhooks_are_applied_at_most_once() {
    let system = food_hall().await;
    system.link_payout_account("dosa-hut").await;
    let (body, signature) = signed_webhook("evt_dup", "account.funds_on_hold", "account", "acc_dosa-hut");
    let first = system.settlement.handle_webhook(&body, &signature).await.unwrap();
    assert!(matches!(first, WebhookOutcome::Applied { .. }));
    let second = system.settlement.handle_webhook(&body, &signature).await.unwrap();
    assert_eq!(second, WebhookOutcome::Duplicate { event_id: "evt_dup".into() });
    let audit = system.db.fetch_audit_entries("vendor_account", "dosa-hut").await.unwrap();
    assert_eq!(audit.len(), 1);
    system.teardown().await;
}

#[tokio::test]
async fn webhooks_must_carry_a_valid_signature() {
    let system = food_hall().await;
    system.link_payout_account("dosa-hut").await;
    let (mut body, signature) = signed_webhook("evt_bad", "account.suspended", "account", "acc_dosa-hut");
    body.push(b' ');
    let err = system.settlement.handle_webhook(&body, &signature).await.unwrap_err();
    assert!(matches!(err, CourtError::InvalidSignature));
    let err = system.settlement.handle_webhook(b"{}", "").await.unwrap_err();
    assert!(matches!(err, CourtError::InvalidSignature));
    let account = system.db.fetch_vendor_account("dosa-hut").await.unwrap().unwrap();
    assert_eq!(account.activation_status, GatewayAccountStatus::Activated);
    assert!(!system.db.webhook_event_seen("evt_bad").await.unwrap());
    system.teardown().await;
}

#[tokio::test]
async fn unknown_events_and_strangers_are_never_applied() {
    let system = food_hall().await;
    let (body, signature) = signed_webhook("evt_x", "payment.dispute.created", "account", "acc_dosa-hut");
    let outcome = system.settlement.handle_webhook(&body, &signature).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Ignored { event: "payment.dispute.created".into() });
    assert!(system.db.webhook_event_seen("evt_x").await.unwrap());

    let (body, signature) = signed_webhook("evt_y", "account.activated", "account", "acc_nobody");
    let outcome = system.settlement.handle_webhook(&body, &signature).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));

    let (body, signature) = signed_webhook("evt_z", "transfer.processed", "transfer", "trf_unknown");
    let outcome = system.settlement.handle_webhook(&body, &signature).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Deferred { event: "transfer.processed".into() });
    assert!(!system.db.webhook_event_seen("evt_z").await.unwrap());
    system.teardown().await;
}

#[tokio::test]
async fn a_stranded_batch_picks_up_its_transfer_from_the_webhook() {
    let system = food_hall().await;
    let inserted = paid_checkout(&system, "asha").await;
    let claim = system.db.claim_pending_allocations("food-hall", "dosa-hut", 250).await.unwrap().unwrap();
    assert_eq!(claim.batch.status, PayoutBatchStatus::Initiated);
    let reference = format!("payout-{}", claim.batch.id);

    // Not ours to settle yet, so the gateway has to deliver it again
    let (body, signature) = signed_transfer_webhook("evt_early", "transfer.processed", "trf_early", "payout-9999");
    let outcome = system.settlement.handle_webhook(&body, &signature).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::Deferred { .. }));
    assert!(!system.db.webhook_event_seen("evt_early").await.unwrap());

    let (body, signature) = signed_transfer_webhook("evt_early", "transfer.processed", "trf_early", &reference);
    let outcome = system.settlement.handle_webhook(&body, &signature).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Applied { event: "transfer.processed".into() });
    assert!(system.db.webhook_event_seen("evt_early").await.unwrap());

    let batch = system.db.fetch_payout_batch(claim.batch.id).await.unwrap().unwrap();
    assert_eq!(batch.status, PayoutBatchStatus::Processed);
    assert_eq!(batch.transfer_id.as_deref(), Some("trf_early"));
    let audit = system.db.fetch_audit_entries("payout_batch", &batch.id.to_string()).await.unwrap();
    assert!(audit.iter().any(|e| e.action == "transfer_adopted"), "{audit:?}");
    let payment = system.db.fetch_payment_for_order(inserted.root.id).await.unwrap().unwrap();
    // chaat-corner's share is still waiting
    assert_eq!(payment.vendor_payout_status, PayoutStatus::Pending);
    system.teardown().await;
}

#[tokio::test]
async fn stale_initiated_batches_are_released() {
    let system = food_hall().await;
    paid_checkout(&system, "asha").await;
    let stale = system.db.claim_pending_allocations("food-hall", "dosa-hut", 250).await.unwrap().unwrap().batch;
    let fresh = system.db.claim_pending_allocations("food-hall", "chaat-corner", 250).await.unwrap().unwrap().batch;
    seed::backdate_payout_batch(&system.db, stale.id, 60).await;

    let released = system.settlement.reconcile_stale_batches(Duration::minutes(30)).await.unwrap();
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].id, stale.id);
    assert_eq!(released[0].status, PayoutBatchStatus::Failed);
    assert!(released[0].failure_reason.is_some());
    let pending = system.db.fetch_pending_allocations("food-hall", "dosa-hut").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].payout_batch_id.is_none());
    let fresh = system.db.fetch_payout_batch(fresh.id).await.unwrap().unwrap();
    assert_eq!(fresh.status, PayoutBatchStatus::Initiated);
    let audit = system.db.fetch_audit_entries("payout_batch", &stale.id.to_string()).await.unwrap();
    assert_eq!(audit[0].action, "released_stale");
    assert!(system.settlement.reconcile_stale_batches(Duration::minutes(30)).await.unwrap().is_empty());

    // A transfer that turns up after the release is acknowledged but does not revive the batch
    let reference = format!("payout-{}", stale.id);
    let (body, signature) = signed_transfer_webhook("evt_late", "transfer.processed", "trf_late", &reference);
    let outcome = system.settlement.handle_webhook(&body, &signature).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
    assert!(system.db.webhook_event_seen("evt_late").await.unwrap());
    let batch = system.db.fetch_payout_batch(stale.id).await.unwrap().unwrap();
    assert_eq!(batch.status, PayoutBatchStatus::Failed);
    system.teardown().await;
}

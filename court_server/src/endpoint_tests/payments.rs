use actix_web::{http::StatusCode, test::TestRequest};
use court_engine::test_utils::{signed_verification, signed_webhook};
use serde_json::Value;

use super::helpers::{as_actor, food_hall, id_of, pay, send, split_checkout};
use crate::routes::SIGNATURE_HEADER;

fn webhook(body: Vec<u8>, signature: Option<&str>) -> TestRequest {
    let req = TestRequest::post()
        .uri("/gateway/webhook")
        .insert_header(("content-type", "application/json"))
        .set_payload(body);
    match signature {
        Some(s) => req.insert_header((SIGNATURE_HEADER, s.to_string())),
        None => req,
    }
}

#[actix_web::test]
async fn verified_payments_confirm_the_checkout_once() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let checkout = split_checkout(&system, "asha").await;

    let (status, order) = pay(&system, "asha", &checkout, "pay_42").await;
    assert_eq!(status, StatusCode::OK, "{order}");
    assert_eq!(order["payment_status"], "paid");
    assert_eq!(order["status"], "confirmed");

    let (status, replay) = pay(&system, "asha", &checkout, "pay_42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["id"], order["id"]);
    assert_eq!(replay["version"], order["version"]);

    let (status, _) = pay(&system, "asha", &checkout, "pay_43").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(system.publisher.wait_for("vendor:dosa-hut", "order:paid").await.is_some());
    system.teardown().await;
}

#[actix_web::test]
async fn tampered_callbacks_are_unauthorized() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let checkout = split_checkout(&system, "asha").await;
    let root = id_of(&checkout["orders"]["root"]);
    let gateway_order_id = checkout["intent"]["gateway_order_id"].as_str().unwrap();

    let mut verification = signed_verification(root, gateway_order_id, "pay_1");
    verification.gateway_payment_id = "pay_2".into();
    let req = TestRequest::post().uri("/api/payments/verify").set_json(&verification);
    let (status, body) = send(&system, as_actor(req, &system.customer("asha"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().is_some(), "{body}");

    let req = TestRequest::get().uri(&format!("/api/orders/{root}"));
    let (_, view) = send(&system, as_actor(req, &system.customer("asha"))).await;
    assert_eq!(view["order"]["payment_status"], "unpaid");
    system.teardown().await;
}

#[actix_web::test]
async fn admins_pay_vendors_out_once() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    system.link_payout_account("dosa-hut").await;
    let checkout = split_checkout(&system, "asha").await;
    pay(&system, "asha", &checkout, "pay_1").await;

    let payout = || TestRequest::post().uri("/api/payouts/dosa-hut");
    let (status, _) = send(&system, as_actor(payout(), &system.customer("asha"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&system, as_actor(payout(), &system.vendor("dosa-hut"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, batch) = send(&system, as_actor(payout(), &system.admin())).await;
    assert_eq!(status, StatusCode::OK, "{batch}");
    assert_eq!(batch["gross_amount"], 20_000);
    assert_eq!(batch["platform_fee"], 500);
    assert_eq!(batch["vendor_amount"], 19_500);
    assert_eq!(batch["transfer_id"], "trf_mock_1");

    let (status, _) = send(&system, as_actor(payout(), &system.admin())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let req = TestRequest::post().uri("/api/payouts/chaat-corner");
    let (status, _) = send(&system, as_actor(req, &system.admin())).await;
    assert_eq!(status, StatusCode::CONFLICT, "chaat-corner has no payout account");
    system.teardown().await;
}

#[actix_web::test]
async fn webhooks_are_acknowledged_once_and_must_be_signed() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    system.link_payout_account("dosa-hut").await;

    let (body, signature) = signed_webhook("evt_1", "account.suspended", "account", "acc_dosa-hut");
    let (status, outcome) = send(&system, webhook(body.clone(), Some(&signature))).await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["result"], "applied");
    assert_eq!(outcome["event"], "account.suspended");

    let (status, outcome) = send(&system, webhook(body.clone(), Some(&signature))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["result"], "duplicate");
    assert_eq!(outcome["event_id"], "evt_1");

    let (body, signature) = signed_webhook("evt_2", "settlement.processed", "account", "acc_dosa-hut");
    let (status, outcome) = send(&system, webhook(body, Some(&signature))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["result"], "ignored");

    let (body, signature) = signed_webhook("evt_early", "transfer.processed", "transfer", "trf_unknown");
    let (status, outcome) = send(&system, webhook(body.clone(), Some(&signature))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{outcome}");
    assert_eq!(outcome["result"], "deferred");
    let (status, outcome) = send(&system, webhook(body, Some(&signature))).await;
    assert_eq!(outcome["result"], "deferred", "redelivery is not a duplicate");
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (body, _) = signed_webhook("evt_3", "account.activated", "account", "acc_dosa-hut");
    let (status, _) = send(&system, webhook(body.clone(), Some("00ff"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, error) = send(&system, webhook(body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_ne!(error["error"], Value::Null);
    system.teardown().await;
}

use actix_web::{http::StatusCode, test::TestRequest};
use court_engine::test_utils::seed;
use serde_json::{json, Value};

use super::helpers::{add_to_cart, as_actor, food_hall, id_of, send, split_checkout};

#[actix_web::test]
async fn cart_lines_keep_the_total_current() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let asha = system.customer("asha");

    let (status, cart) = send(&system, as_actor(TestRequest::get().uri("/api/cart"), &asha)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart, Value::Null);

    let (status, cart) = add_to_cart(&system, "asha", "masala-dosa", 2).await;
    assert_eq!(status, StatusCode::OK, "{cart}");
    assert_eq!(cart["total"], 20_000);
    let (_, cart) = add_to_cart(&system, "asha", "pani-puri", 1).await;
    assert_eq!(cart["total"], 25_000);
    assert_eq!(cart["lines"].as_array().map(Vec::len), Some(2));

    let req = TestRequest::put().uri("/api/cart/lines/masala-dosa").set_json(json!({ "quantity": 3 }));
    let (status, cart) = send(&system, as_actor(req, &asha)).await;
    assert_eq!(status, StatusCode::OK, "{cart}");
    assert_eq!(cart["total"], 35_000);

    let req = TestRequest::delete().uri("/api/cart/lines/pani-puri");
    let (status, cart) = send(&system, as_actor(req, &asha)).await;
    assert_eq!(status, StatusCode::OK, "{cart}");
    assert_eq!(cart["total"], 30_000);
    assert_eq!(cart["lines"].as_array().map(Vec::len), Some(1));

    let (_, cart) = send(&system, as_actor(TestRequest::get().uri("/api/cart"), &asha)).await;
    assert_eq!(cart["total"], 30_000);
    system.teardown().await;
}

#[actix_web::test]
async fn unknown_and_sold_out_items_are_refused() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let (status, body) = add_to_cart(&system, "asha", "idli", 1).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some(), "{body}");

    seed::set_menu_item_stock(&system.db, "masala-dosa", false).await;
    let (status, _) = add_to_cart(&system, "asha", "masala-dosa", 1).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    system.teardown().await;
}

#[actix_web::test]
async fn checkout_splits_the_cart_and_opens_an_intent() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let checkout = split_checkout(&system, "asha").await;

    assert_eq!(checkout["orders"]["root"]["total"], 25_000);
    assert_eq!(checkout["orders"]["sub_orders"].as_array().map(Vec::len), Some(2));
    assert_eq!(checkout["intent"]["gateway_order_id"], "order_mock_1");
    assert_eq!(checkout["intent"]["amount"], 25_000);
    assert!(checkout.get("intent_error").is_none());

    let (status, _) = send(&system, as_actor(TestRequest::post().uri("/api/checkout"), &system.customer("asha"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    system.teardown().await;
}

#[actix_web::test]
async fn a_gateway_outage_does_not_lose_the_checkout() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    system.gateway.set_intent_failure(true);
    let checkout = split_checkout(&system, "asha").await;
    assert_eq!(checkout["intent"], Value::Null);
    assert!(checkout["intent_error"].as_str().is_some(), "{checkout}");
    let root = id_of(&checkout["orders"]["root"]);

    let asha = system.customer("asha");
    let pay = || TestRequest::post().uri(&format!("/api/orders/{root}/pay"));
    let (status, _) = send(&system, as_actor(pay(), &asha)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    system.gateway.set_intent_failure(false);
    let (status, intent) = send(&system, as_actor(pay(), &asha)).await;
    assert_eq!(status, StatusCode::OK, "{intent}");
    assert_eq!(intent["order_id"], root);
    assert_eq!(intent["amount"], 25_000);
    system.teardown().await;
}

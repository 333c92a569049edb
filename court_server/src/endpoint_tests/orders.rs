use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::{json, Value};

use super::helpers::{add_to_cart, as_actor, food_hall, id_of, pay, send, split_checkout, vendor_order_id};

fn status_update(order_id: i64, status: &str) -> TestRequest {
    TestRequest::post().uri(&format!("/api/orders/{order_id}/status")).set_json(json!({ "status": status }))
}

#[actix_web::test]
async fn vendors_move_paid_orders_through_the_kitchen() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let checkout = split_checkout(&system, "asha").await;
    let dosa = vendor_order_id(&checkout, "dosa-hut");
    let dosa_hut = system.vendor("dosa-hut");

    let (status, _) = send(&system, as_actor(status_update(dosa, "confirmed"), &dosa_hut)).await;
    assert_eq!(status, StatusCode::CONFLICT, "unpaid orders cannot be accepted");

    let (status, _) = pay(&system, "asha", &checkout, "pay_1").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&system, as_actor(status_update(dosa, "preparing"), &system.vendor("chaat-corner"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&system, as_actor(status_update(dosa, "completed"), &dosa_hut)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    for step in ["preparing", "ready", "completed"] {
        let (status, order) = send(&system, as_actor(status_update(dosa, step), &dosa_hut)).await;
        assert_eq!(status, StatusCode::OK, "{order}");
        assert_eq!(order["status"], step);
    }

    let root = id_of(&checkout["orders"]["root"]);
    let req = TestRequest::get().uri(&format!("/api/orders/{root}"));
    let (status, view) = send(&system, as_actor(req, &system.customer("asha"))).await;
    assert_eq!(status, StatusCode::OK, "{view}");
    assert_eq!(view["aggregate_status"], "confirmed");
    assert_eq!(view["sub_orders"].as_array().map(Vec::len), Some(2));

    let req = TestRequest::get().uri(&format!("/api/orders/{root}"));
    let (status, _) = send(&system, as_actor(req, &system.customer("ravi"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&system, as_actor(TestRequest::get().uri("/api/orders/9999"), &dosa_hut)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    system.teardown().await;
}

#[actix_web::test]
async fn customers_cancel_pending_orders_only() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let asha = system.customer("asha");

    add_to_cart(&system, "asha", "masala-dosa", 1).await;
    let (_, first) = send(&system, as_actor(TestRequest::post().uri("/api/checkout"), &asha)).await;
    let first_id = id_of(&first["orders"]["root"]);
    let req = TestRequest::post()
        .uri(&format!("/api/orders/{first_id}/cancel"))
        .set_json(json!({ "reason": "changed my mind" }));
    let (status, order) = send(&system, as_actor(req, &asha)).await;
    assert_eq!(status, StatusCode::OK, "{order}");
    assert_eq!(order["status"], "cancelled");
    assert_eq!(order["cancellation_reason"], "changed my mind");

    add_to_cart(&system, "asha", "masala-dosa", 1).await;
    let (_, second) = send(&system, as_actor(TestRequest::post().uri("/api/checkout"), &asha)).await;
    let second_id = id_of(&second["orders"]["root"]);
    pay(&system, "asha", &second, "pay_2").await;
    let (status, _) = send(&system, as_actor(status_update(second_id, "preparing"), &system.vendor("dosa-hut"))).await;
    assert_eq!(status, StatusCode::OK);
    let req = TestRequest::post().uri(&format!("/api/orders/{second_id}/cancel"));
    let (status, body) = send(&system, as_actor(req, &asha)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().is_some(), "{body}");
    system.teardown().await;
}

#[actix_web::test]
async fn counter_orders_can_be_looked_up_by_their_slip() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let dosa_hut = system.vendor("dosa-hut");
    let request = json!({
        "vendor_id": "dosa-hut",
        "lines": [{ "menu_item_id": "masala-dosa", "quantity": 3, "unit_price": 9_000 }],
        "payment_method": "cash_on_delivery",
    });
    let req = TestRequest::post().uri("/api/orders/manual").set_json(&request);
    let (status, result) = send(&system, as_actor(req, &dosa_hut)).await;
    assert_eq!(status, StatusCode::CREATED, "{result}");
    assert_eq!(result["order"]["status"], "confirmed");
    assert_eq!(result["order"]["total"], 27_000);
    let token = result["ack_token"].as_str().expect("no ack token");

    let req = TestRequest::post().uri("/api/orders/lookup").set_json(json!({ "token": token }));
    let (status, order) = send(&system, as_actor(req, &dosa_hut)).await;
    assert_eq!(status, StatusCode::OK, "{order}");
    assert_eq!(order["id"], result["order"]["id"]);

    let req = TestRequest::post().uri("/api/orders/lookup").set_json(json!({ "token": token }));
    let (status, _) = send(&system, as_actor(req, &system.vendor("chaat-corner"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = TestRequest::post().uri("/api/orders/manual").set_json(&request);
    let (status, _) = send(&system, as_actor(req, &system.customer("asha"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    system.teardown().await;
}

#[actix_web::test]
async fn order_lists_depend_on_who_is_asking() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let paid = split_checkout(&system, "asha").await;
    pay(&system, "asha", &paid, "pay_1").await;
    add_to_cart(&system, "ravi", "masala-dosa", 1).await;
    let (status, _) = send(&system, as_actor(TestRequest::post().uri("/api/checkout"), &system.customer("ravi"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let count = |v: &Value| v.as_array().map(Vec::len).unwrap_or_default();
    let dosa_hut = system.vendor("dosa-hut");
    let (status, all) = send(&system, as_actor(TestRequest::get().uri("/api/orders"), &dosa_hut)).await;
    assert_eq!(status, StatusCode::OK, "{all}");
    assert_eq!(count(&all), 2);
    let req = TestRequest::get().uri("/api/orders?status=confirmed");
    let (_, confirmed) = send(&system, as_actor(req, &dosa_hut)).await;
    assert_eq!(count(&confirmed), 1);
    assert_eq!(confirmed[0]["id"], vendor_order_id(&paid, "dosa-hut"));

    let (_, mine) = send(&system, as_actor(TestRequest::get().uri("/api/orders"), &system.customer("asha"))).await;
    assert_eq!(count(&mine), 1);
    assert_eq!(mine[0]["id"], paid["orders"]["root"]["id"]);

    let (status, _) = send(&system, as_actor(TestRequest::get().uri("/api/orders"), &system.admin())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let req = TestRequest::get().uri("/api/orders?vendor_id=chaat-corner");
    let (status, chaat) = send(&system, as_actor(req, &system.admin())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(count(&chaat), 1);

    let req = TestRequest::get().uri("/api/orders?vendor_id=chaat-corner");
    let (status, _) = send(&system, as_actor(req, &dosa_hut)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let req = TestRequest::get().uri("/api/orders?status=cooking");
    let (status, _) = send(&system, as_actor(req, &dosa_hut)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    system.teardown().await;
}

#[actix_web::test]
async fn completed_orders_are_rated_once() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let asha = system.customer("asha");
    add_to_cart(&system, "asha", "masala-dosa", 1).await;
    let (_, checkout) = send(&system, as_actor(TestRequest::post().uri("/api/checkout"), &asha)).await;
    let order_id = id_of(&checkout["orders"]["root"]);
    let rate = |rating: i64| {
        TestRequest::post().uri(&format!("/api/orders/{order_id}/rating")).set_json(json!({ "rating": rating }))
    };

    let (status, _) = send(&system, as_actor(rate(5), &asha)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "only completed orders can be rated");

    pay(&system, "asha", &checkout, "pay_1").await;
    for step in ["preparing", "ready", "completed"] {
        send(&system, as_actor(status_update(order_id, step), &system.vendor("dosa-hut"))).await;
    }
    let (status, rated) = send(&system, as_actor(rate(4), &asha)).await;
    assert_eq!(status, StatusCode::OK, "{rated}");
    assert_eq!(rated["order"]["rating"], 4);
    assert_eq!(rated["vendor"]["total_ratings"], 1);

    let (status, _) = send(&system, as_actor(rate(1), &asha)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    system.teardown().await;
}

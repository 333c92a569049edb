use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::Value;

use super::helpers::{as_actor, food_hall, id_of, send, split_checkout};

#[actix_web::test]
async fn health() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let (status, body) = send(&system, TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("👍️\n".into()));
    system.teardown().await;
}

#[actix_web::test]
async fn requests_without_an_identity_are_unauthorized() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let (status, body) = send(&system, TestRequest::get().uri("/api/cart")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().is_some(), "{body}");

    let req = TestRequest::get().uri("/api/cart").insert_header(("x-court-user", "asha"));
    let (status, _) = send(&system, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    system.teardown().await;
}

#[actix_web::test]
async fn the_system_role_cannot_be_claimed() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let req = TestRequest::get()
        .uri("/api/orders")
        .insert_header(("x-court-user", "system"))
        .insert_header(("x-court-role", "system"))
        .insert_header(("x-court-id", "food-hall"));
    let (status, _) = send(&system, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    system.teardown().await;
}

#[actix_web::test]
async fn vendors_have_no_cart() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let req = as_actor(TestRequest::get().uri("/api/cart"), &system.vendor("dosa-hut"));
    let (status, body) = send(&system, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().is_some(), "{body}");
    system.teardown().await;
}

#[actix_web::test]
async fn customers_can_open_the_stream() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let req = as_actor(TestRequest::get().uri("/api/stream"), &system.customer("asha"));
    let (status, body) = send(&system, req).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().expect("stream body is text");
    assert!(text.starts_with(": connected"), "{text}");

    let req = as_actor(TestRequest::get().uri("/api/stream"), &system.admin());
    let (status, _) = send(&system, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    system.teardown().await;
}

#[actix_web::test]
async fn only_the_people_on_an_order_can_join_its_room() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let checkout = split_checkout(&system, "asha").await;
    let root_id = id_of(&checkout["orders"]["root"]);
    let sub_id = id_of(&checkout["orders"]["sub_orders"][0]);

    let uri = format!("/api/stream?order_id={root_id}");
    let (status, body) = send(&system, as_actor(TestRequest::get().uri(&uri), &system.customer("asha"))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, _) = send(&system, as_actor(TestRequest::get().uri(&uri), &system.customer("ravi"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/api/stream?order_id={sub_id}");
    let vendor = system.vendor(checkout["orders"]["sub_orders"][0]["vendor_id"].as_str().unwrap());
    let (status, _) = send(&system, as_actor(TestRequest::get().uri(&uri), &vendor)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&system, as_actor(TestRequest::get().uri("/api/stream?order_id=9999"), &vendor)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    system.teardown().await;
}

#[actix_web::test]
async fn malformed_bodies_are_bad_requests() {
    let _ = env_logger::try_init();
    let system = food_hall().await;
    let req = TestRequest::post()
        .uri("/api/cart/lines")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"menu_item_id\": ");
    let (status, body) = send(&system, as_actor(req, &system.customer("asha"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some(), "{body}");
    system.teardown().await;
}

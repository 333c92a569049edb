use std::time::Duration;

use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use court_engine::{
    db_types::{Actor, CourtSettings},
    payment_objects::PaymentConfig,
    settlement_objects::SettlementConfig,
    test_utils::{
        signed_verification,
        MockGateway,
        TestSystem,
        TEST_GATEWAY_TIMEOUT,
        TEST_SIGNING_SECRET,
        TEST_WEBHOOK_SECRET,
    },
    CartApi,
    OrderFlowApi,
    PaymentApi,
    SettlementApi,
    SqliteDatabase,
};
use log::debug;
use serde_json::{json, Value};

use crate::{
    config::ServerOptions,
    identity::{COURT_HEADER, ROLE_HEADER, USER_HEADER},
    server::{configure_routes, json_config},
    stream::BroadcastPublisher,
};

pub const STREAM_LIFETIME: Duration = Duration::from_millis(100);

/// A court with two vendors: dosa-hut sells masala-dosa for ₹100 and chaat-corner sells pani-puri for ₹50.
pub async fn food_hall() -> TestSystem {
    let system = TestSystem::new("food-hall", CourtSettings::default()).await;
    system.add_vendor("dosa-hut", &[("masala-dosa", 10_000)]).await;
    system.add_vendor("chaat-corner", &[("pani-puri", 5_000)]).await;
    system
}

pub fn as_actor(req: TestRequest, actor: &Actor) -> TestRequest {
    req.insert_header((USER_HEADER, actor.user_id.as_str()))
        .insert_header((ROLE_HEADER, actor.role.to_string()))
        .insert_header((COURT_HEADER, actor.court_id.as_str()))
}

/// Runs one request through the full route table, with the engine of `system` behind it. Bodies that are not JSON
/// come back as a JSON string.
pub async fn send(system: &TestSystem, req: TestRequest) -> (StatusCode, Value) {
    let db = system.db.clone();
    let producers = system.producers.clone();
    let payment_config = PaymentConfig::new(TEST_SIGNING_SECRET, TEST_GATEWAY_TIMEOUT);
    let settlement_config = SettlementConfig::new(TEST_WEBHOOK_SECRET, TEST_GATEWAY_TIMEOUT);
    let app = App::new()
        .app_data(json_config())
        .app_data(web::Data::new(CartApi::new(db.clone())))
        .app_data(web::Data::new(OrderFlowApi::new(db.clone(), producers.clone())))
        .app_data(web::Data::new(PaymentApi::new(db.clone(), system.gateway.clone(), producers.clone(), payment_config)))
        .app_data(web::Data::new(SettlementApi::new(db, system.gateway.clone(), producers, settlement_config)))
        .app_data(web::Data::new(BroadcastPublisher::new(16)))
        .app_data(web::Data::new(ServerOptions { stream_session_lifetime: STREAM_LIFETIME }))
        .configure(configure_routes::<SqliteDatabase, MockGateway>);
    let service = test::init_service(app).await;
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = test::read_body(res).await;
    debug!("Response {status}: {}", String::from_utf8_lossy(&body));
    let json = serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into()));
    (status, json)
}

pub async fn add_to_cart(system: &TestSystem, customer: &str, item: &str, quantity: i64) -> (StatusCode, Value) {
    let req = TestRequest::post()
        .uri("/api/cart/lines")
        .set_json(json!({ "menu_item_id": item, "quantity": quantity }));
    send(system, as_actor(req, &system.customer(customer))).await
}

/// Two dosas and a plate of pani-puri, checked out. Returns the checkout response body.
pub async fn split_checkout(system: &TestSystem, customer: &str) -> Value {
    add_to_cart(system, customer, "masala-dosa", 2).await;
    add_to_cart(system, customer, "pani-puri", 1).await;
    let (status, body) = send(system, as_actor(TestRequest::post().uri("/api/checkout"), &system.customer(customer))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

pub fn id_of(order: &Value) -> i64 {
    order["id"].as_i64().expect("order has no id")
}

/// The id of the vendor's order in a checkout response.
pub fn vendor_order_id(checkout: &Value, vendor_id: &str) -> i64 {
    checkout["orders"]["sub_orders"]
        .as_array()
        .and_then(|subs| subs.iter().find(|o| o["vendor_id"] == vendor_id))
        .map(id_of)
        .expect("no order for vendor")
}

/// Relays the gateway's signed callback for the checkout's intent, as the customer's client would.
pub async fn pay(system: &TestSystem, customer: &str, checkout: &Value, payment_id: &str) -> (StatusCode, Value) {
    let root = id_of(&checkout["orders"]["root"]);
    let gateway_order_id = checkout["intent"]["gateway_order_id"].as_str().expect("checkout has no intent");
    let verification = signed_verification(root, gateway_order_id, payment_id);
    let req = TestRequest::post().uri("/api/payments/verify").set_json(&verification);
    send(system, as_actor(req, &system.customer(customer))).await
}

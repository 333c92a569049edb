use std::str::FromStr;

use court_engine::{
    db_types::{OrderStatusType, Paise},
    test_utils::{seed, signed_verification, signed_webhook},
    CourtManagement,
    SettlementManagement,
};
use cucumber::{given, then, when};

use crate::cucumber::world::{rupees, CourtWorld};

//-------------------------------------------   Setup   -------------------------------------------------------------

#[given(expr = "the court takes a {int} basis point fee")]
async fn platform_fee(world: &mut CourtWorld, bps: i64) {
    world.settings.platform_fee_bps = bps;
}

#[given(expr = "the court accepts paid orders automatically")]
async fn auto_accept(world: &mut CourtWorld) {
    world.settings.auto_accept = true;
}

#[given(expr = "a food court '{word}'")]
async fn food_court(world: &mut CourtWorld, court_id: String) {
    world.open_court(&court_id).await;
}

#[given(expr = "vendor '{word}' sells '{word}' for {int} rupees")]
async fn vendor_sells(world: &mut CourtWorld, vendor: String, item: String, price: i64) {
    let sys = world.system();
    if sys.db.fetch_vendor(&sys.court_id, &vendor).await.unwrap().is_none() {
        sys.add_vendor(&vendor, &[(item.as_str(), price * 100)]).await;
        sys.link_payout_account(&vendor).await;
    } else {
        seed::seed_menu_item(&sys.db, &sys.court_id, &vendor, &item, price * 100).await;
    }
}

//-------------------------------------------   Customers   ---------------------------------------------------------

#[when(expr = "'{word}' adds {int} '{word}' to the cart")]
async fn add_to_cart(world: &mut CourtWorld, customer: String, quantity: i64, item: String) {
    let sys = world.system();
    sys.carts.add_line(&sys.customer(&customer), &item, quantity, None).await.expect("Error adding to cart");
}

#[when(expr = "'{word}' checks out")]
async fn check_out(world: &mut CourtWorld, customer: String) {
    let sys = world.system();
    let snapshot = sys.carts.checkout(&sys.customer(&customer)).await.expect("Error checking out");
    let inserted = sys.orders.split_and_create(&snapshot).await.expect("Error creating orders");
    world.checkouts.push((customer, inserted));
}

#[when(expr = "'{word}' pays for the checkout")]
async fn pay(world: &mut CourtWorld, customer: String) {
    let order_id = world.checkout_of(&customer).root.id;
    let sys = world.system();
    let actor = sys.customer(&customer);
    let intent = sys.payments.create_intent(&actor, order_id).await.expect("Error creating intent");
    let verification = signed_verification(order_id, &intent.gateway_order_id, &format!("pay_{order_id}"));
    sys.payments.verify_and_complete(&actor, verification).await.expect("Error completing payment");
}

#[when(expr = "'{word}' cancels the checkout")]
async fn cancel(world: &mut CourtWorld, customer: String) {
    let order_id = world.checkout_of(&customer).root.id;
    let sys = world.system();
    let result = sys.orders.cancel(&sys.customer(&customer), order_id, None).await;
    world.record(result);
}

#[when(expr = "'{word}' rates the '{word}' order {int} stars")]
async fn rate(world: &mut CourtWorld, customer: String, vendor: String, stars: i64) {
    let order_id = world.vendor_order_id(&customer, &vendor);
    let sys = world.system();
    let result = sys.orders.rate_order(&sys.customer(&customer), order_id, stars).await;
    world.record(result);
}

//-------------------------------------------   Vendors   -----------------------------------------------------------

#[when(expr = "'{word}' moves the order of '{word}' to '{word}'")]
async fn vendor_moves(world: &mut CourtWorld, vendor: String, customer: String, status: String) {
    let target = OrderStatusType::from_str(&status).expect("Not an order status");
    let order_id = world.vendor_order_id(&customer, &vendor);
    let sys = world.system();
    let result = sys.orders.transition(&sys.vendor(&vendor), order_id, target, None).await;
    world.record(result);
}

//-------------------------------------------   Settlement   --------------------------------------------------------

#[when(expr = "the admin pays out '{word}'")]
async fn pay_out(world: &mut CourtWorld, vendor: String) {
    let sys = world.system();
    let result = sys.settlement.batch_payout(&sys.admin(), &vendor).await;
    world.record(result);
}

#[when(expr = "the gateway reports '{word}' for the account of '{word}'")]
async fn account_webhook(world: &mut CourtWorld, event: String, vendor: String) {
    let (body, signature) = signed_webhook(&format!("evt_{event}_{vendor}"), &event, "account", &format!("acc_{vendor}"));
    let sys = world.system();
    sys.settlement.handle_webhook(&body, &signature).await.expect("Error handling webhook");
}

//-------------------------------------------   Checks   ------------------------------------------------------------

#[then(expr = "the checkout of '{word}' comes to {int} rupees")]
async fn checkout_total(world: &mut CourtWorld, customer: String, total: i64) {
    let checkout = world.checkout_of(&customer);
    assert_eq!(checkout.root.total, rupees(total));
    assert_eq!(checkout.payment.amount, rupees(total));
}

#[then(expr = "the checkout of '{word}' has {int} vendor order(s)")]
async fn vendor_order_count(world: &mut CourtWorld, customer: String, count: usize) {
    assert_eq!(world.checkout_of(&customer).vendor_orders().len(), count);
}

#[then(expr = "the '{word}' order of '{word}' comes to {int} rupees")]
async fn vendor_order_total(world: &mut CourtWorld, vendor: String, customer: String, total: i64) {
    let order = world
        .checkout_of(&customer)
        .vendor_orders()
        .into_iter()
        .find(|o| o.belongs_to_vendor(&vendor))
        .cloned()
        .expect("No order for vendor");
    assert_eq!(order.total, rupees(total));
}

#[then(expr = "every order of '{word}' is '{word}'")]
async fn every_order_is(world: &mut CourtWorld, customer: String, status: String) {
    let expected = OrderStatusType::from_str(&status).expect("Not an order status");
    let order_id = world.checkout_of(&customer).root.id;
    let sys = world.system();
    let view = sys.orders.fetch_order_with_children(&sys.customer(&customer), order_id).await.unwrap();
    assert_eq!(view.order.status, expected, "top-level order");
    for sub in &view.sub_orders {
        assert_eq!(sub.status, expected, "order {}", sub.order_number);
    }
}

#[then(expr = "the '{word}' order of '{word}' is '{word}'")]
async fn vendor_order_is(world: &mut CourtWorld, vendor: String, customer: String, status: String) {
    let expected = OrderStatusType::from_str(&status).expect("Not an order status");
    let order_id = world.vendor_order_id(&customer, &vendor);
    let sys = world.system();
    let view = sys.orders.fetch_order_with_children(&sys.admin(), order_id).await.unwrap();
    assert_eq!(view.order.status, expected);
}

#[then(expr = "the request fails with {word}")]
async fn request_fails(world: &mut CourtWorld, kind: String) {
    let err = world.last_error.as_ref().expect("The last request succeeded");
    let debug = format!("{err:?}");
    assert!(debug.starts_with(&kind), "Expected {kind}, got {debug}");
}

#[then(expr = "the request succeeds")]
async fn request_succeeds(world: &mut CourtWorld) {
    if let Some(err) = &world.last_error {
        panic!("The last request failed: {err}");
    }
}

#[then(expr = "'{word}' has {int} rupees waiting for payout")]
async fn pending_payout(world: &mut CourtWorld, vendor: String, amount: i64) {
    let sys = world.system();
    let pending = sys.db.fetch_pending_allocations(&sys.court_id, &vendor).await.unwrap();
    let total: Paise = pending.iter().map(|a| a.amount).sum();
    assert_eq!(total, rupees(amount));
}

#[then(expr = "the gateway sent {int} rupees to '{word}'")]
async fn transfer_sent(world: &mut CourtWorld, amount: i64, vendor: String) {
    let sys = world.system();
    let fund_account = format!("fa_{vendor}");
    let sent: Paise = sys.gateway.transfers().iter().filter(|t| t.fund_account_id == fund_account).map(|t| t.amount).sum();
    assert_eq!(sent, rupees(amount));
}

#[then(expr = "'{word}' is rated {float} from {int} rating(s)")]
async fn vendor_rating(world: &mut CourtWorld, vendor: String, rating: f64, count: i64) {
    let sys = world.system();
    let v = sys.db.fetch_vendor(&sys.court_id, &vendor).await.unwrap().unwrap();
    assert!((v.rating - rating).abs() < 1e-9, "{} is rated {}", vendor, v.rating);
    assert_eq!(v.total_ratings, count);
}

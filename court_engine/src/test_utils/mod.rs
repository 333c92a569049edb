//! Helpers for tests that need a real database, a scripted gateway and a notification transport.
//!
//! ```rust,ignore
//! let system = TestSystem::new("food-hall", CourtSettings::default()).await;
//! system.add_vendor("dosa-hut", &[("masala-dosa", 12_000)]).await;
//! let cart = system.carts.add_line(&system.customer("asha"), "masala-dosa", 2, None).await?;
//! ```
mod mock_gateway;
pub mod prepare_env;
mod recording_publisher;
pub mod seed;

use std::{sync::Arc, time::Duration};

pub use mock_gateway::MockGateway;
pub use recording_publisher::{Published, RecordingPublisher};

use crate::{
    db_types::{Actor, CourtSettings, GatewayAccountStatus, Paise},
    events::{EventHandlers, EventHooks, EventProducers},
    helpers::{hmac_sha256_hex, sign_payment},
    payment_objects::{PaymentConfig, PaymentVerification},
    settlement_objects::SettlementConfig,
    CartApi,
    NotificationRouter,
    OrderFlowApi,
    PaymentApi,
    SettlementApi,
    SqliteDatabase,
};

pub const TEST_SIGNING_SECRET: &str = "test_key_secret";
pub const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret";
pub const TEST_GATEWAY_TIMEOUT: Duration = Duration::from_millis(500);

/// A complete engine on a throw-away database, wired the way the server wires it.
#[derive(Debug)]
pub struct TestSystem {
    pub court_id: String,
    pub db_path: String,
    pub db: SqliteDatabase,
    pub gateway: MockGateway,
    pub publisher: RecordingPublisher,
    /// The producers the APIs publish through, for wiring further APIs onto the same hooks
    pub producers: EventProducers,
    pub carts: CartApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub payments: PaymentApi<SqliteDatabase, MockGateway>,
    pub settlement: SettlementApi<SqliteDatabase, MockGateway>,
}

impl TestSystem {
    /// Must be called from inside a tokio runtime, since the notification hooks are spawned onto it.
    pub async fn new(court_id: &str, settings: CourtSettings) -> Self {
        let db_path = prepare_env::random_db_path();
        prepare_env::prepare_test_env(&db_path).await;
        let db = SqliteDatabase::new_with_url(&db_path, 5).await.expect("Error connecting to test database");
        seed::seed_court(&db, court_id, &settings).await;

        let gateway = MockGateway::new();
        let publisher = RecordingPublisher::new();
        let router = NotificationRouter::new(Arc::new(publisher.clone()));
        let mut hooks = EventHooks::default();
        router.install(&mut hooks);
        let handlers = EventHandlers::new(64, hooks);
        let producers = handlers.producers();
        handlers.start_handlers();

        let payment_config = PaymentConfig::new(TEST_SIGNING_SECRET, TEST_GATEWAY_TIMEOUT);
        let settlement_config = SettlementConfig::new(TEST_WEBHOOK_SECRET, TEST_GATEWAY_TIMEOUT);
        Self {
            court_id: court_id.to_string(),
            db_path,
            carts: CartApi::new(db.clone()),
            orders: OrderFlowApi::new(db.clone(), producers.clone()),
            payments: PaymentApi::new(db.clone(), gateway.clone(), producers.clone(), payment_config),
            settlement: SettlementApi::new(db.clone(), gateway.clone(), producers.clone(), settlement_config),
            producers,
            db,
            gateway,
            publisher,
        }
    }

    /// Adds a vendor with its menu. Prices are in paise.
    pub async fn add_vendor(&self, vendor_id: &str, menu: &[(&str, i64)]) {
        seed::seed_vendor(&self.db, &self.court_id, vendor_id).await;
        for (item_id, price) in menu {
            seed::seed_menu_item(&self.db, &self.court_id, vendor_id, item_id, *price).await;
        }
    }

    /// Links an activated gateway account with a fund account: `acc_{vendor}` and `fa_{vendor}`.
    pub async fn link_payout_account(&self, vendor_id: &str) {
        seed::seed_vendor_account(
            &self.db,
            &self.court_id,
            vendor_id,
            &format!("acc_{vendor_id}"),
            Some(&format!("fa_{vendor_id}")),
            GatewayAccountStatus::Activated,
        )
        .await;
    }

    pub fn customer(&self, customer_id: &str) -> Actor {
        Actor::customer(customer_id, self.court_id.as_str())
    }

    pub fn vendor(&self, vendor_id: &str) -> Actor {
        Actor::vendor(vendor_id, self.court_id.as_str())
    }

    pub fn admin(&self) -> Actor {
        Actor::admin("court-admin", self.court_id.as_str())
    }

    pub async fn teardown(mut self) {
        let _ = self.db.close().await;
        prepare_env::drop_database(&self.db_path).await;
    }
}

/// The callback the gateway would send once the customer has paid intent `gateway_order_id`.
pub fn signed_verification(order_id: i64, gateway_order_id: &str, gateway_payment_id: &str) -> PaymentVerification {
    let signature =
        sign_payment(TEST_SIGNING_SECRET, gateway_order_id, gateway_payment_id).expect("Error signing payment");
    PaymentVerification {
        order_id,
        gateway_order_id: gateway_order_id.to_string(),
        gateway_payment_id: gateway_payment_id.to_string(),
        signature,
    }
}

/// A webhook body and its signature, as the gateway would deliver them.
pub fn signed_webhook(event_id: &str, event: &str, entity: &str, entity_id: &str) -> (Vec<u8>, String) {
    let body = serde_json::json!({
        "id": event_id,
        "event": event,
        "payload": { entity: { "entity": { "id": entity_id } } },
    })
    .to_string()
    .into_bytes();
    let signature = hmac_sha256_hex(TEST_WEBHOOK_SECRET.as_bytes(), &body).expect("Error signing webhook");
    (body, signature)
}

/// A signed transfer webhook that carries the transfer's reference.
pub fn signed_transfer_webhook(event_id: &str, event: &str, transfer_id: &str, reference: &str) -> (Vec<u8>, String) {
    let body = serde_json::json!({
        "id": event_id,
        "event": event,
        "payload": { "transfer": { "entity": { "id": transfer_id, "reference": reference } } },
    })
    .to_string()
    .into_bytes();
    let signature = hmac_sha256_hex(TEST_WEBHOOK_SECRET.as_bytes(), &body).expect("Error signing webhook");
    (body, signature)
}

pub fn rupees(amount: i64) -> Paise {
    Paise::from_rupees(amount)
}

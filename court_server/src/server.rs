use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use court_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    CartApi,
    CourtDatabase,
    NotificationRouter,
    OrderFlowApi,
    PaymentApi,
    PaymentGateway,
    SettlementApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    cart_worker::start_abandoned_cart_worker,
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    gateway_bridge::GatewayBridge,
    payout_worker::start_payout_reconciler,
    routes::{
        health,
        AddCartLineRoute,
        CancelOrderRoute,
        CheckoutRoute,
        GatewayWebhookRoute,
        GetCartRoute,
        ManualOrderRoute,
        MyOrdersRoute,
        OrderByIdRoute,
        OrderLookupRoute,
        OrderStatusRoute,
        OrderStreamRoute,
        PayOrderRoute,
        PayoutRoute,
        RateOrderRoute,
        RemoveCartLineRoute,
        SetCartLineRoute,
        VerifyPaymentRoute,
    },
    stream::BroadcastPublisher,
};

const CART_SWEEP_PERIOD: Duration = Duration::from_secs(60);
const PAYOUT_SWEEP_PERIOD: Duration = Duration::from_secs(300);

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway =
        GatewayBridge::new(config.gateway.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let publisher = BroadcastPublisher::new(config.notification_buffer);
    let producers = start_event_handlers(&publisher, config.notification_buffer);
    let _cart_worker = start_abandoned_cart_worker(db.clone(), config.abandoned_cart_timeout, CART_SWEEP_PERIOD);
    let reconciler = SettlementApi::new(db.clone(), gateway.clone(), producers.clone(), config.settlement_config());
    let _payout_worker = start_payout_reconciler(reconciler, config.stale_payout_timeout, PAYOUT_SWEEP_PERIOD);
    let srv = create_server_instance(config, db, gateway, publisher, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Installs the notification router on the event hooks and starts the hook tasks. Every engine API publishes through
/// the returned producers.
pub fn start_event_handlers(publisher: &BroadcastPublisher, buffer_size: usize) -> EventProducers {
    let router = NotificationRouter::new(Arc::new(publisher.clone()));
    let mut hooks = EventHooks::default();
    router.install(&mut hooks);
    let handlers = EventHandlers::new(buffer_size, hooks);
    let producers = handlers.producers();
    handlers.start_handlers();
    producers
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: GatewayBridge,
    publisher: BroadcastPublisher,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let options = ServerOptions::from_config(&config);
    let payment_config = config.payment_config();
    let settlement_config = config.settlement_config();
    let srv = HttpServer::new(move || {
        let cart_api = CartApi::new(db.clone());
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let payments_api = PaymentApi::new(db.clone(), gateway.clone(), producers.clone(), payment_config.clone());
        let settlement_api =
            SettlementApi::new(db.clone(), gateway.clone(), producers.clone(), settlement_config.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("court::access_log"))
            .app_data(json_config())
            .app_data(web::Data::new(cart_api))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(payments_api))
            .app_data(web::Data::new(settlement_api))
            .app_data(web::Data::new(publisher.clone()))
            .app_data(web::Data::new(options))
            .configure(configure_routes::<SqliteDatabase, GatewayBridge>)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    info!("💻️ Food court server listening on {}:{}", config.host, config.port);
    Ok(srv)
}

/// Registers every route. The engine APIs, the publisher and the [`ServerOptions`] must already be in the app data.
pub fn configure_routes<B, G>(cfg: &mut web::ServiceConfig)
where
    B: CourtDatabase + 'static,
    G: PaymentGateway + 'static,
{
    let api_scope = web::scope("/api")
        .service(GetCartRoute::<B>::new())
        .service(AddCartLineRoute::<B>::new())
        .service(SetCartLineRoute::<B>::new())
        .service(RemoveCartLineRoute::<B>::new())
        .service(CheckoutRoute::<B, G>::new())
        .service(ManualOrderRoute::<B>::new())
        .service(OrderLookupRoute::<B>::new())
        .service(MyOrdersRoute::<B>::new())
        .service(OrderByIdRoute::<B>::new())
        .service(OrderStatusRoute::<B>::new())
        .service(CancelOrderRoute::<B>::new())
        .service(RateOrderRoute::<B>::new())
        .service(PayOrderRoute::<B, G>::new())
        .service(VerifyPaymentRoute::<B, G>::new())
        .service(PayoutRoute::<B, G>::new())
        .service(OrderStreamRoute::<B>::new());
    let gateway_scope = web::scope("/gateway").service(GatewayWebhookRoute::<B, G>::new());
    cfg.service(health).service(api_scope).service(gateway_scope);
}

/// Malformed JSON bodies get the same `{"error": ...}` body as every other failure.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into())
}

//! Request handler definitions
//!
//! Define each route and its handler here. The engine APIs are generic over the database and the payment gateway, and
//! so are the handlers; the concrete types are chosen once, in [`crate::server`].
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every engine call is async, so keep it that way: no blocking I/O
//! and no `std::thread::sleep` in here.
use actix_web::{get, http::header, web, HttpRequest, HttpResponse, Responder};
use bytes::Bytes;
use court_engine::{
    db_types::Role,
    notifications::order_room,
    order_objects::ManualOrderRequest,
    payment_objects::PaymentVerification,
    settlement_objects::WebhookOutcome,
    CartApi,
    CourtDatabase,
    CourtError,
    OrderFlowApi,
    PaymentApi,
    PaymentGateway,
    SettlementApi,
};
use log::*;

use crate::{
    config::ServerOptions,
    data_objects::{
        AckLookupParams,
        AddLineParams,
        CancelParams,
        CheckoutResult,
        OrderListQuery,
        RatingParams,
        RatingResult,
        SetQuantityParams,
        StreamQuery,
        StatusUpdateParams,
    },
    errors::ServerError,
    identity::Identity,
    stream::{channels_for, notification_stream, BroadcastPublisher},
};

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro.
// `impl A, B` adds one type parameter per bound, in order, and the handler must declare its generics in the same order.
// `requires [..]` lists the roles admitted to the route.
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal requires [$($roles:expr),+]) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
            impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name)
                        .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ident),+ where requires [$($roles:expr),+]) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds >],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds >] >,)+ );}
        paste::paste! { impl< $( [< T $bounds >],)+ > [<$name:camel Route>]< $( [< T $bounds >],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds >] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds>],)+>
        where
            $([<T $bounds>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds >], )+>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ident),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds >],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds >] >,)+ );}
        paste::paste! { impl< $( [< T $bounds >],)+ > [<$name:camel Route>]< $( [< T $bounds >],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds >] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds>],)+>
        where
            $([<T $bounds>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Cart  ----------------------------------------------------
route!(get_cart => Get "/cart" impl CourtDatabase where requires [Role::Customer]);
/// The caller's active cart, or `null` if they don't have one.
pub async fn get_cart<B: CourtDatabase>(
    identity: Identity,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET cart for {}", identity.label());
    let cart = api.get_cart(&identity).await?;
    Ok(HttpResponse::Ok().json(cart))
}

route!(add_cart_line => Post "/cart/lines" impl CourtDatabase where requires [Role::Customer]);
pub async fn add_cart_line<B: CourtDatabase>(
    identity: Identity,
    body: web::Json<AddLineParams>,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let AddLineParams { menu_item_id, quantity, customizations } = body.into_inner();
    debug!("💻️ POST cart line {quantity} x {menu_item_id} for {}", identity.label());
    let cart = api.add_line(&identity, &menu_item_id, quantity, customizations).await?;
    Ok(HttpResponse::Ok().json(cart))
}

route!(set_cart_line => Put "/cart/lines/{menu_item_id}" impl CourtDatabase where requires [Role::Customer]);
pub async fn set_cart_line<B: CourtDatabase>(
    identity: Identity,
    path: web::Path<String>,
    body: web::Json<SetQuantityParams>,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let menu_item_id = path.into_inner();
    debug!("💻️ PUT cart line {menu_item_id} = {} for {}", body.quantity, identity.label());
    let cart = api.set_line_quantity(&identity, &menu_item_id, body.quantity).await?;
    Ok(HttpResponse::Ok().json(cart))
}

route!(remove_cart_line => Delete "/cart/lines/{menu_item_id}" impl CourtDatabase where requires [Role::Customer]);
pub async fn remove_cart_line<B: CourtDatabase>(
    identity: Identity,
    path: web::Path<String>,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let menu_item_id = path.into_inner();
    debug!("💻️ DELETE cart line {menu_item_id} for {}", identity.label());
    let cart = api.remove_line(&identity, &menu_item_id).await?;
    Ok(HttpResponse::Ok().json(cart))
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl CourtDatabase, PaymentGateway where requires [Role::Customer]);
/// Checks the caller's cart out, splits it into vendor orders and asks the gateway for a payment intent.
///
/// If the vendor orders cannot be written, the cart is handed back to the customer as their active cart.
///
/// Once the orders are written the checkout is done, even if the gateway is down: the response then carries the
/// orders without an intent, and the customer pays later through `POST /api/orders/{id}/pay`.
pub async fn checkout<B: CourtDatabase, G: PaymentGateway>(
    identity: Identity,
    carts: web::Data<CartApi<B>>,
    orders: web::Data<OrderFlowApi<B>>,
    payments: web::Data<PaymentApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST checkout for {}", identity.label());
    let snapshot = carts.checkout(&identity).await?;
    let inserted = match orders.split_and_create(&snapshot).await {
        Ok(inserted) => inserted,
        Err(e) => {
            warn!("💻️ Orders for cart #{} could not be created. Handing the cart back. {e}", snapshot.cart_id);
            if let Err(reopen_err) = carts.reopen_after_failed_checkout(&snapshot).await {
                error!("💻️ Cart #{} is stuck checked out. {reopen_err}", snapshot.cart_id);
            }
            return Err(e.into());
        },
    };
    let (intent, intent_error) = match payments.create_intent(&identity, inserted.root.id).await {
        Ok(intent) => (Some(intent), None),
        Err(e) => {
            warn!("💻️ Order #{} was created but has no payment intent yet. {e}", inserted.root.id);
            (None, Some(e.to_string()))
        },
    };
    Ok(HttpResponse::Created().json(CheckoutResult { orders: inserted, intent, intent_error }))
}

route!(pay_order => Post "/orders/{id}/pay" impl CourtDatabase, PaymentGateway where requires [Role::Customer, Role::Admin]);
pub async fn pay_order<B: CourtDatabase, G: PaymentGateway>(
    identity: Identity,
    path: web::Path<i64>,
    api: web::Data<PaymentApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST pay order #{order_id} for {}", identity.label());
    let intent = api.create_intent(&identity, order_id).await?;
    Ok(HttpResponse::Ok().json(intent))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(manual_order => Post "/orders/manual" impl CourtDatabase where requires [Role::Vendor, Role::Admin]);
/// A vendor rings up an order at the counter. The result carries the acknowledgment token for the customer's slip.
pub async fn manual_order<B: CourtDatabase>(
    identity: Identity,
    body: web::Json<ManualOrderRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST manual order for {} by {}", body.vendor_id, identity.label());
    let result = api.create_manual_order(&identity, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(result))
}

route!(order_lookup => Post "/orders/lookup" impl CourtDatabase where requires [Role::Vendor, Role::Admin]);
pub async fn order_lookup<B: CourtDatabase>(
    identity: Identity,
    body: web::Json<AckLookupParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST order lookup by {}", identity.label());
    let order = api.lookup_by_ack_token(&identity, &body.token).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(order_by_id => Get "/orders/{id}" impl CourtDatabase where requires [Role::Customer, Role::Vendor, Role::Admin]);
/// The order with its sub-orders, its payment and, for split checkouts, the aggregate status.
pub async fn order_by_id<B: CourtDatabase>(
    identity: Identity,
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order #{order_id} for {}", identity.label());
    let order = api.fetch_order_with_children(&identity, order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(my_orders => Get "/orders" impl CourtDatabase where requires [Role::Customer, Role::Vendor, Role::Admin]);
/// Customers get their checkouts and manual orders. Vendors get the orders they have to fulfil, and admins get the
/// orders of the vendor named in `vendor_id`. Vendor lists can be narrowed with `status=pending,confirmed`.
pub async fn my_orders<B: CourtDatabase>(
    identity: Identity,
    query: web::Query<OrderListQuery>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET orders for {}", identity.label());
    let orders = match identity.role {
        Role::Customer => api.orders_for_customer(&identity).await?,
        _ => {
            let vendor_id = match (&query.vendor_id, identity.role) {
                (Some(id), _) => id.clone(),
                (None, Role::Vendor) => identity.user_id.clone(),
                (None, _) => return Err(CourtError::validation("Name the vendor whose orders you want").into()),
            };
            let statuses = query.statuses()?;
            api.orders_for_vendor(&identity, &vendor_id, &statuses).await?
        },
    };
    Ok(HttpResponse::Ok().json(orders))
}

route!(order_status => Post "/orders/{id}/status" impl CourtDatabase where requires [Role::Customer, Role::Vendor, Role::Admin]);
pub async fn order_status<B: CourtDatabase>(
    identity: Identity,
    path: web::Path<i64>,
    body: web::Json<StatusUpdateParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let StatusUpdateParams { status, note } = body.into_inner();
    debug!("💻️ POST order #{order_id} to {status} by {}", identity.label());
    let order = api.transition(&identity, order_id, status, note).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(cancel_order => Post "/orders/{id}/cancel" impl CourtDatabase where requires [Role::Customer, Role::Admin]);
/// The body is optional. `{"reason": "..."}` is kept in the order's history.
pub async fn cancel_order<B: CourtDatabase>(
    identity: Identity,
    path: web::Path<i64>,
    body: Option<web::Json<CancelParams>>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let reason = body.and_then(|b| b.into_inner().reason);
    debug!("💻️ POST cancel order #{order_id} by {}", identity.label());
    let order = api.cancel(&identity, order_id, reason).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(rate_order => Post "/orders/{id}/rating" impl CourtDatabase where requires [Role::Customer]);
pub async fn rate_order<B: CourtDatabase>(
    identity: Identity,
    path: web::Path<i64>,
    body: web::Json<RatingParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST rating {} for order #{order_id} by {}", body.rating, identity.label());
    let (order, vendor) = api.rate_order(&identity, order_id, body.rating).await?;
    Ok(HttpResponse::Ok().json(RatingResult { order, vendor }))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(verify_payment => Post "/payments/verify" impl CourtDatabase, PaymentGateway where requires [Role::Customer, Role::Admin]);
/// The client relays the gateway's signed payment callback here. A replayed callback returns the order unchanged.
pub async fn verify_payment<B: CourtDatabase, G: PaymentGateway>(
    identity: Identity,
    body: web::Json<PaymentVerification>,
    api: web::Data<PaymentApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let verification = body.into_inner();
    debug!("💻️ POST payment verification for order #{} by {}", verification.order_id, identity.label());
    let order = api.verify_and_complete(&identity, verification).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(payout => Post "/payouts/{vendor_id}" impl CourtDatabase, PaymentGateway where requires [Role::Admin]);
pub async fn payout<B: CourtDatabase, G: PaymentGateway>(
    identity: Identity,
    path: web::Path<String>,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let vendor_id = path.into_inner();
    debug!("💻️ POST payout for {vendor_id} by {}", identity.label());
    let batch = api.batch_payout(&identity, &vendor_id).await?;
    Ok(HttpResponse::Ok().json(batch))
}

//----------------------------------------------   Gateway  ----------------------------------------------------
route!(gateway_webhook => Post "/webhook" impl CourtDatabase, PaymentGateway);
/// Gateway webhook deliveries. The signature in the `x-gateway-signature` header is checked against the raw body,
/// so the body is read as bytes rather than as JSON.
///
/// Deferred transfer events are answered with `503 Service Unavailable` so that the gateway delivers them again.
pub async fn gateway_webhook<B: CourtDatabase, G: PaymentGateway>(
    req: HttpRequest,
    body: Bytes,
    api: web::Data<SettlementApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received gateway webhook ({} bytes)", body.len());
    let signature = req.headers().get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()).unwrap_or_default();
    if signature.is_empty() {
        warn!("💻️ Gateway webhook arrived without a signature");
        return Err(CourtError::InvalidSignature.into());
    }
    let outcome = api.handle_webhook(&body, signature).await?;
    debug!("💻️ Gateway webhook handled: {outcome:?}");
    match outcome {
        WebhookOutcome::Deferred { .. } => Ok(HttpResponse::ServiceUnavailable().json(outcome)),
        _ => Ok(HttpResponse::Ok().json(outcome)),
    }
}

//----------------------------------------------   Stream  ----------------------------------------------------
route!(order_stream => Get "/stream" impl CourtDatabase where requires [Role::Customer, Role::Vendor]);
/// Server-sent events for the caller's channel. The connection is closed after the configured session lifetime and
/// the client is expected to reconnect.
///
/// With `?order_id=`, the caller also hears the room of that order's checkout, provided they may see the order.
pub async fn order_stream<B: CourtDatabase>(
    identity: Identity,
    query: web::Query<StreamQuery>,
    orders: web::Data<OrderFlowApi<B>>,
    publisher: web::Data<BroadcastPublisher>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let mut channels = channels_for(&identity);
    if let Some(order_id) = query.into_inner().order_id {
        let view = orders.fetch_order_with_children(&identity, order_id).await?;
        channels.push(order_room(view.order.root_id()));
    }
    debug!("💻️ GET stream for {} on {channels:?}", identity.label());
    let stream = notification_stream(publisher.subscribe(), channels, options.stream_session_lifetime);
    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream))
}

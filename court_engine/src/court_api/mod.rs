//! # Food court engine public API
//!
//! The `court_api` module exposes the programmatic API of the engine. Each API covers one part of the order life
//! cycle and only asks its backend for the storage traits it needs:
//!
//! * [`cart_api`] keeps each customer's active cart and freezes it at checkout.
//! * [`order_flow_api`] splits checkouts into vendor orders, takes manual orders, and runs the order state machine.
//! * [`payment_api`] mints gateway payment intents and completes payments from the gateway's signed callbacks.
//! * [`settlement_api`] batches vendor payouts and applies the gateway's account and transfer webhooks.
//!
//! The state machine rules themselves live in [`transitions`] and are pure functions.
//!
//! # API usage
//!
//! ```rust,ignore
//! use court_engine::{events::EventProducers, CartApi, OrderFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(url, 25).await?;
//! let carts = CartApi::new(db.clone());
//! let orders = OrderFlowApi::new(db, EventProducers::default());
//! let snapshot = carts.checkout(&customer).await?;
//! let placed = orders.split_and_create(&snapshot).await?;
//! ```
pub mod cart_api;
pub mod cart_objects;
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
pub mod payment_api;
pub mod payment_objects;
pub mod settlement_api;
pub mod settlement_objects;
pub mod transitions;

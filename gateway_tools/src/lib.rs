//! A thin client for the payment gateway's REST API.
//!
//! Only the two calls the food court needs are covered: creating an order (the gateway's payment intent) that the
//! customer then pays through the gateway's checkout, and creating a transfer that moves a vendor's share to their
//! fund account. Webhook and callback signatures are verified by the engine, not here.
mod api;
mod config;
mod data_objects;
mod error;
mod helpers;

pub use api::GatewayApi;
pub use config::GatewayConfig;
pub use data_objects::{GatewayOrder, GatewayTransfer, NewGatewayOrder, NewTransfer};
pub use error::GatewayApiError;

//! # Food court server
//! This crate hosts the HTTP server for the food court engine. It is responsible for:
//! * Reading the caller's identity from the headers set by the upstream proxy, and checking it against each route's
//!   admitted roles.
//! * Exposing the engine's cart, order, payment and settlement operations as JSON routes.
//! * Receiving the payment gateway's webhooks.
//! * Streaming order updates to customers and vendors as server-sent events.
//! * Abandoning carts that have sat idle for too long.
//! * Releasing payout batches whose transfer was never committed.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/api/...`: The ordering API. See [routes](routes/index.html).
//! * `/gateway/webhook`: Signed webhook deliveries from the payment gateway.

pub mod cart_worker;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod gateway_bridge;
pub mod identity;
pub mod middleware;
pub mod payout_worker;
pub mod routes;
pub mod server;
pub mod stream;

#[cfg(test)]
mod endpoint_tests;

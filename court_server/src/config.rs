use std::{env, fmt::Display, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use court_common::Secret;
use court_engine::{payment_objects::PaymentConfig, settlement_objects::SettlementConfig};
use gateway_tools::GatewayConfig;
use log::*;

const DEFAULT_FCO_HOST: &str = "127.0.0.1";
const DEFAULT_FCO_PORT: u16 = 8370;
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_STREAM_SESSION_SECS: u64 = 60 * 60;
const DEFAULT_ABANDONED_CART_MINUTES: i64 = 120;
const DEFAULT_STALE_PAYOUT_MINUTES: i64 = 30;
const DEFAULT_NOTIFICATION_BUFFER: usize = 256;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    /// The gateway signs its payment callbacks with this secret. Defaults to the gateway key secret.
    pub payment_signing_secret: Secret<String>,
    /// The gateway signs its webhook deliveries with this secret.
    pub webhook_secret: Secret<String>,
    pub gateway: GatewayConfig,
    /// How long a client may stay connected to the order-update stream before it has to reconnect.
    pub stream_session_lifetime: StdDuration,
    /// Active carts left untouched for longer than this are marked abandoned.
    pub abandoned_cart_timeout: Duration,
    /// Payout batches still `initiated` after this long are released back to the pending pool.
    pub stale_payout_timeout: Duration,
    /// Capacity of each event hook queue and of the notification broadcast channel.
    pub notification_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_FCO_HOST.to_string(),
            port: DEFAULT_FCO_PORT,
            database_url: String::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            payment_signing_secret: Secret::default(),
            webhook_secret: Secret::default(),
            gateway: GatewayConfig::default(),
            stream_session_lifetime: StdDuration::from_secs(DEFAULT_STREAM_SESSION_SECS),
            abandoned_cart_timeout: Duration::minutes(DEFAULT_ABANDONED_CART_MINUTES),
            stale_payout_timeout: Duration::minutes(DEFAULT_STALE_PAYOUT_MINUTES),
            notification_buffer: DEFAULT_NOTIFICATION_BUFFER,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("FCO_HOST").ok().unwrap_or_else(|| DEFAULT_FCO_HOST.into());
        let port = env_or_default("FCO_PORT", DEFAULT_FCO_PORT);
        let database_url = env::var("FCO_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ FCO_DATABASE_URL is not set. Please set it to the URL for the food court database.");
            String::default()
        });
        let max_connections = env_or_default("FCO_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let gateway = GatewayConfig::new_from_env_or_default();
        let payment_signing_secret = match env::var("FCO_PAYMENT_SIGNING_SECRET") {
            Ok(s) => Secret::new(s),
            Err(_) => {
                info!("🪛️ FCO_PAYMENT_SIGNING_SECRET is not set. Payment callbacks are checked with the gateway key.");
                gateway.key_secret.clone()
            },
        };
        let webhook_secret = Secret::new(env::var("FCO_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ FCO_WEBHOOK_SECRET is not set. Every gateway webhook will be rejected until it is configured."
            );
            String::default()
        }));
        let stream_session_lifetime =
            StdDuration::from_secs(env_or_default("FCO_STREAM_SESSION_SECS", DEFAULT_STREAM_SESSION_SECS));
        let abandoned_cart_timeout =
            Duration::minutes(env_or_default("FCO_ABANDONED_CART_MINUTES", DEFAULT_ABANDONED_CART_MINUTES));
        let stale_payout_timeout =
            Duration::minutes(env_or_default("FCO_STALE_PAYOUT_MINUTES", DEFAULT_STALE_PAYOUT_MINUTES));
        let notification_buffer = env_or_default("FCO_NOTIFICATION_BUFFER", DEFAULT_NOTIFICATION_BUFFER);
        Self {
            host,
            port,
            database_url,
            max_connections,
            payment_signing_secret,
            webhook_secret,
            gateway,
            stream_session_lifetime,
            abandoned_cart_timeout,
            stale_payout_timeout,
            notification_buffer,
        }
    }

    pub fn payment_config(&self) -> PaymentConfig {
        PaymentConfig::new(self.payment_signing_secret.reveal().as_str(), self.gateway.timeout)
    }

    pub fn settlement_config(&self) -> SettlementConfig {
        SettlementConfig::new(self.webhook_secret.reveal().as_str(), self.gateway.timeout)
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// The part of the configuration that handlers need. Secrets stay out of it.
#[derive(Clone, Copy, Debug)]
pub struct ServerOptions {
    pub stream_session_lifetime: StdDuration,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { stream_session_lifetime: config.stream_session_lifetime }
    }
}

/// Reads and parses `name`. Unset or unparseable values fall back to `default`; the latter are logged as errors.
fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default, {default}.");
            default
        },
    }
}

use std::time::Duration;

use court_common::Secret;
use log::*;

pub const DEFAULT_GATEWAY_URL: &str = "https://api.razorpay.com";
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: Secret<String>,
    /// Upper bound on every request, including connecting
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_URL.to_string(),
            key_id: String::default(),
            key_secret: Secret::default(),
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }
}

impl GatewayConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("FCO_GATEWAY_URL").unwrap_or_else(|_| {
            info!("🪛️ FCO_GATEWAY_URL not set, using {DEFAULT_GATEWAY_URL}");
            DEFAULT_GATEWAY_URL.to_string()
        });
        let key_id = std::env::var("FCO_GATEWAY_KEY_ID").unwrap_or_else(|_| {
            warn!("🪛️ FCO_GATEWAY_KEY_ID not set, using (probably useless) default");
            "rzp_test_00000000000000".to_string()
        });
        let key_secret = Secret::new(std::env::var("FCO_GATEWAY_KEY_SECRET").unwrap_or_else(|_| {
            warn!("🪛️ FCO_GATEWAY_KEY_SECRET not set, using (probably useless) default");
            "00000000000000".to_string()
        }));
        let timeout = std::env::var("FCO_GATEWAY_TIMEOUT_MS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| error!("🪛️ Invalid FCO_GATEWAY_TIMEOUT_MS value '{s}': {e}. Using the default."))
                    .ok()
            })
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT);
        Self { base_url: base_url.trim_end_matches('/').to_string(), key_id, key_secret, timeout }
    }
}

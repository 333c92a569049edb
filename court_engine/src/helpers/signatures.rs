//! HMAC-SHA256 signatures for gateway callbacks.
//!
//! The gateway signs two things:
//! * the payment completion callback, over `{gateway_order_id}|{gateway_payment_id}`, with the API key secret;
//! * every webhook delivery, over the raw request body, with the webhook secret.
//!
//! Both are lowercase hex. Verification always goes through [`Mac::verify_slice`], which compares in constant time.
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::court_api::errors::CourtError;

type HmacSha256 = Hmac<Sha256>;

pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> Result<String, CourtError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|e| CourtError::validation(format!("Bad HMAC key. {e}")))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a hex-encoded HMAC-SHA256 signature over `message`. Malformed hex is treated as a mismatch.
pub fn verify_hmac_sha256_hex(secret: &[u8], message: &[u8], signature: &str) -> bool {
    let Ok(sig_bytes) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&sig_bytes).is_ok()
}

pub fn payment_signature_message(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    format!("{gateway_order_id}|{gateway_payment_id}")
}

/// Produces the signature the gateway attaches to a payment completion callback.
pub fn sign_payment(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> Result<String, CourtError> {
    let message = payment_signature_message(gateway_order_id, gateway_payment_id);
    hmac_sha256_hex(secret.as_bytes(), message.as_bytes())
}

pub fn verify_payment_signature(secret: &str, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
    let message = payment_signature_message(gateway_order_id, gateway_payment_id);
    verify_hmac_sha256_hex(secret.as_bytes(), message.as_bytes(), signature)
}

pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    verify_hmac_sha256_hex(secret.as_bytes(), body, signature)
}

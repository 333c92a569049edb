use serde::{Deserialize, Serialize};

use crate::{
    court_api::errors::CourtError,
    db_types::{Order, Paise, PaymentMethod},
};

/// The payload printed as a scannable code on a manual order's acknowledgment slip.
///
/// The token is plain URL-safe base64 over JSON and carries no cryptographic guarantee. Lookups therefore check every
/// field against the stored order before trusting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckToken {
    pub order_id: i64,
    pub order_number: String,
    pub vendor_id: String,
    pub amount: Paise,
    pub payment_method: PaymentMethod,
}

impl AckToken {
    pub fn for_order(order: &Order) -> Result<Self, CourtError> {
        let vendor_id = order
            .vendor_id
            .clone()
            .ok_or_else(|| CourtError::validation("Acknowledgment tokens are only issued for vendor orders"))?;
        Ok(Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            vendor_id,
            amount: order.total,
            payment_method: order.payment_method,
        })
    }

    pub fn encode(&self) -> Result<String, CourtError> {
        let json = serde_json::to_vec(self).map_err(|e| CourtError::validation(e.to_string()))?;
        Ok(base64::encode_config(json, base64::URL_SAFE_NO_PAD))
    }

    pub fn decode(token: &str) -> Result<Self, CourtError> {
        let bytes = base64::decode_config(token.trim(), base64::URL_SAFE_NO_PAD)
            .map_err(|e| CourtError::validation(format!("Malformed acknowledgment token. {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| CourtError::validation(format!("Malformed acknowledgment token. {e}")))
    }

    /// True if the token describes `order` exactly
    pub fn matches(&self, order: &Order) -> bool {
        self.order_id == order.id &&
            self.order_number == order.order_number &&
            order.belongs_to_vendor(&self.vendor_id) &&
            self.amount == order.total &&
            self.payment_method == order.payment_method
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tokens_decode_to_what_was_encoded() {
        let token = AckToken {
            order_id: 12,
            order_number: "ORD-20260301120000-ABCDEF".into(),
            vendor_id: "v1".into(),
            amount: Paise::from(45_000),
            payment_method: PaymentMethod::CashOnDelivery,
        };
        let encoded = token.encode().unwrap();
        assert!(!encoded.contains('=') && !encoded.contains('+') && !encoded.contains('/'));
        assert_eq!(AckToken::decode(&encoded).unwrap(), token);
    }

    #[test]
    fn garbage_is_a_validation_error() {
        assert!(matches!(AckToken::decode("not a token!"), Err(CourtError::ValidationError(_))));
        let not_json = base64::encode_config(b"hello", base64::URL_SAFE_NO_PAD);
        assert!(matches!(AckToken::decode(&not_json), Err(CourtError::ValidationError(_))));
    }
}

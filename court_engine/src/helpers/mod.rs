mod ack_token;
mod order_number;
mod signatures;

pub use ack_token::AckToken;
pub use order_number::{new_order_number, ORDER_NUMBER_PREFIX};
pub use signatures::{
    hmac_sha256_hex,
    payment_signature_message,
    sign_payment,
    verify_hmac_sha256_hex,
    verify_payment_signature,
    verify_webhook_signature,
};

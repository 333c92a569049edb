use chrono::{DateTime, Utc};
use rand::Rng;

pub const ORDER_NUMBER_PREFIX: &str = "ORD";
const SUFFIX_LEN: usize = 6;
// No 0/O or 1/I, so numbers survive being read aloud at the counter
const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A human-shareable order number, e.g. `ORD-20260301120000-K7QX2M`.
///
/// Uniqueness is finally enforced by the database. Callers retry with a fresh number on a clash.
pub fn new_order_number(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String =
        (0..SUFFIX_LEN).map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char).collect();
    format!("{ORDER_NUMBER_PREFIX}-{}-{suffix}", now.format("%Y%m%d%H%M%S"))
}

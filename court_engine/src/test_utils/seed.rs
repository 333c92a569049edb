//! Inserts the catalogue data that is normally administered outside the engine.
use chrono::Utc;

use crate::{
    db_types::{CourtSettings, CourtStatus, GatewayAccountStatus},
    SqliteDatabase,
};

pub async fn seed_court(db: &SqliteDatabase, court_id: &str, settings: &CourtSettings) {
    let now = Utc::now();
    sqlx::query(
        r#"
            INSERT INTO courts (id, name, status, platform_fee_bps, min_order_amount, max_order_amount,
                cancellation_window_minutes, auto_accept, created_at, updated_at)
            VALUES ($1, $2, 'active', $3, $4, $5, $6, $7, $8, $8);
        "#,
    )
    .bind(court_id)
    .bind(format!("{court_id} food court"))
    .bind(settings.platform_fee_bps)
    .bind(settings.min_order_amount)
    .bind(settings.max_order_amount)
    .bind(settings.cancellation_window_minutes)
    .bind(settings.auto_accept)
    .bind(now)
    .execute(db.pool())
    .await
    .expect("Error seeding court");
}

pub async fn set_court_status(db: &SqliteDatabase, court_id: &str, status: CourtStatus) {
    sqlx::query("UPDATE courts SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(court_id)
        .execute(db.pool())
        .await
        .expect("Error updating court status");
}

pub async fn seed_vendor(db: &SqliteDatabase, court_id: &str, vendor_id: &str) {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO vendors (id, court_id, name, created_at, updated_at) VALUES ($1, $2, $3, $4, $4)",
    )
    .bind(vendor_id)
    .bind(court_id)
    .bind(vendor_id.replace('-', " "))
    .bind(now)
    .execute(db.pool())
    .await
    .expect("Error seeding vendor");
}

pub async fn set_vendor_rating(db: &SqliteDatabase, vendor_id: &str, rating: f64, total_ratings: i64) {
    sqlx::query("UPDATE vendors SET rating = $1, total_ratings = $2 WHERE id = $3")
        .bind(rating)
        .bind(total_ratings)
        .bind(vendor_id)
        .execute(db.pool())
        .await
        .expect("Error updating vendor rating");
}

/// Adds a menu item priced in paise
pub async fn seed_menu_item(db: &SqliteDatabase, court_id: &str, vendor_id: &str, item_id: &str, price: i64) {
    sqlx::query(
        "INSERT INTO menu_items (id, court_id, vendor_id, name, price) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(item_id)
    .bind(court_id)
    .bind(vendor_id)
    .bind(item_id.replace('-', " "))
    .bind(price)
    .execute(db.pool())
    .await
    .expect("Error seeding menu item");
}

pub async fn set_menu_item_price(db: &SqliteDatabase, item_id: &str, price: i64) {
    sqlx::query("UPDATE menu_items SET price = $1 WHERE id = $2")
        .bind(price)
        .bind(item_id)
        .execute(db.pool())
        .await
        .expect("Error updating menu item price");
}

pub async fn set_menu_item_stock(db: &SqliteDatabase, item_id: &str, in_stock: bool) {
    sqlx::query("UPDATE menu_items SET in_stock = $1 WHERE id = $2")
        .bind(in_stock)
        .bind(item_id)
        .execute(db.pool())
        .await
        .expect("Error updating menu item stock");
}

pub async fn seed_vendor_account(
    db: &SqliteDatabase,
    court_id: &str,
    vendor_id: &str,
    gateway_account_id: &str,
    fund_account_id: Option<&str>,
    status: GatewayAccountStatus,
) {
    sqlx::query(
        r#"
            INSERT INTO vendor_accounts (vendor_id, court_id, gateway_account_id, fund_account_id, activation_status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6);
        "#,
    )
    .bind(vendor_id)
    .bind(court_id)
    .bind(gateway_account_id)
    .bind(fund_account_id)
    .bind(status)
    .bind(Utc::now())
    .execute(db.pool())
    .await
    .expect("Error seeding vendor account");
}

/// Backdates an order, e.g. to push it past the cancellation window.
pub async fn backdate_order(db: &SqliteDatabase, order_id: i64, minutes: i64) {
    let created_at = Utc::now() - chrono::Duration::minutes(minutes);
    sqlx::query("UPDATE orders SET created_at = $1 WHERE id = $2")
        .bind(created_at)
        .bind(order_id)
        .execute(db.pool())
        .await
        .expect("Error backdating order");
}

/// Backdates a payout batch, e.g. to make an `initiated` batch look stranded.
pub async fn backdate_payout_batch(db: &SqliteDatabase, batch_id: i64, minutes: i64) {
    let created_at = Utc::now() - chrono::Duration::minutes(minutes);
    sqlx::query("UPDATE payout_batches SET created_at = $1 WHERE id = $2")
        .bind(created_at)
        .bind(batch_id)
        .execute(db.pool())
        .await
        .expect("Error backdating payout batch");
}

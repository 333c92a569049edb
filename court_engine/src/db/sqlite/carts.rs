use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    court_api::errors::CourtError,
    db_types::{line_subtotal, Cart, CartLine, NewCartLine, Paise},
};

/// Fetches the active cart for the customer, along with its lines
pub async fn fetch_active_cart(
    court_id: &str,
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Cart>, CourtError> {
    let cart = sqlx::query_as::<_, Cart>(
        "SELECT * FROM carts WHERE court_id = $1 AND customer_id = $2 AND status = 'active' LIMIT 1",
    )
    .bind(court_id)
    .bind(customer_id)
    .fetch_optional(&mut *conn)
    .await?;
    match cart {
        Some(mut cart) => {
            cart.lines = fetch_cart_lines(cart.id, conn).await?;
            Ok(Some(cart))
        },
        None => Ok(None),
    }
}

pub async fn fetch_cart_lines(cart_id: i64, conn: &mut SqliteConnection) -> Result<Vec<CartLine>, CourtError> {
    let lines = sqlx::query_as::<_, CartLine>("SELECT * FROM cart_lines WHERE cart_id = $1 ORDER BY id ASC")
        .bind(cart_id)
        .fetch_all(conn)
        .await?;
    Ok(lines)
}

pub async fn active_cart_id(
    court_id: &str,
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, CourtError> {
    let id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM carts WHERE court_id = $1 AND customer_id = $2 AND status = 'active'")
            .bind(court_id)
            .bind(customer_id)
            .fetch_optional(conn)
            .await?;
    Ok(id)
}

/// Returns the id of the customer's active cart, creating an empty one if necessary.
///
/// The partial unique index on active carts turns a concurrent double-create into a no-op, so this is safe to call from
/// racing requests.
pub async fn fetch_or_create_active_cart_id(
    court_id: &str,
    customer_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, CourtError> {
    let inserted = sqlx::query(
        r#"
            INSERT INTO carts (court_id, customer_id, status, total, created_at, updated_at)
            VALUES ($1, $2, 'active', 0, $3, $3)
            ON CONFLICT DO NOTHING;
        "#,
    )
    .bind(court_id)
    .bind(customer_id)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    if inserted > 0 {
        trace!("🗃️ New cart created for {customer_id} in {court_id}");
    }
    active_cart_id(court_id, customer_id, conn).await?.ok_or(CourtError::CartNotFound)
}

pub async fn upsert_line(cart_id: i64, line: NewCartLine, conn: &mut SqliteConnection) -> Result<(), CourtError> {
    let subtotal = line_subtotal(line.unit_price, line.quantity)?;
    sqlx::query(
        r#"
            INSERT INTO cart_lines (cart_id, menu_item_id, vendor_id, name, unit_price, quantity, subtotal, customizations)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (cart_id, menu_item_id) DO UPDATE SET
                vendor_id = excluded.vendor_id,
                name = excluded.name,
                unit_price = excluded.unit_price,
                quantity = excluded.quantity,
                subtotal = excluded.subtotal,
                customizations = excluded.customizations;
        "#,
    )
    .bind(cart_id)
    .bind(line.menu_item_id)
    .bind(line.vendor_id)
    .bind(line.name)
    .bind(line.unit_price)
    .bind(line.quantity)
    .bind(subtotal)
    .bind(line.customizations)
    .execute(conn)
    .await?;
    Ok(())
}

/// Updates the quantity of a line, keeping the unit price that was snapshotted when it was added. Returns the number
/// of lines changed.
pub async fn set_line_quantity(
    cart_id: i64,
    menu_item_id: &str,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<u64, CourtError> {
    let unit_price: Option<Paise> =
        sqlx::query_scalar("SELECT unit_price FROM cart_lines WHERE cart_id = $1 AND menu_item_id = $2")
            .bind(cart_id)
            .bind(menu_item_id)
            .fetch_optional(&mut *conn)
            .await?;
    let Some(unit_price) = unit_price else {
        return Ok(0);
    };
    let subtotal = line_subtotal(unit_price, quantity)?;
    let changed =
        sqlx::query("UPDATE cart_lines SET quantity = $1, subtotal = $2 WHERE cart_id = $3 AND menu_item_id = $4")
            .bind(quantity)
            .bind(subtotal)
            .bind(cart_id)
            .bind(menu_item_id)
            .execute(conn)
            .await?
            .rows_affected();
    Ok(changed)
}

pub async fn delete_line(cart_id: i64, menu_item_id: &str, conn: &mut SqliteConnection) -> Result<u64, CourtError> {
    let deleted = sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1 AND menu_item_id = $2")
        .bind(cart_id)
        .bind(menu_item_id)
        .execute(conn)
        .await?
        .rows_affected();
    Ok(deleted)
}

/// Recomputes the cart total from its lines. Every cart mutation calls this inside the same transaction.
pub async fn recompute_total(cart_id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), CourtError> {
    sqlx::query(
        r#"
            UPDATE carts SET
                total = COALESCE((SELECT SUM(subtotal) FROM cart_lines WHERE cart_id = $1), 0),
                updated_at = $2
            WHERE id = $1;
        "#,
    )
    .bind(cart_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Flips an active cart to `checked_out`. Returns `CartNotFound` if the cart was not active, which is how a second,
/// concurrent checkout of the same cart loses.
pub async fn mark_checked_out(cart_id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), CourtError> {
    let changed =
        sqlx::query("UPDATE carts SET status = 'checked_out', updated_at = $1 WHERE id = $2 AND status = 'active'")
            .bind(now)
            .bind(cart_id)
            .execute(conn)
            .await?
            .rows_affected();
    if changed == 0 {
        debug!("🗃️ Cart #{cart_id} is no longer active. Checkout refused.");
        return Err(CourtError::CartNotFound);
    }
    Ok(())
}

/// Flips a checked-out cart back to active, unless the customer already has another active cart in the court.
pub async fn reopen_checked_out(cart_id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<bool, CourtError> {
    let changed = sqlx::query(
        r#"
            UPDATE carts SET status = 'active', updated_at = $1
            WHERE id = $2 AND status = 'checked_out' AND NOT EXISTS (
                SELECT 1 FROM carts AS other
                WHERE other.court_id = carts.court_id AND other.customer_id = carts.customer_id AND other.status = 'active'
            )
        "#,
    )
    .bind(now)
    .bind(cart_id)
    .execute(conn)
    .await?
    .rows_affected();
    Ok(changed > 0)
}

pub async fn abandon_idle_carts(
    idle_since: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<i64>, CourtError> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "UPDATE carts SET status = 'abandoned', updated_at = $1 WHERE status = 'active' AND updated_at < $2 RETURNING id",
    )
    .bind(now)
    .bind(idle_since)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

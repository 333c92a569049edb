use sqlx::SqliteConnection;

use crate::{
    court_api::errors::CourtError,
    db_types::{Court, MenuItem, Vendor},
};

pub async fn fetch_court(court_id: &str, conn: &mut SqliteConnection) -> Result<Option<Court>, CourtError> {
    let court = sqlx::query_as::<_, Court>("SELECT * FROM courts WHERE id = $1").bind(court_id).fetch_optional(conn).await?;
    Ok(court)
}

pub async fn fetch_vendor(
    court_id: &str,
    vendor_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Vendor>, CourtError> {
    let vendor = sqlx::query_as::<_, Vendor>("SELECT * FROM vendors WHERE id = $1 AND court_id = $2")
        .bind(vendor_id)
        .bind(court_id)
        .fetch_optional(conn)
        .await?;
    Ok(vendor)
}

pub async fn fetch_menu_item(
    court_id: &str,
    menu_item_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<MenuItem>, CourtError> {
    let item = sqlx::query_as::<_, MenuItem>("SELECT * FROM menu_items WHERE id = $1 AND court_id = $2")
        .bind(menu_item_id)
        .bind(court_id)
        .fetch_optional(conn)
        .await?;
    Ok(item)
}

/// Folds a new rating into the vendor's running average in a single statement, so concurrent ratings cannot lose
/// updates.
pub async fn add_vendor_rating(
    vendor_id: &str,
    rating: i64,
    conn: &mut SqliteConnection,
) -> Result<Vendor, CourtError> {
    let vendor = sqlx::query_as::<_, Vendor>(
        r#"
            UPDATE vendors SET
                rating = (rating * total_ratings + $1) / (total_ratings + 1),
                total_ratings = total_ratings + 1,
                updated_at = $2
            WHERE id = $3
            RETURNING *;
        "#,
    )
    .bind(rating as f64)
    .bind(chrono::Utc::now())
    .bind(vendor_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| CourtError::NotFound(format!("Vendor {vendor_id}")))?;
    Ok(vendor)
}

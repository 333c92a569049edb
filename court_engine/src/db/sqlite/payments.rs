use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    court_api::errors::CourtError,
    db_types::{NewAllocation, NewPayment, Payment, PaymentAllocation},
};

pub async fn insert_payment(
    order_id: i64,
    payment: &NewPayment,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payment, CourtError> {
    let payment = sqlx::query_as::<_, Payment>(
        r#"
            INSERT INTO payments (order_id, court_id, amount, method, status, vendor_payout_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'created', 'pending', $5, $5)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(&payment.court_id)
    .bind(payment.amount)
    .bind(payment.method)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(payment)
}

pub async fn fetch_payment(payment_id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, CourtError> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
        .bind(payment_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_payment_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, CourtError> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_payment_by_gateway_order_id(
    gateway_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, CourtError> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE gateway_order_id = $1")
        .bind(gateway_order_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

/// Moves a `created` payment to `processing`, recording the gateway order id. Returns `None` if the payment was not in
/// the `created` state.
pub async fn mark_processing(
    payment_id: i64,
    gateway_order_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, CourtError> {
    let payment = sqlx::query_as::<_, Payment>(
        r#"
            UPDATE payments SET status = 'processing', gateway_order_id = $1, updated_at = $2
            WHERE id = $3 AND status = 'created'
            RETURNING *;
        "#,
    )
    .bind(gateway_order_id)
    .bind(now)
    .bind(payment_id)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Moves a `processing` payment to `completed`. Returns `None` if the payment was in any other state, or if the
/// gateway order id does not match the one recorded when the intent was created.
pub async fn mark_completed(
    payment_id: i64,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
    processed_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, CourtError> {
    let payment = sqlx::query_as::<_, Payment>(
        r#"
            UPDATE payments SET
                status = 'completed',
                gateway_payment_id = $1,
                gateway_signature = $2,
                processed_at = $3,
                updated_at = $3
            WHERE id = $4 AND status = 'processing' AND gateway_order_id = $5
            RETURNING *;
        "#,
    )
    .bind(gateway_payment_id)
    .bind(signature)
    .bind(processed_at)
    .bind(payment_id)
    .bind(gateway_order_id)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

pub async fn insert_allocation(
    payment_id: i64,
    court_id: &str,
    allocation: &NewAllocation,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentAllocation, CourtError> {
    let allocation = sqlx::query_as::<_, PaymentAllocation>(
        r#"
            INSERT INTO payment_allocations (payment_id, order_id, court_id, vendor_id, amount, payout_status, created_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING *;
        "#,
    )
    .bind(payment_id)
    .bind(allocation.order_id)
    .bind(court_id)
    .bind(&allocation.vendor_id)
    .bind(allocation.amount)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(allocation)
}

pub async fn fetch_allocations_for_payment(
    payment_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentAllocation>, CourtError> {
    let allocations =
        sqlx::query_as::<_, PaymentAllocation>("SELECT * FROM payment_allocations WHERE payment_id = $1 ORDER BY id")
            .bind(payment_id)
            .fetch_all(conn)
            .await?;
    Ok(allocations)
}

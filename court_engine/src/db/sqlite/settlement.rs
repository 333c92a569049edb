use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    court_api::errors::CourtError,
    db::traits::WebhookRecordResult,
    db_types::{Paise, PaymentAllocation, PayoutBatch, VendorAccount, VendorAccountUpdate},
};

pub async fn fetch_vendor_account(
    vendor_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<VendorAccount>, CourtError> {
    let account = sqlx::query_as::<_, VendorAccount>("SELECT * FROM vendor_accounts WHERE vendor_id = $1")
        .bind(vendor_id)
        .fetch_optional(conn)
        .await?;
    Ok(account)
}

pub async fn update_vendor_account(
    gateway_account_id: &str,
    update: VendorAccountUpdate,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<VendorAccount>, CourtError> {
    let account = sqlx::query_as::<_, VendorAccount>(
        r#"
            UPDATE vendor_accounts SET
                activation_status = COALESCE($1, activation_status),
                funds_on_hold = COALESCE($2, funds_on_hold),
                updated_at = $3
            WHERE gateway_account_id = $4
            RETURNING *;
        "#,
    )
    .bind(update.activation_status)
    .bind(update.funds_on_hold)
    .bind(now)
    .bind(gateway_account_id)
    .fetch_optional(conn)
    .await?;
    Ok(account)
}

pub async fn fetch_pending_allocations(
    court_id: &str,
    vendor_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentAllocation>, CourtError> {
    let allocations = sqlx::query_as::<_, PaymentAllocation>(
        r#"
            SELECT * FROM payment_allocations
            WHERE court_id = $1 AND vendor_id = $2 AND payout_status = 'pending' AND payout_batch_id IS NULL
            ORDER BY id ASC;
        "#,
    )
    .bind(court_id)
    .bind(vendor_id)
    .fetch_all(conn)
    .await?;
    Ok(allocations)
}

/// Creates an empty batch in the `initiated` state. The totals are filled in once the allocations are claimed.
pub async fn create_batch(
    court_id: &str,
    vendor_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, CourtError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
            INSERT INTO payout_batches (court_id, vendor_id, gross_amount, platform_fee, vendor_amount, status, created_at, updated_at)
            VALUES ($1, $2, 0, 0, 0, 'initiated', $3, $3)
            RETURNING id;
        "#,
    )
    .bind(court_id)
    .bind(vendor_id)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Tags every unclaimed pending allocation of the vendor with the batch id, and returns them.
pub async fn claim_allocations(
    batch_id: i64,
    court_id: &str,
    vendor_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentAllocation>, CourtError> {
    let allocations = sqlx::query_as::<_, PaymentAllocation>(
        r#"
            UPDATE payment_allocations SET payout_batch_id = $1
            WHERE court_id = $2 AND vendor_id = $3 AND payout_status = 'pending' AND payout_batch_id IS NULL
            RETURNING *;
        "#,
    )
    .bind(batch_id)
    .bind(court_id)
    .bind(vendor_id)
    .fetch_all(conn)
    .await?;
    Ok(allocations)
}

pub async fn set_batch_totals(
    batch_id: i64,
    gross: Paise,
    fee: Paise,
    vendor_amount: Paise,
    conn: &mut SqliteConnection,
) -> Result<PayoutBatch, CourtError> {
    let mut batch = sqlx::query_as::<_, PayoutBatch>(
        r#"
            UPDATE payout_batches SET gross_amount = $1, platform_fee = $2, vendor_amount = $3
            WHERE id = $4
            RETURNING *;
        "#,
    )
    .bind(gross)
    .bind(fee)
    .bind(vendor_amount)
    .bind(batch_id)
    .fetch_one(&mut *conn)
    .await?;
    batch.payment_ids = batch_payment_ids(batch_id, conn).await?;
    Ok(batch)
}

pub async fn batch_payment_ids(batch_id: i64, conn: &mut SqliteConnection) -> Result<Vec<i64>, CourtError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT DISTINCT payment_id FROM payment_allocations WHERE payout_batch_id = $1 ORDER BY payment_id",
    )
    .bind(batch_id)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

pub async fn fetch_batch(batch_id: i64, conn: &mut SqliteConnection) -> Result<Option<PayoutBatch>, CourtError> {
    let batch = sqlx::query_as::<_, PayoutBatch>("SELECT * FROM payout_batches WHERE id = $1")
        .bind(batch_id)
        .fetch_optional(&mut *conn)
        .await?;
    match batch {
        Some(mut batch) => {
            batch.payment_ids = batch_payment_ids(batch.id, conn).await?;
            Ok(Some(batch))
        },
        None => Ok(None),
    }
}

/// Ids of the batches that have been `initiated` since before `created_before`, oldest first.
pub async fn stale_initiated_batch_ids(
    created_before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<i64>, CourtError> {
    let ids = sqlx::query_scalar(
        "SELECT id FROM payout_batches WHERE status = 'initiated' AND created_at < $1 ORDER BY created_at, id",
    )
    .bind(created_before)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

pub async fn fetch_batch_by_transfer_id(
    transfer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PayoutBatch>, CourtError> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM payout_batches WHERE transfer_id = $1")
        .bind(transfer_id)
        .fetch_optional(&mut *conn)
        .await?;
    match id {
        Some(id) => fetch_batch(id, conn).await,
        None => Ok(None),
    }
}

/// Moves an `initiated` batch to `processing` and records the transfer id. Returns `None` if the batch was not
/// `initiated`.
pub async fn mark_batch_processing(
    batch_id: i64,
    transfer_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, CourtError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
            UPDATE payout_batches SET transfer_id = $1, status = 'processing', updated_at = $2
            WHERE id = $3 AND status = 'initiated'
            RETURNING id;
        "#,
    )
    .bind(transfer_id)
    .bind(now)
    .bind(batch_id)
    .fetch_optional(conn)
    .await?;
    Ok(id)
}

/// Sets the terminal status of a batch that is currently in `from_status`. Returns the batch id if it changed.
pub async fn finish_batch(
    batch_id: i64,
    from_status: &str,
    to_status: &str,
    failure_reason: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, CourtError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
            UPDATE payout_batches SET status = $1, failure_reason = $2, updated_at = $3
            WHERE id = $4 AND status = $5
            RETURNING id;
        "#,
    )
    .bind(to_status)
    .bind(failure_reason)
    .bind(now)
    .bind(batch_id)
    .bind(from_status)
    .fetch_optional(conn)
    .await?;
    Ok(id)
}

pub async fn set_allocation_status(
    batch_id: i64,
    payout_status: &str,
    conn: &mut SqliteConnection,
) -> Result<u64, CourtError> {
    let changed = sqlx::query("UPDATE payment_allocations SET payout_status = $1 WHERE payout_batch_id = $2")
        .bind(payout_status)
        .bind(batch_id)
        .execute(conn)
        .await?
        .rows_affected();
    Ok(changed)
}

/// Detaches the allocations from the batch and returns them to the pending pool.
pub async fn release_allocations(batch_id: i64, conn: &mut SqliteConnection) -> Result<u64, CourtError> {
    let released = sqlx::query(
        "UPDATE payment_allocations SET payout_status = 'pending', payout_batch_id = NULL WHERE payout_batch_id = $1",
    )
    .bind(batch_id)
    .execute(conn)
    .await?
    .rows_affected();
    trace!("🗃️ {released} allocations released from payout batch #{batch_id}");
    Ok(released)
}

/// Derives each payment's vendor payout status from its allocations: `paid` once every allocation is paid,
/// `processing` once none is waiting, `pending` otherwise.
pub async fn refresh_payment_payout_status(
    payment_ids: &[i64],
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), CourtError> {
    for id in payment_ids {
        sqlx::query(
            r#"
                UPDATE payments SET
                    vendor_payout_status = CASE
                        WHEN NOT EXISTS (
                            SELECT 1 FROM payment_allocations a WHERE a.payment_id = payments.id AND a.payout_status <> 'paid'
                        ) THEN 'paid'
                        WHEN NOT EXISTS (
                            SELECT 1 FROM payment_allocations a WHERE a.payment_id = payments.id AND a.payout_status = 'pending'
                        ) THEN 'processing'
                        ELSE 'pending'
                    END,
                    updated_at = $1
                WHERE id = $2;
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn webhook_event_seen(event_id: &str, conn: &mut SqliteConnection) -> Result<bool, CourtError> {
    let seen: Option<i64> = sqlx::query_scalar("SELECT 1 FROM processed_webhook_events WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(conn)
        .await?;
    Ok(seen.is_some())
}

pub async fn record_webhook_event(
    event_id: &str,
    event_type: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<WebhookRecordResult, CourtError> {
    let inserted = sqlx::query(
        r#"
            INSERT INTO processed_webhook_events (event_id, event_type, processed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING;
        "#,
    )
    .bind(event_id)
    .bind(event_type)
    .bind(now)
    .execute(conn)
    .await?
    .rows_affected();
    if inserted == 0 {
        Ok(WebhookRecordResult::AlreadyProcessed)
    } else {
        Ok(WebhookRecordResult::Recorded)
    }
}

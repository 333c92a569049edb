use chrono::{DateTime, Utc};
use log::*;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    court_api::errors::CourtError,
    db::traits::{OrderQueryFilter, StatusChange},
    db_types::{NewOrder, NewOrderLine, Order, OrderLine, OrderStatusType, StatusHistoryEntry},
};

/// Inserts a new order row using the given connection. This is not atomic. Embed the call inside a transaction and
/// pass `&mut *tx` as the connection if atomicity is needed.
///
/// A clash on the order number is reported as `DuplicateOrderNumber`.
pub async fn insert_order(
    order: &NewOrder,
    parent_order_id: Option<i64>,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, CourtError> {
    let result = sqlx::query_scalar::<_, i64>(
        r#"
            INSERT INTO orders (
                order_number,
                court_id,
                parent_order_id,
                is_sub_order,
                vendor_id,
                customer_id,
                status,
                subtotal,
                total,
                payment_status,
                payment_method,
                version,
                created_at,
                updated_at,
                confirmed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $12, $12, $13)
            RETURNING id;
        "#,
    )
    .bind(&order.order_number)
    .bind(&order.court_id)
    .bind(parent_order_id)
    .bind(order.is_sub_order)
    .bind(&order.vendor_id)
    .bind(&order.customer_id)
    .bind(order.status)
    .bind(order.subtotal)
    .bind(order.total)
    .bind(order.payment_status)
    .bind(order.payment_method)
    .bind(created_at)
    .bind((order.status == OrderStatusType::Confirmed).then_some(created_at))
    .fetch_one(conn)
    .await;
    match result {
        Ok(id) => Ok(id),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(CourtError::DuplicateOrderNumber(order.order_number.clone()))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn insert_order_lines(
    order_id: i64,
    lines: &[NewOrderLine],
    conn: &mut SqliteConnection,
) -> Result<(), CourtError> {
    for line in lines {
        sqlx::query(
            r#"
                INSERT INTO order_lines (order_id, menu_item_id, name, unit_price, quantity, subtotal, customizations)
                VALUES ($1, $2, $3, $4, $5, $6, $7);
            "#,
        )
        .bind(order_id)
        .bind(&line.menu_item_id)
        .bind(&line.name)
        .bind(line.unit_price)
        .bind(line.quantity)
        .bind(line.subtotal())
        .bind(&line.customizations)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Appends an entry to the order's status history. History rows are never updated.
pub async fn insert_history_entry(
    order_id: i64,
    status: OrderStatusType,
    actor: &str,
    note: Option<&str>,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<StatusHistoryEntry, CourtError> {
    let entry = sqlx::query_as::<_, StatusHistoryEntry>(
        r#"
            INSERT INTO order_status_history (order_id, status, actor, note, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(status)
    .bind(actor)
    .bind(note)
    .bind(at)
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

pub async fn fetch_order_lines(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderLine>, CourtError> {
    let lines = sqlx::query_as::<_, OrderLine>("SELECT * FROM order_lines WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(lines)
}

pub async fn fetch_history(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<StatusHistoryEntry>, CourtError> {
    let entries = sqlx::query_as::<_, StatusHistoryEntry>(
        "SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(entries)
}

async fn with_details(mut order: Order, conn: &mut SqliteConnection) -> Result<Order, CourtError> {
    order.lines = fetch_order_lines(order.id, &mut *conn).await?;
    order.history = fetch_history(order.id, conn).await?.into();
    Ok(order)
}

/// Fetches a single order in the given court, with lines and history attached.
pub async fn fetch_order(
    court_id: &str,
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, CourtError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 AND court_id = $2")
        .bind(order_id)
        .bind(court_id)
        .fetch_optional(&mut *conn)
        .await?;
    match order {
        Some(order) => Ok(Some(with_details(order, conn).await?)),
        None => Ok(None),
    }
}

pub async fn fetch_order_by_id(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, CourtError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;
    match order {
        Some(order) => Ok(Some(with_details(order, conn).await?)),
        None => Ok(None),
    }
}

pub async fn fetch_order_by_number(
    court_id: &str,
    order_number: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, CourtError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = $1 AND court_id = $2")
        .bind(order_number)
        .bind(court_id)
        .fetch_optional(&mut *conn)
        .await?;
    match order {
        Some(order) => Ok(Some(with_details(order, conn).await?)),
        None => Ok(None),
    }
}

pub async fn fetch_sub_orders(parent_order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, CourtError> {
    let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE parent_order_id = $1 ORDER BY id ASC")
        .bind(parent_order_id)
        .fetch_all(&mut *conn)
        .await?;
    let mut result = Vec::with_capacity(orders.len());
    for order in orders {
        result.push(with_details(order, &mut *conn).await?);
    }
    Ok(result)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at`, newest first. Lines are attached; history is not.
pub async fn fetch_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, CourtError> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(court_id) = query.court_id {
        where_clause.push("court_id = ");
        where_clause.push_bind_unseparated(court_id);
    }
    if let Some(customer_id) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(customer_id);
    }
    if let Some(vendor_id) = query.vendor_id {
        where_clause.push("vendor_id = ");
        where_clause.push_bind_unseparated(vendor_id);
    }
    if let Some(parent_id) = query.parent_order_id {
        where_clause.push("parent_order_id = ");
        where_clause.push_bind_unseparated(parent_id);
    }
    if !query.statuses.is_empty() {
        where_clause.push("status IN (");
        for (i, status) in query.statuses.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
        }
        where_clause.push_unseparated(")");
    }
    if let Some(payment_status) = query.payment_status {
        where_clause.push("payment_status = ");
        where_clause.push_bind_unseparated(payment_status);
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at < ");
        where_clause.push_bind_unseparated(until);
    }
    if query.top_level_only {
        where_clause.push("is_sub_order = 0");
    }
    builder.push(" ORDER BY created_at DESC, id DESC");
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }

    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(&mut *conn).await?;
    trace!("🗃️ Result of fetch_orders: {}", orders.len());
    let mut result = Vec::with_capacity(orders.len());
    for mut order in orders {
        order.lines = fetch_order_lines(order.id, &mut *conn).await?;
        result.push(order);
    }
    Ok(result)
}

fn timestamp_column(status: OrderStatusType) -> Option<&'static str> {
    match status {
        OrderStatusType::Pending => None,
        OrderStatusType::Confirmed => Some("confirmed_at"),
        OrderStatusType::Preparing => Some("preparing_at"),
        OrderStatusType::Ready => Some("ready_at"),
        OrderStatusType::Completed => Some("completed_at"),
        OrderStatusType::Cancelled | OrderStatusType::Rejected => Some("cancelled_at"),
    }
}

/// Applies a single status change, guarded by the order's version. Appends the history entry and returns the updated
/// order with its history.
///
/// If the order's version or status no longer match, nothing is written and `ConcurrentModification` is returned. The
/// caller must roll back the surrounding transaction in that case.
pub async fn apply_status_change(change: &StatusChange, conn: &mut SqliteConnection) -> Result<Order, CourtError> {
    let mut builder = QueryBuilder::new("UPDATE orders SET status = ");
    builder.push_bind(change.to);
    builder.push(", version = version + 1, updated_at = ");
    builder.push_bind(change.at);
    if let Some(column) = timestamp_column(change.to) {
        builder.push(format!(", {column} = "));
        builder.push_bind(change.at);
    }
    if let Some(reason) = &change.cancellation_reason {
        builder.push(", cancellation_reason = ");
        builder.push_bind(reason.clone());
    }
    builder.push(" WHERE id = ");
    builder.push_bind(change.order_id);
    builder.push(" AND version = ");
    builder.push_bind(change.expected_version);
    builder.push(" AND status = ");
    builder.push_bind(change.from);
    builder.push(" RETURNING *");
    let updated = builder.build_query_as::<Order>().fetch_optional(&mut *conn).await?;
    let order = match updated {
        Some(o) => o,
        None => {
            debug!(
                "🗃️ Order #{} changed underneath a {} -> {} transition (expected version {})",
                change.order_id, change.from, change.to, change.expected_version
            );
            return Err(CourtError::ConcurrentModification);
        },
    };
    let previous = fetch_history(order.id, &mut *conn).await?;
    let entry =
        insert_history_entry(order.id, change.to, &change.actor, change.note.as_deref(), change.at, &mut *conn).await?;
    let mut order = order;
    order.lines = fetch_order_lines(order.id, conn).await?;
    order.history = crate::db_types::StatusHistory::from(previous).with_entry(entry);
    trace!("🗃️ Order #{} is now {} (version {})", order.id, order.status, order.version);
    Ok(order)
}

/// Marks the orders as paid. Each order's version is bumped.
pub async fn mark_orders_paid(
    order_ids: &[i64],
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), CourtError> {
    for id in order_ids {
        sqlx::query(
            "UPDATE orders SET payment_status = 'paid', version = version + 1, updated_at = $1 WHERE id = $2",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Sets the rating on a completed order that has not been rated yet. Returns `None` if the order is already rated or
/// not completed.
pub async fn set_rating(
    order_id: i64,
    rating: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, CourtError> {
    let order = sqlx::query_as::<_, Order>(
        r#"
            UPDATE orders SET rating = $1, version = version + 1, updated_at = $2
            WHERE id = $3 AND rating IS NULL AND status = 'completed'
            RETURNING *;
        "#,
    )
    .bind(rating)
    .bind(now)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

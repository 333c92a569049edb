use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    court_api::errors::CourtError,
    db_types::{AuditLogEntry, NewAuditEntry},
};

pub async fn insert_entry(
    entry: NewAuditEntry,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, CourtError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
            INSERT INTO audit_log (court_id, entity_type, entity_id, action, actor, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id;
        "#,
    )
    .bind(entry.court_id)
    .bind(entry.entity_type)
    .bind(entry.entity_id)
    .bind(entry.action)
    .bind(entry.actor)
    .bind(entry.detail)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn fetch_entries(
    entity_type: &str,
    entity_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<AuditLogEntry>, CourtError> {
    let entries = sqlx::query_as::<_, AuditLogEntry>(
        "SELECT * FROM audit_log WHERE entity_type = $1 AND entity_id = $2 ORDER BY id ASC",
    )
    .bind(entity_type)
    .bind(entity_id)
    .fetch_all(conn)
    .await?;
    Ok(entries)
}

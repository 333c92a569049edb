use crate::{
    court_api::errors::CourtError,
    db_types::{AuditLogEntry, NewAuditEntry},
};

/// The append-only audit log. Entries are never updated or deleted.
#[allow(async_fn_in_trait)]
pub trait AuditManagement: Clone {
    async fn append_audit_entry(&self, entry: NewAuditEntry) -> Result<i64, CourtError>;

    async fn fetch_audit_entries(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLogEntry>, CourtError>;
}

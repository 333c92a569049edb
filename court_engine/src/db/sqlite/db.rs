use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate, SqlitePool};

use super::{audit, carts, courts, db_url, new_pool, orders, payments, settlement};
use crate::{
    court_api::errors::CourtError,
    db::traits::{
        AuditManagement,
        CartManagement,
        CourtDatabase,
        CourtManagement,
        InsertedOrders,
        NewOrderSet,
        OrderManagement,
        OrderQueryFilter,
        PaymentCompletion,
        PaymentManagement,
        PayoutClaim,
        SettlementManagement,
        StatusChange,
        WebhookRecordResult,
    },
    db_types::{
        AuditLogEntry,
        Cart,
        CartStatus,
        Court,
        CourtSettings,
        MenuItem,
        NewAuditEntry,
        NewCartLine,
        Order,
        Paise,
        Payment,
        PaymentAllocation,
        PayoutBatch,
        PayoutBatchStatus,
        Vendor,
        VendorAccount,
        VendorAccountUpdate,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `FCO_DATABASE_URL`
    pub async fn new(max_connections: u32) -> Result<Self, CourtError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, CourtError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Safe to call on every start.
    pub async fn run_migrations(&self) -> Result<(), CourtError> {
        migrate!("./src/db/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CourtError::DatabaseError(format!("Migration failed: {e}")))?;
        info!("🗃️ Migrations complete");
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), CourtError> {
        self.pool.close().await;
        Ok(())
    }

    async fn cart_after_mutation(
        &self,
        court_id: &str,
        customer_id: &str,
        cart_id: i64,
    ) -> Result<Cart, CourtError> {
        let mut conn = self.pool.acquire().await?;
        match carts::fetch_active_cart(court_id, customer_id, &mut conn).await? {
            Some(cart) if cart.id == cart_id => Ok(cart),
            _ => {
                warn!("🗃️ Cart #{cart_id} was checked out or abandoned while it was being edited");
                Err(CourtError::CartNotFound)
            },
        }
    }

    async fn refetch_batch(&self, batch_id: i64) -> Result<PayoutBatch, CourtError> {
        let mut conn = self.pool.acquire().await?;
        settlement::fetch_batch(batch_id, &mut conn)
            .await?
            .ok_or_else(|| CourtError::NotFound(format!("Payout batch #{batch_id}")))
    }
}

impl CourtDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }
}

impl CourtManagement for SqliteDatabase {
    async fn fetch_court(&self, court_id: &str) -> Result<Option<Court>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        courts::fetch_court(court_id, &mut conn).await
    }

    async fn fetch_vendor(&self, court_id: &str, vendor_id: &str) -> Result<Option<Vendor>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        courts::fetch_vendor(court_id, vendor_id, &mut conn).await
    }

    async fn fetch_menu_item(&self, court_id: &str, menu_item_id: &str) -> Result<Option<MenuItem>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        courts::fetch_menu_item(court_id, menu_item_id, &mut conn).await
    }
}

impl CartManagement for SqliteDatabase {
    async fn fetch_active_cart(&self, court_id: &str, customer_id: &str) -> Result<Option<Cart>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        carts::fetch_active_cart(court_id, customer_id, &mut conn).await
    }

    async fn upsert_cart_line(&self, court_id: &str, customer_id: &str, line: NewCartLine) -> Result<Cart, CourtError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let cart_id = carts::fetch_or_create_active_cart_id(court_id, customer_id, now, &mut tx).await?;
        let item = line.menu_item_id.clone();
        carts::upsert_line(cart_id, line, &mut tx).await?;
        carts::recompute_total(cart_id, now, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Cart #{cart_id}: line for {item} saved");
        self.cart_after_mutation(court_id, customer_id, cart_id).await
    }

    async fn set_cart_line_quantity(
        &self,
        court_id: &str,
        customer_id: &str,
        menu_item_id: &str,
        quantity: i64,
    ) -> Result<Cart, CourtError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let cart_id = carts::active_cart_id(court_id, customer_id, &mut tx).await?.ok_or(CourtError::CartNotFound)?;
        let changed = if quantity <= 0 {
            carts::delete_line(cart_id, menu_item_id, &mut tx).await?
        } else {
            carts::set_line_quantity(cart_id, menu_item_id, quantity, &mut tx).await?
        };
        if changed == 0 {
            return Err(CourtError::NotFound(format!("Cart line for {menu_item_id}")));
        }
        carts::recompute_total(cart_id, now, &mut tx).await?;
        tx.commit().await?;
        self.cart_after_mutation(court_id, customer_id, cart_id).await
    }

    async fn remove_cart_line(
        &self,
        court_id: &str,
        customer_id: &str,
        menu_item_id: &str,
    ) -> Result<Cart, CourtError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let cart_id = carts::active_cart_id(court_id, customer_id, &mut tx).await?.ok_or(CourtError::CartNotFound)?;
        let removed = carts::delete_line(cart_id, menu_item_id, &mut tx).await?;
        carts::recompute_total(cart_id, now, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Cart #{cart_id}: {removed} line(s) for {menu_item_id} removed");
        self.cart_after_mutation(court_id, customer_id, cart_id).await
    }

    async fn checkout_cart(
        &self,
        court_id: &str,
        customer_id: &str,
        settings: &CourtSettings,
    ) -> Result<Cart, CourtError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut cart = carts::fetch_active_cart(court_id, customer_id, &mut tx).await?.ok_or(CourtError::CartNotFound)?;
        if cart.is_empty() {
            return Err(CourtError::validation("Cannot check out an empty cart"));
        }
        settings.check_order_total(cart.total)?;
        carts::mark_checked_out(cart.id, now, &mut tx).await?;
        tx.commit().await?;
        cart.status = CartStatus::CheckedOut;
        cart.updated_at = now;
        debug!("🗃️ Cart #{} checked out with {} line(s), total {}", cart.id, cart.lines.len(), cart.total);
        Ok(cart)
    }

    async fn reopen_cart(&self, cart_id: i64) -> Result<bool, CourtError> {
        let mut tx = self.pool.begin().await?;
        let reopened = carts::reopen_checked_out(cart_id, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(reopened)
    }

    async fn abandon_idle_carts(&self, idle_since: DateTime<Utc>) -> Result<Vec<i64>, CourtError> {
        let mut tx = self.pool.begin().await?;
        let abandoned = carts::abandon_idle_carts(idle_since, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(abandoned)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order_set(&self, set: NewOrderSet) -> Result<InsertedOrders, CourtError> {
        let at = set.created_at;
        let mut tx = self.pool.begin().await?;
        let root_id = match &set.parent {
            Some(parent) => {
                let parent_id = orders::insert_order(parent, None, at, &mut tx).await?;
                orders::insert_history_entry(parent_id, parent.status, &set.actor, None, at, &mut tx).await?;
                for order in &set.orders {
                    let id = orders::insert_order(order, Some(parent_id), at, &mut tx).await?;
                    orders::insert_order_lines(id, &order.lines, &mut tx).await?;
                    orders::insert_history_entry(id, order.status, &set.actor, None, at, &mut tx).await?;
                }
                parent_id
            },
            None => {
                let order = set
                    .orders
                    .first()
                    .ok_or_else(|| CourtError::validation("An order set needs at least one vendor order"))?;
                let id = orders::insert_order(order, None, at, &mut tx).await?;
                orders::insert_order_lines(id, &order.lines, &mut tx).await?;
                orders::insert_history_entry(id, order.status, &set.actor, None, at, &mut tx).await?;
                id
            },
        };
        let payment = payments::insert_payment(root_id, &set.payment, at, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order #{root_id} saved with {} vendor order(s) and payment #{}", set.orders.len(), payment.id);

        let mut conn = self.pool.acquire().await?;
        let root = orders::fetch_order_by_id(root_id, &mut conn).await?.ok_or(CourtError::OrderNotFound(root_id))?;
        let sub_orders = if set.parent.is_some() { orders::fetch_sub_orders(root_id, &mut conn).await? } else { vec![] };
        Ok(InsertedOrders { root, sub_orders, payment })
    }

    async fn fetch_order(&self, court_id: &str, order_id: i64) -> Result<Option<Order>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(court_id, order_id, &mut conn).await
    }

    async fn fetch_order_by_number(&self, court_id: &str, order_number: &str) -> Result<Option<Order>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_number(court_id, order_number, &mut conn).await
    }

    async fn fetch_sub_orders(&self, parent_order_id: i64) -> Result<Vec<Order>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_sub_orders(parent_order_id, &mut conn).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders(query, &mut conn).await
    }

    async fn apply_status_changes(&self, changes: Vec<StatusChange>) -> Result<Vec<Order>, CourtError> {
        let mut tx = self.pool.begin().await?;
        let mut result = Vec::with_capacity(changes.len());
        for change in &changes {
            let order = orders::apply_status_change(change, &mut tx).await?;
            result.push(order);
        }
        tx.commit().await?;
        Ok(result)
    }

    async fn record_rating(&self, order: &Order, rating: i64) -> Result<(Order, Vendor), CourtError> {
        let vendor_id =
            order.vendor_id.as_deref().ok_or_else(|| CourtError::validation("Only vendor orders can be rated"))?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut rated = orders::set_rating(order.id, rating, now, &mut tx).await?.ok_or(CourtError::AlreadyRated(order.id))?;
        let vendor = courts::add_vendor_rating(vendor_id, rating, &mut tx).await?;
        rated.lines = orders::fetch_order_lines(rated.id, &mut tx).await?;
        rated.history = orders::fetch_history(rated.id, &mut tx).await?.into();
        tx.commit().await?;
        debug!("🗃️ Order #{} rated {rating}. Vendor {vendor_id} now averages {:.2}", order.id, vendor.rating);
        Ok((rated, vendor))
    }
}

impl PaymentManagement for SqliteDatabase {
    async fn fetch_payment_for_order(&self, order_id: i64) -> Result<Option<Payment>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment_for_order(order_id, &mut conn).await
    }

    async fn fetch_payment_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Payment>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment_by_gateway_order_id(gateway_order_id, &mut conn).await
    }

    async fn mark_payment_processing(&self, payment_id: i64, gateway_order_id: &str) -> Result<Payment, CourtError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::mark_processing(payment_id, gateway_order_id, Utc::now(), &mut tx)
            .await?
            .ok_or_else(|| CourtError::AlreadyProcessed(format!("Payment #{payment_id}")))?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn complete_payment(&self, completion: PaymentCompletion) -> Result<Payment, CourtError> {
        let at = completion.processed_at;
        let mut tx = self.pool.begin().await?;
        let payment = payments::mark_completed(
            completion.payment_id,
            &completion.gateway_order_id,
            &completion.gateway_payment_id,
            &completion.signature,
            at,
            &mut tx,
        )
        .await?
        .ok_or_else(|| CourtError::AlreadyProcessed(format!("Payment #{}", completion.payment_id)))?;
        for change in &completion.status_changes {
            orders::apply_status_change(change, &mut tx).await?;
        }
        orders::mark_orders_paid(&completion.paid_order_ids, at, &mut tx).await?;
        for allocation in &completion.allocations {
            payments::insert_allocation(payment.id, &payment.court_id, allocation, at, &mut tx).await?;
        }
        audit::insert_entry(completion.audit, at, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Payment #{} completed. {} orders paid, {} allocations recorded",
            payment.id,
            completion.paid_order_ids.len(),
            completion.allocations.len()
        );
        Ok(payment)
    }

    async fn fetch_allocations_for_payment(&self, payment_id: i64) -> Result<Vec<PaymentAllocation>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_allocations_for_payment(payment_id, &mut conn).await
    }
}

impl SettlementManagement for SqliteDatabase {
    async fn fetch_vendor_account(&self, vendor_id: &str) -> Result<Option<VendorAccount>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        settlement::fetch_vendor_account(vendor_id, &mut conn).await
    }

    async fn update_vendor_account(
        &self,
        gateway_account_id: &str,
        update: VendorAccountUpdate,
    ) -> Result<Option<VendorAccount>, CourtError> {
        let mut tx = self.pool.begin().await?;
        let account = settlement::update_vendor_account(gateway_account_id, update, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(account)
    }

    async fn fetch_pending_allocations(
        &self,
        court_id: &str,
        vendor_id: &str,
    ) -> Result<Vec<PaymentAllocation>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        settlement::fetch_pending_allocations(court_id, vendor_id, &mut conn).await
    }

    async fn claim_pending_allocations(
        &self,
        court_id: &str,
        vendor_id: &str,
        fee_bps: i64,
    ) -> Result<Option<PayoutClaim>, CourtError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        // Writing first takes the write lock up front, so racing claims queue behind each other.
        let batch_id = settlement::create_batch(court_id, vendor_id, now, &mut tx).await?;
        let allocations = settlement::claim_allocations(batch_id, court_id, vendor_id, &mut tx).await?;
        if allocations.is_empty() {
            tx.rollback().await?;
            return Ok(None);
        }
        let gross: Paise = allocations.iter().map(|a| a.amount).sum();
        let fee: Paise = allocations.iter().map(|a| a.amount.basis_points(fee_bps)).sum();
        let batch = settlement::set_batch_totals(batch_id, gross, fee, gross - fee, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Payout batch #{batch_id} claimed {} allocation(s) for {vendor_id}: gross {gross}, fee {fee}",
            allocations.len()
        );
        Ok(Some(PayoutClaim { batch, allocations }))
    }

    async fn commit_payout_batch(
        &self,
        batch_id: i64,
        transfer_id: &str,
        audit: NewAuditEntry,
    ) -> Result<PayoutBatch, CourtError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        settlement::mark_batch_processing(batch_id, transfer_id, now, &mut tx)
            .await?
            .ok_or_else(|| CourtError::AlreadyProcessed(format!("Payout batch #{batch_id}")))?;
        settlement::set_allocation_status(batch_id, "processing", &mut tx).await?;
        let payment_ids = settlement::batch_payment_ids(batch_id, &mut tx).await?;
        settlement::refresh_payment_payout_status(&payment_ids, now, &mut tx).await?;
        audit::insert_entry(audit, now, &mut tx).await?;
        tx.commit().await?;
        self.refetch_batch(batch_id).await
    }

    async fn release_payout_batch(&self, batch_id: i64, reason: &str) -> Result<PayoutBatch, CourtError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        settlement::finish_batch(batch_id, "initiated", "failed", Some(reason), now, &mut tx)
            .await?
            .ok_or_else(|| CourtError::AlreadyProcessed(format!("Payout batch #{batch_id}")))?;
        let payment_ids = settlement::batch_payment_ids(batch_id, &mut tx).await?;
        settlement::release_allocations(batch_id, &mut tx).await?;
        settlement::refresh_payment_payout_status(&payment_ids, now, &mut tx).await?;
        tx.commit().await?;
        let mut batch = self.refetch_batch(batch_id).await?;
        batch.payment_ids = payment_ids;
        Ok(batch)
    }

    async fn settle_transfer(&self, transfer_id: &str) -> Result<Option<PayoutBatch>, CourtError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let batch = match settlement::fetch_batch_by_transfer_id(transfer_id, &mut tx).await? {
            Some(b) => b,
            None => return Ok(None),
        };
        if batch.status != PayoutBatchStatus::Processing {
            debug!("🗃️ Transfer {transfer_id} settled, but batch #{} is already {}", batch.id, batch.status);
            return Ok(Some(batch));
        }
        settlement::finish_batch(batch.id, "processing", "processed", None, now, &mut tx).await?;
        settlement::set_allocation_status(batch.id, "paid", &mut tx).await?;
        settlement::refresh_payment_payout_status(&batch.payment_ids, now, &mut tx).await?;
        tx.commit().await?;
        self.refetch_batch(batch.id).await.map(Some)
    }

    async fn fail_transfer(&self, transfer_id: &str, reason: &str) -> Result<Option<PayoutBatch>, CourtError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let batch = match settlement::fetch_batch_by_transfer_id(transfer_id, &mut tx).await? {
            Some(b) => b,
            None => return Ok(None),
        };
        if batch.status != PayoutBatchStatus::Processing {
            debug!("🗃️ Transfer {transfer_id} failed, but batch #{} is already {}", batch.id, batch.status);
            return Ok(Some(batch));
        }
        settlement::finish_batch(batch.id, "processing", "failed", Some(reason), now, &mut tx).await?;
        settlement::release_allocations(batch.id, &mut tx).await?;
        settlement::refresh_payment_payout_status(&batch.payment_ids, now, &mut tx).await?;
        tx.commit().await?;
        let mut failed = self.refetch_batch(batch.id).await?;
        failed.payment_ids = batch.payment_ids;
        Ok(Some(failed))
    }

    async fn fetch_payout_batch(&self, batch_id: i64) -> Result<Option<PayoutBatch>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        settlement::fetch_batch(batch_id, &mut conn).await
    }

    async fn fetch_stale_initiated_batches(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<PayoutBatch>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        let ids = settlement::stale_initiated_batch_ids(created_before, &mut conn).await?;
        let mut batches = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(batch) = settlement::fetch_batch(id, &mut conn).await? {
                batches.push(batch);
            }
        }
        Ok(batches)
    }

    async fn webhook_event_seen(&self, event_id: &str) -> Result<bool, CourtError> {
        let mut conn = self.pool.acquire().await?;
        settlement::webhook_event_seen(event_id, &mut conn).await
    }

    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> Result<WebhookRecordResult, CourtError> {
        let mut tx = self.pool.begin().await?;
        let result = settlement::record_webhook_event(event_id, event_type, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }
}

impl AuditManagement for SqliteDatabase {
    async fn append_audit_entry(&self, entry: NewAuditEntry) -> Result<i64, CourtError> {
        let mut tx = self.pool.begin().await?;
        let id = audit::insert_entry(entry, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn fetch_audit_entries(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLogEntry>, CourtError> {
        let mut conn = self.pool.acquire().await?;
        audit::fetch_entries(entity_type, entity_id, &mut conn).await
    }
}

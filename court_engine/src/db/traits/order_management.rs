use crate::{
    court_api::errors::CourtError,
    db::traits::{InsertedOrders, NewOrderSet, OrderQueryFilter, StatusChange},
    db_types::{Order, Vendor},
};

#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// Stores a split checkout in a single transaction: the optional parent, every vendor order with its lines, an
    /// initial status history entry per order, and the payment record.
    ///
    /// A clash on the order number yields `DuplicateOrderNumber` and writes nothing.
    async fn insert_order_set(&self, orders: NewOrderSet) -> Result<InsertedOrders, CourtError>;

    /// Fetches an order in the given court, with its lines and status history.
    async fn fetch_order(&self, court_id: &str, order_id: i64) -> Result<Option<Order>, CourtError>;

    async fn fetch_order_by_number(&self, court_id: &str, order_number: &str) -> Result<Option<Order>, CourtError>;

    /// Fetches the vendor sub-orders of a parent order, in id order.
    async fn fetch_sub_orders(&self, parent_order_id: i64) -> Result<Vec<Order>, CourtError>;

    /// Fetches orders matching the filter, newest first. Lines are included; history is not.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, CourtError>;

    /// Applies every status change in one transaction and returns the updated orders, in the same order as the
    /// changes.
    ///
    /// Each change only succeeds if the order still has its expected version. If any order was modified in the
    /// meantime, the whole set is rolled back and `ConcurrentModification` is returned.
    async fn apply_status_changes(&self, changes: Vec<StatusChange>) -> Result<Vec<Order>, CourtError>;

    /// Records a 1-5 star rating on a completed vendor order and folds it into the vendor's running average, in one
    /// transaction. Returns `AlreadyRated` if the order already carries a rating.
    async fn record_rating(&self, order: &Order, rating: i64) -> Result<(Order, Vendor), CourtError>;
}

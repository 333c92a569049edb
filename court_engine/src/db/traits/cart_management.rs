use chrono::{DateTime, Utc};

use crate::{
    court_api::errors::CourtError,
    db_types::{Cart, CourtSettings, NewCartLine},
};

/// Cart storage.
///
/// A customer has at most one active cart per court. Every mutating call runs in a single transaction that also
/// recomputes the cart total from its lines, so `total == sum(line.subtotal)` holds after each successful call.
#[allow(async_fn_in_trait)]
pub trait CartManagement: Clone {
    /// Fetches the customer's active cart, with its lines, if there is one.
    async fn fetch_active_cart(&self, court_id: &str, customer_id: &str) -> Result<Option<Cart>, CourtError>;

    /// Inserts the line, or replaces the existing line for the same menu item, creating the active cart if needed.
    ///
    /// A replaced line takes the quantity, unit price and customizations of `line`.
    async fn upsert_cart_line(&self, court_id: &str, customer_id: &str, line: NewCartLine) -> Result<Cart, CourtError>;

    /// Sets the quantity of an existing line, keeping its price snapshot. A quantity of zero or less removes it.
    ///
    /// Returns `CartNotFound` if there is no active cart, and `NotFound` if the cart has no line for the item.
    async fn set_cart_line_quantity(
        &self,
        court_id: &str,
        customer_id: &str,
        menu_item_id: &str,
        quantity: i64,
    ) -> Result<Cart, CourtError>;

    /// Removes the line for the menu item, if it exists.
    async fn remove_cart_line(&self, court_id: &str, customer_id: &str, menu_item_id: &str)
        -> Result<Cart, CourtError>;

    /// Freezes the active cart: flips it to `checked_out` and returns its final contents.
    ///
    /// The flip is guarded by the cart's status, so of two concurrent checkouts of the same cart exactly one wins. The
    /// other gets `CartNotFound`, as does a customer with no active cart. Empty carts are refused with
    /// `ValidationError`, and so are carts whose total falls outside the court's order limits in `settings`. The
    /// limits are checked against the cart as it stands inside the transaction.
    async fn checkout_cart(&self, court_id: &str, customer_id: &str, settings: &CourtSettings)
        -> Result<Cart, CourtError>;

    /// Puts a checked-out cart back in play after its orders could not be created.
    ///
    /// Returns `false`, and leaves the cart alone, if it is not checked out or if the customer has already started a
    /// new active cart.
    async fn reopen_cart(&self, cart_id: i64) -> Result<bool, CourtError>;

    /// Marks the cart as abandoned if it has not been touched since `idle_since`. Returns the ids of the carts that
    /// were abandoned.
    async fn abandon_idle_carts(&self, idle_since: DateTime<Utc>) -> Result<Vec<i64>, CourtError>;
}

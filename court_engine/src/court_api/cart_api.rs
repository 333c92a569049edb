use std::fmt::Debug;

use log::*;

use crate::{
    court_api::{cart_objects::CartSnapshot, errors::CourtError},
    db::traits::{CartManagement, CourtManagement},
    db_types::{Actor, Cart, Court, MenuItem, NewCartLine, Role, MAX_LINE_QUANTITY},
};

/// `CartApi` manages each customer's single active cart in a court, and freezes it into a [`CartSnapshot`] at
/// checkout.
///
/// Every mutation returns the cart as it stands after the change, with its total recomputed in the same transaction.
pub struct CartApi<B> {
    db: B,
}

impl<B> Debug for CartApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CartApi")
    }
}

impl<B> CartApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> CartApi<B>
where B: CourtManagement + CartManagement
{
    /// Puts `quantity` of a menu item in the customer's cart, creating the cart if needed.
    ///
    /// Adding an item that is already in the cart replaces its quantity and takes the current menu price again. A
    /// quantity of zero or less removes the line.
    pub async fn add_line(
        &self,
        actor: &Actor,
        menu_item_id: &str,
        quantity: i64,
        customizations: Option<String>,
    ) -> Result<Cart, CourtError> {
        if quantity <= 0 {
            return self.remove_line(actor, menu_item_id).await;
        }
        check_quantity(quantity)?;
        let court = self.customer_court(actor).await?;
        let item = self.available_item(&court, menu_item_id).await?;
        let line = NewCartLine::from_menu_item(&item, quantity, customizations);
        let cart = self.db.upsert_cart_line(&court.id, &actor.user_id, line).await?;
        debug!("🛒️ {actor} has {quantity} x {menu_item_id} in cart #{}. Total {}", cart.id, cart.total);
        Ok(cart)
    }

    /// Changes the quantity of a line without re-pricing it. A quantity of zero or less removes the line.
    pub async fn set_line_quantity(&self, actor: &Actor, menu_item_id: &str, quantity: i64) -> Result<Cart, CourtError> {
        let court = self.customer_court(actor).await?;
        if quantity > 0 {
            check_quantity(quantity)?;
            self.available_item(&court, menu_item_id).await?;
        }
        let cart = self.db.set_cart_line_quantity(&court.id, &actor.user_id, menu_item_id, quantity).await?;
        debug!("🛒️ {actor} set {menu_item_id} to {quantity} in cart #{}. Total {}", cart.id, cart.total);
        Ok(cart)
    }

    pub async fn remove_line(&self, actor: &Actor, menu_item_id: &str) -> Result<Cart, CourtError> {
        let court = self.customer_court(actor).await?;
        let cart = self.db.remove_cart_line(&court.id, &actor.user_id, menu_item_id).await?;
        debug!("🛒️ {actor} removed {menu_item_id} from cart #{}. Total {}", cart.id, cart.total);
        Ok(cart)
    }

    /// The customer's active cart, if they have one.
    pub async fn get_cart(&self, actor: &Actor) -> Result<Option<Cart>, CourtError> {
        let court = self.customer_court(actor).await?;
        self.db.fetch_active_cart(&court.id, &actor.user_id).await
    }

    /// Freezes the active cart and marks it checked out. Orders are created from the snapshot by
    /// [`crate::OrderFlowApi::split_and_create`].
    ///
    /// A cart can only be checked out once: the second attempt finds no active cart and fails with `CartNotFound`.
    pub async fn checkout(&self, actor: &Actor) -> Result<CartSnapshot, CourtError> {
        let court = self.customer_court(actor).await?;
        let cart = self.db.checkout_cart(&court.id, &actor.user_id, &court.settings()).await?;
        let snapshot = CartSnapshot::from(cart);
        info!(
            "🛒️ {actor} checked out cart #{} with {} vendor(s). Total {}",
            snapshot.cart_id,
            snapshot.vendor_groups.len(),
            snapshot.total
        );
        Ok(snapshot)
    }

    /// Gives the customer their cart back when the orders for a checkout could not be created.
    ///
    /// The cart is left checked out if the customer has already started a new one.
    pub async fn reopen_after_failed_checkout(&self, snapshot: &CartSnapshot) -> Result<bool, CourtError> {
        let reopened = self.db.reopen_cart(snapshot.cart_id).await?;
        if reopened {
            info!("🛒️ Cart #{} is active again after its checkout failed", snapshot.cart_id);
        } else {
            warn!("🛒️ Cart #{} could not be reopened after its checkout failed", snapshot.cart_id);
        }
        Ok(reopened)
    }

    async fn customer_court(&self, actor: &Actor) -> Result<Court, CourtError> {
        if actor.role != Role::Customer {
            return Err(CourtError::forbidden("only customers have carts"));
        }
        self.db.resolve_court(&actor.court_id).await
    }

    async fn available_item(&self, court: &Court, menu_item_id: &str) -> Result<MenuItem, CourtError> {
        let item = self
            .db
            .fetch_menu_item(&court.id, menu_item_id)
            .await?
            .ok_or_else(|| CourtError::NotFound(format!("Menu item {menu_item_id}")))?;
        if !item.is_available() {
            return Err(CourtError::ItemUnavailable(item.name));
        }
        Ok(item)
    }
}

fn check_quantity(quantity: i64) -> Result<(), CourtError> {
    if quantity > MAX_LINE_QUANTITY {
        return Err(CourtError::validation(format!("At most {MAX_LINE_QUANTITY} of an item fit on one line")));
    }
    Ok(())
}

use std::{collections::HashSet, fmt::Debug};

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    court_api::{
        cart_objects::CartSnapshot,
        errors::CourtError,
        order_objects::{ManualOrderRequest, ManualOrderResult, OrderWithChildren},
        transitions::{authorize_transition, plan_status_change},
    },
    db::traits::{
        AuditManagement,
        CourtManagement,
        InsertedOrders,
        NewOrderSet,
        OrderManagement,
        OrderQueryFilter,
        PaymentManagement,
        StatusChange,
    },
    db_types::{
        line_subtotal,
        Actor,
        Court,
        CourtSettings,
        NewAuditEntry,
        NewOrder,
        NewOrderLine,
        NewPayment,
        Order,
        OrderPaymentStatus,
        OrderStatusType,
        Paise,
        PaymentMethod,
        Role,
        Vendor,
    },
    events::{EventProducers, OrderEvent},
    helpers::{new_order_number, AckToken},
};

/// How often the splitter draws fresh order numbers before giving up on a clash.
const ORDER_NUMBER_ATTEMPTS: usize = 3;
/// Customer recorded against manual orders taken at the counter without a customer account
pub const WALK_IN_CUSTOMER: &str = "walk-in";

/// `OrderFlowApi` creates orders (from a checked-out cart, or manually at a vendor's counter) and moves them through
/// the order state machine.
///
/// Every accepted change is committed first and announced afterwards through the event producers, so the
/// notification side can never hold up or undo a change.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: CourtManagement + OrderManagement + PaymentManagement + AuditManagement
{
    //-----------------------------------------   Order creation   ---------------------------------------------------

    /// Turns a checked-out cart into orders.
    ///
    /// A cart with a single vendor becomes a single order. A cart with several vendors becomes a parent order, which
    /// carries the total and the payment but no lines, plus one `pending` sub-order per vendor. Everything is written
    /// in one transaction.
    pub async fn split_and_create(&self, snapshot: &CartSnapshot) -> Result<InsertedOrders, CourtError> {
        let court = self.db.resolve_court(&snapshot.court_id).await?;
        if snapshot.vendor_groups.is_empty() {
            return Err(CourtError::validation("Cannot create orders from an empty cart"));
        }
        let actor = Actor::customer(snapshot.customer_id.as_str(), court.id.as_str());
        let inserted = self
            .insert_with_fresh_numbers(|now| {
                let mut numbers = distinct_order_numbers(snapshot.vendor_groups.len() + 1, now);
                let orders = snapshot
                    .vendor_groups
                    .iter()
                    .map(|group| {
                        let lines = group.lines.iter().map(NewOrderLine::from).collect();
                        new_vendor_order(
                            numbers.pop().unwrap_or_default(),
                            &court.id,
                            &group.vendor_id,
                            &snapshot.customer_id,
                            snapshot.is_multi_vendor(),
                            PaymentMethod::Online,
                            lines,
                        )
                    })
                    .collect::<Vec<_>>();
                let parent = snapshot.is_multi_vendor().then(|| NewOrder {
                    order_number: numbers.pop().unwrap_or_default(),
                    court_id: court.id.clone(),
                    vendor_id: None,
                    customer_id: snapshot.customer_id.clone(),
                    is_sub_order: false,
                    status: OrderStatusType::Pending,
                    subtotal: snapshot.total,
                    total: orders.iter().map(|o| o.total).sum(),
                    payment_status: OrderPaymentStatus::Unpaid,
                    payment_method: PaymentMethod::Online,
                    lines: vec![],
                });
                let total = parent.as_ref().map(|p| p.total).unwrap_or_else(|| orders.iter().map(|o| o.total).sum());
                NewOrderSet {
                    parent,
                    orders,
                    payment: NewPayment { court_id: court.id.clone(), amount: total, method: PaymentMethod::Online },
                    actor: actor.label(),
                    created_at: now,
                }
            })
            .await?;
        info!(
            "🔄️ Cart #{} became order {} with {} vendor order(s). Total {}",
            snapshot.cart_id,
            inserted.root.order_number,
            inserted.vendor_orders().len(),
            inserted.root.total
        );
        self.announce_new_orders(&inserted);
        Ok(inserted)
    }

    /// Creates an order for a single vendor without a cart, e.g. for a walk-in customer at the counter.
    ///
    /// The vendor may override menu prices line by line. Cash orders start `confirmed`, since there is no online
    /// payment to wait for; their payment row is still written, for the audit trail. The result carries an
    /// acknowledgment token to print on the customer's slip.
    pub async fn create_manual_order(
        &self,
        actor: &Actor,
        request: ManualOrderRequest,
    ) -> Result<ManualOrderResult, CourtError> {
        match actor.role {
            Role::Vendor if actor.user_id == request.vendor_id => {},
            Role::Admin => {},
            Role::Vendor => return Err(CourtError::forbidden("vendors may only create their own orders")),
            _ => return Err(CourtError::forbidden("only vendors can take manual orders")),
        }
        let court = self.db.resolve_court(&actor.court_id).await?;
        let vendor = self.vendor_in_court(&court, &request.vendor_id).await?;
        let lines = self.price_manual_lines(&court, &vendor, &request).await?;
        let customer_id = request.customer_id.clone().unwrap_or_else(|| WALK_IN_CUSTOMER.to_string());
        let method = request.payment_method;
        let inserted = self
            .insert_with_fresh_numbers(|now| {
                let order = new_vendor_order(
                    new_order_number(now),
                    &court.id,
                    &vendor.id,
                    &customer_id,
                    false,
                    method,
                    lines.clone(),
                );
                NewOrderSet {
                    parent: None,
                    payment: NewPayment { court_id: court.id.clone(), amount: order.total, method },
                    orders: vec![order],
                    actor: actor.label(),
                    created_at: now,
                }
            })
            .await?;
        let ack_token = AckToken::for_order(&inserted.root)?.encode()?;
        info!(
            "🔄️ {actor} took manual order {} ({method}) for {}",
            inserted.root.order_number, inserted.root.total
        );
        self.announce_new_orders(&inserted);
        Ok(ManualOrderResult { order: inserted.root, payment: inserted.payment, ack_token })
    }

    async fn price_manual_lines(
        &self,
        court: &Court,
        vendor: &Vendor,
        request: &ManualOrderRequest,
    ) -> Result<Vec<NewOrderLine>, CourtError> {
        if request.lines.is_empty() {
            return Err(CourtError::validation("A manual order needs at least one line"));
        }
        let mut lines = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            if line.quantity <= 0 {
                return Err(CourtError::validation(format!("Quantity for {} must be positive", line.menu_item_id)));
            }
            let item = self
                .db
                .fetch_menu_item(&court.id, &line.menu_item_id)
                .await?
                .filter(|item| item.vendor_id == vendor.id)
                .ok_or_else(|| CourtError::NotFound(format!("Menu item {}", line.menu_item_id)))?;
            if !item.is_available() {
                return Err(CourtError::ItemUnavailable(item.name));
            }
            let unit_price = line.unit_price.unwrap_or(item.price);
            if !unit_price.is_positive() {
                return Err(CourtError::validation(format!("Price for {} must be positive", item.name)));
            }
            line_subtotal(unit_price, line.quantity)?;
            lines.push(NewOrderLine {
                menu_item_id: item.id,
                name: item.name,
                unit_price,
                quantity: line.quantity,
                customizations: line.customizations.clone(),
            });
        }
        Ok(lines)
    }

    /// Builds an order set with `build` and inserts it, drawing new order numbers if one of them is already taken.
    async fn insert_with_fresh_numbers<F>(&self, build: F) -> Result<InsertedOrders, CourtError>
    where F: Fn(DateTime<Utc>) -> NewOrderSet {
        let mut attempt = 1;
        loop {
            let set = build(Utc::now());
            match self.db.insert_order_set(set).await {
                Err(CourtError::DuplicateOrderNumber(number)) if attempt < ORDER_NUMBER_ATTEMPTS => {
                    warn!("🔄️ Order number {number} is taken. Drawing new numbers (attempt {attempt})");
                    attempt += 1;
                },
                result => return result,
            }
        }
    }

    fn announce_new_orders(&self, inserted: &InsertedOrders) {
        let mut events = vec![OrderEvent::created(inserted.root.clone())];
        events.extend(inserted.sub_orders.iter().cloned().map(OrderEvent::created));
        self.producers.publish_order_events(events);
    }

    //-----------------------------------------   State machine   ----------------------------------------------------

    /// Moves an order to `target` on behalf of `actor`.
    ///
    /// Parent orders follow their sub-orders and can only be cancelled directly, which cascades to the sub-orders.
    /// While a split checkout is unpaid, its customer cancels it as a whole and never one vendor order alone.
    /// Concurrent changes to the same order are detected with the order's version, and the loser gets
    /// `ConcurrentModification`.
    pub async fn transition(
        &self,
        actor: &Actor,
        order_id: i64,
        target: OrderStatusType,
        note: Option<String>,
    ) -> Result<Order, CourtError> {
        let court = self.db.resolve_court(&actor.court_id).await?;
        let order = self.fetch_in_court(&court, order_id).await?;
        let settings = court.settings();
        let now = Utc::now();

        let changes = if order.is_parent() {
            if target != OrderStatusType::Cancelled {
                return Err(CourtError::invalid_transition(
                    order.status,
                    target,
                    "a parent order only moves with its vendor orders",
                ));
            }
            self.plan_cascading_cancellation(&order, actor, &settings, note, now).await?
        } else {
            if actor.role == Role::Customer && order.is_sub_order && order.payment_status == OrderPaymentStatus::Unpaid {
                return Err(CourtError::invalid_transition(
                    order.status,
                    target,
                    "this vendor order is part of an unpaid checkout. Cancel the whole checkout instead",
                ));
            }
            authorize_transition(&order, target, actor, &settings, now)?;
            vec![plan_status_change(&order, target, actor, note, now)]
        };
        let previous = changes.iter().map(|c| c.from).collect::<Vec<_>>();
        let updated = self.db.apply_status_changes(changes).await?;
        info!("🔄️ {actor} moved order #{order_id} from {} to {target}", order.status);

        if actor.role == Role::Admin {
            self.audit_override(actor, &order, target).await;
        }
        let events = updated.iter().zip(previous).map(|(o, from)| OrderEvent::status_changed(o.clone(), from));
        self.producers.publish_order_events(events);
        updated.into_iter().next().ok_or(CourtError::OrderNotFound(order_id))
    }

    /// Customer-facing cancellation. The same rules as [`Self::transition`] to `cancelled` apply.
    pub async fn cancel(&self, actor: &Actor, order_id: i64, reason: Option<String>) -> Result<Order, CourtError> {
        self.transition(actor, order_id, OrderStatusType::Cancelled, reason).await
    }

    /// A customer may cancel a split checkout only while every vendor order is still pending. An admin cancels
    /// whatever is still live.
    async fn plan_cascading_cancellation(
        &self,
        parent: &Order,
        actor: &Actor,
        settings: &CourtSettings,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatusChange>, CourtError> {
        authorize_transition(parent, OrderStatusType::Cancelled, actor, settings, now)?;
        let sub_orders = self.db.fetch_sub_orders(parent.id).await?;
        let mut changes = vec![plan_status_change(parent, OrderStatusType::Cancelled, actor, note.clone(), now)];
        for sub in &sub_orders {
            if actor.role == Role::Admin && sub.status.is_terminal() {
                continue;
            }
            authorize_transition(sub, OrderStatusType::Cancelled, actor, settings, now)?;
            changes.push(plan_status_change(sub, OrderStatusType::Cancelled, actor, note.clone(), now));
        }
        debug!("🔄️ Cancelling order #{} cascades to {} vendor order(s)", parent.id, changes.len() - 1);
        Ok(changes)
    }

    async fn audit_override(&self, actor: &Actor, order: &Order, target: OrderStatusType) {
        let entry = NewAuditEntry::new("order", order.id, format!("admin_override:{target}"), &actor.label())
            .with_court(order.court_id.as_str())
            .with_detail(format!(r#"{{"from":"{}","to":"{target}"}}"#, order.status));
        if let Err(e) = self.db.append_audit_entry(entry).await {
            error!("🔄️ Order #{} was changed by {actor}, but the audit entry could not be written. {e}", order.id);
        }
    }

    /// Records the customer's 1 to 5 star rating for a completed vendor order, and folds it into the vendor's
    /// average.
    pub async fn rate_order(&self, actor: &Actor, order_id: i64, rating: i64) -> Result<(Order, Vendor), CourtError> {
        if !(1..=5).contains(&rating) {
            return Err(CourtError::validation("Ratings go from 1 to 5"));
        }
        let court = self.db.resolve_court(&actor.court_id).await?;
        let order = self.fetch_in_court(&court, order_id).await?;
        if actor.role != Role::Customer || order.customer_id != actor.user_id {
            return Err(CourtError::forbidden("only the customer who placed an order can rate it"));
        }
        if order.is_parent() {
            return Err(CourtError::validation("Rate each vendor's order on its own"));
        }
        if order.rating.is_some() {
            return Err(CourtError::AlreadyRated(order_id));
        }
        if order.status != OrderStatusType::Completed {
            return Err(CourtError::validation(format!("Only completed orders can be rated. This one is {}", order.status)));
        }
        let (rated, vendor) = self.db.record_rating(&order, rating).await?;
        info!("🔄️ {actor} rated order #{order_id} {rating}/5. {} now averages {:.2}", vendor.id, vendor.rating);
        self.producers.publish_order_event(OrderEvent::rated(rated.clone()));
        Ok((rated, vendor))
    }

    //-----------------------------------------   Queries   ----------------------------------------------------------

    /// Fetches an order with its sub-orders and payment. Customers see their own orders, vendors see theirs, admins see
    /// everything in their court.
    pub async fn fetch_order_with_children(&self, actor: &Actor, order_id: i64) -> Result<OrderWithChildren, CourtError> {
        let court = self.db.resolve_court(&actor.court_id).await?;
        let order = self.fetch_in_court(&court, order_id).await?;
        let visible = match actor.role {
            Role::Customer => order.customer_id == actor.user_id,
            Role::Vendor => order.belongs_to_vendor(&actor.user_id),
            Role::Admin | Role::System => true,
        };
        if !visible {
            return Err(CourtError::forbidden(format!("order #{order_id} is not yours")));
        }
        let sub_orders = if order.is_parent() { self.db.fetch_sub_orders(order.id).await? } else { vec![] };
        let payment = self.db.fetch_payment_for_order(order.root_id()).await?;
        Ok(OrderWithChildren::new(order, sub_orders, payment))
    }

    /// The customer's checkouts and manual orders, newest first. Sub-orders are reached through their parent.
    pub async fn orders_for_customer(&self, actor: &Actor) -> Result<Vec<Order>, CourtError> {
        let court = self.db.resolve_court(&actor.court_id).await?;
        let query = OrderQueryFilter::for_court(court.id).with_customer_id(actor.user_id.as_str()).top_level_only();
        self.db.search_orders(query).await
    }

    /// The orders a vendor has to fulfil, newest first, optionally restricted to the given statuses.
    pub async fn orders_for_vendor(
        &self,
        actor: &Actor,
        vendor_id: &str,
        statuses: &[OrderStatusType],
    ) -> Result<Vec<Order>, CourtError> {
        match actor.role {
            Role::Vendor if actor.user_id == vendor_id => {},
            Role::Admin | Role::System => {},
            _ => return Err(CourtError::forbidden("vendors can only list their own orders")),
        }
        let court = self.db.resolve_court(&actor.court_id).await?;
        let query = statuses
            .iter()
            .fold(OrderQueryFilter::for_court(court.id).with_vendor_id(vendor_id), |q, s| q.with_status(*s));
        self.db.search_orders(query).await
    }

    /// Resolves the acknowledgment token printed on a manual order's slip back to the order.
    pub async fn lookup_by_ack_token(&self, actor: &Actor, token: &str) -> Result<Order, CourtError> {
        let token = AckToken::decode(token)?;
        let court = self.db.resolve_court(&actor.court_id).await?;
        let order = self.fetch_in_court(&court, token.order_id).await?;
        if !token.matches(&order) {
            warn!("🔄️ {actor} presented an acknowledgment token that does not match order #{}", order.id);
            return Err(CourtError::validation("The acknowledgment token does not match the order"));
        }
        if actor.role == Role::Vendor && !order.belongs_to_vendor(&actor.user_id) {
            return Err(CourtError::forbidden("this order belongs to another vendor"));
        }
        Ok(order)
    }

    async fn fetch_in_court(&self, court: &Court, order_id: i64) -> Result<Order, CourtError> {
        self.db.fetch_order(&court.id, order_id).await?.ok_or(CourtError::OrderNotFound(order_id))
    }

    async fn vendor_in_court(&self, court: &Court, vendor_id: &str) -> Result<Vendor, CourtError> {
        self.db
            .fetch_vendor(&court.id, vendor_id)
            .await?
            .ok_or_else(|| CourtError::NotFound(format!("Vendor {vendor_id}")))
    }
}

fn new_vendor_order(
    order_number: String,
    court_id: &str,
    vendor_id: &str,
    customer_id: &str,
    is_sub_order: bool,
    method: PaymentMethod,
    lines: Vec<NewOrderLine>,
) -> NewOrder {
    let subtotal: Paise = lines.iter().map(|l| l.subtotal()).sum();
    let (status, payment_status) = match method {
        PaymentMethod::CashOnDelivery => (OrderStatusType::Confirmed, OrderPaymentStatus::Pending),
        PaymentMethod::Online => (OrderStatusType::Pending, OrderPaymentStatus::Unpaid),
    };
    NewOrder {
        order_number,
        court_id: court_id.to_string(),
        vendor_id: Some(vendor_id.to_string()),
        customer_id: customer_id.to_string(),
        is_sub_order,
        status,
        subtotal,
        total: subtotal,
        payment_status,
        payment_method: method,
        lines,
    }
}

/// Draws `count` order numbers that are distinct from each other.
fn distinct_order_numbers(count: usize, now: DateTime<Utc>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(count);
    let mut numbers = Vec::with_capacity(count);
    while numbers.len() < count {
        let number = new_order_number(now);
        if seen.insert(number.clone()) {
            numbers.push(number);
        }
    }
    numbers
}

//! The order state machine.
//!
//! ```text
//!   pending ──► confirmed ──► preparing ──► ready ──► completed
//!      │  ╲         │
//!      │   ╲        └──────► rejected
//!      │    └──────────────► rejected
//!      └───────────────────► cancelled   (customer, inside the cancellation window)
//!   any non-terminal ──────► cancelled   (admin)
//! ```
//!
//! Everything here is pure. The functions only decide whether a move is allowed for a given actor, and describe the
//! change. Persisting it is the job of [`crate::OrderManagement::apply_status_changes`].
use chrono::{DateTime, Duration, Utc};

use crate::{
    court_api::errors::CourtError,
    db::traits::StatusChange,
    db_types::{Actor, CourtSettings, Order, OrderPaymentStatus, OrderStatusType, PaymentMethod, Role},
};

use OrderStatusType::*;

/// True if the edge `from -> to` exists in the state machine for vendors and the system actor. Admin cancellation is
/// handled separately, since it may start from any non-terminal state.
pub fn is_forward_edge(from: OrderStatusType, to: OrderStatusType) -> bool {
    matches!(
        (from, to),
        (Pending, Confirmed) |
            (Pending, Cancelled) |
            (Pending, Rejected) |
            (Confirmed, Preparing) |
            (Confirmed, Rejected) |
            (Preparing, Ready) |
            (Ready, Completed)
    )
}

/// The reason a customer is told when their cancellation is refused because of the order's current status.
pub fn customer_cancellation_refusal(status: OrderStatusType) -> &'static str {
    match status {
        Pending => "the order can still be cancelled",
        Confirmed => "the vendor has already accepted this order",
        Preparing => "the order is already being prepared",
        Ready => "the order is ready for pickup",
        Completed => "the order has already been completed",
        Cancelled => "the order has already been cancelled",
        Rejected => "the order was rejected by the vendor",
    }
}

fn terminal_reason(status: OrderStatusType) -> &'static str {
    match status {
        Completed => "the order has already been completed",
        Cancelled => "the order has already been cancelled",
        _ => "the order has already been rejected",
    }
}

fn check_edge(from: OrderStatusType, to: OrderStatusType) -> Result<(), CourtError> {
    if is_forward_edge(from, to) {
        return Ok(());
    }
    let reason = match (from.rank(), to.rank()) {
        (Some(a), Some(b)) if b < a => "orders never move backwards".to_string(),
        (Some(a), Some(b)) if b > a + 1 => "orders move through the kitchen one step at a time".to_string(),
        _ => format!("{to} is not reachable from {from}"),
    };
    Err(CourtError::invalid_transition(from, to, reason))
}

/// Online orders may only be accepted once paid. Cash orders skip the payment gate.
fn payment_settled(order: &Order) -> bool {
    order.payment_method == PaymentMethod::CashOnDelivery || order.payment_status == OrderPaymentStatus::Paid
}

/// The instant after which a customer may no longer cancel the order.
pub fn cancellation_deadline(order: &Order, settings: &CourtSettings) -> DateTime<Utc> {
    order.created_at + Duration::minutes(settings.cancellation_window_minutes)
}

/// Decides whether `actor` may move `order` to `target` right now.
///
/// Orders in another court are reported as missing rather than forbidden, so that ids from one tenant reveal nothing
/// about another.
pub fn authorize_transition(
    order: &Order,
    target: OrderStatusType,
    actor: &Actor,
    settings: &CourtSettings,
    now: DateTime<Utc>,
) -> Result<(), CourtError> {
    if order.court_id != actor.court_id {
        return Err(CourtError::OrderNotFound(order.id));
    }
    let from = order.status;
    if from.is_terminal() {
        return Err(CourtError::invalid_transition(from, target, terminal_reason(from)));
    }
    if from == target {
        return Err(CourtError::invalid_transition(from, target, format!("the order is already {from}")));
    }
    match actor.role {
        Role::Customer => {
            if order.customer_id != actor.user_id {
                return Err(CourtError::forbidden("this order belongs to another customer"));
            }
            if target != Cancelled {
                return Err(CourtError::forbidden("customers may only cancel orders"));
            }
            if from != Pending {
                return Err(CourtError::invalid_transition(from, target, customer_cancellation_refusal(from)));
            }
            if now > cancellation_deadline(order, settings) {
                return Err(CourtError::invalid_transition(
                    from,
                    target,
                    format!("the {} minute cancellation window has passed", settings.cancellation_window_minutes),
                ));
            }
            Ok(())
        },
        Role::Vendor => {
            if !order.belongs_to_vendor(&actor.user_id) {
                return Err(CourtError::forbidden("this order belongs to another vendor"));
            }
            if target == Cancelled {
                return Err(CourtError::forbidden("vendors reject orders instead of cancelling them"));
            }
            check_edge(from, target)?;
            if from == Pending && target == Confirmed && !payment_settled(order) {
                return Err(CourtError::invalid_transition(from, target, "the order is still awaiting payment"));
            }
            Ok(())
        },
        Role::Admin if target == Cancelled => Ok(()),
        Role::Admin | Role::System => check_edge(from, target),
    }
}

/// Describes the move of `order` to `target` as a storage-level change.
///
/// The change timestamp never precedes the latest history entry, so the history stays monotonic even when clocks
/// disagree.
pub fn plan_status_change(
    order: &Order,
    target: OrderStatusType,
    actor: &Actor,
    note: Option<String>,
    now: DateTime<Utc>,
) -> StatusChange {
    let at = order.history.last().map(|e| e.created_at.max(now)).unwrap_or(now);
    let cancellation_reason = match target {
        Cancelled | Rejected => note.clone(),
        _ => None,
    };
    StatusChange {
        order_id: order.id,
        expected_version: order.version,
        from: order.status,
        to: target,
        actor: actor.label(),
        note,
        cancellation_reason,
        at,
    }
}

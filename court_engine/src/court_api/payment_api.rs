use std::{fmt::Debug, future::Future, time::Duration};

use chrono::Utc;
use log::*;
use serde_json::json;

use crate::{
    court_api::{
        errors::CourtError,
        payment_objects::{IntentRef, PaymentConfig, PaymentVerification},
        transitions::{authorize_transition, plan_status_change},
    },
    db::traits::{AuditManagement, CourtManagement, OrderManagement, PaymentCompletion, PaymentManagement},
    db_types::{
        Actor,
        Court,
        NewAllocation,
        NewAuditEntry,
        Order,
        OrderStatusType,
        Payment,
        PaymentMethod,
        PaymentStatusType,
        Role,
    },
    events::{EventProducers, OrderEvent},
    gateway::{GatewayError, IntentRequest, PaymentGateway},
    helpers::verify_payment_signature,
};

/// `PaymentApi` drives the online payment of an order: minting the gateway intent, and completing the payment when
/// the gateway's signed callback comes back.
///
/// A split checkout is paid once, through its parent order. Completing that payment confirms every vendor order at
/// once.
pub struct PaymentApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    config: PaymentConfig,
}

impl<B, G> Debug for PaymentApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi")
    }
}

impl<B, G> PaymentApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers, config: PaymentConfig) -> Self {
        Self { db, gateway, producers, config }
    }
}

impl<B, G> PaymentApi<B, G>
where
    B: CourtManagement + OrderManagement + PaymentManagement + AuditManagement,
    G: PaymentGateway,
{
    /// Asks the gateway for a payment intent covering the order's total and moves the payment to `processing`.
    ///
    /// Only the top-level order of a checkout can be paid, and only once. No database transaction is open while the
    /// gateway is being called.
    pub async fn create_intent(&self, actor: &Actor, order_id: i64) -> Result<IntentRef, CourtError> {
        let court = self.db.resolve_court(&actor.court_id).await?;
        let order = self.fetch_in_court(&court, order_id).await?;
        match actor.role {
            Role::Customer if order.customer_id == actor.user_id => {},
            Role::Admin | Role::System => {},
            _ => return Err(CourtError::forbidden("only the customer who placed the order can pay for it")),
        }
        if order.is_sub_order {
            return Err(CourtError::validation("Sub-orders are paid through their parent order"));
        }
        if order.status.is_terminal() {
            return Err(CourtError::invalid_transition(
                order.status,
                OrderStatusType::Confirmed,
                "the order can no longer be paid",
            ));
        }
        let payment = self.payment_for(&order).await?;
        if payment.method == PaymentMethod::CashOnDelivery {
            return Err(CourtError::validation("Cash orders are paid at the counter"));
        }
        if payment.status != PaymentStatusType::Created {
            return Err(CourtError::AlreadyProcessed(format!("Payment for order #{order_id}")));
        }

        let request = IntentRequest::new(payment.amount, order.order_number.as_str())
            .with_metadata("order_id", order.id.to_string())
            .with_metadata("court_id", court.id.as_str());
        let intent = with_timeout(self.config.gateway_timeout, self.gateway.create_intent(request)).await?;
        if intent.amount != payment.amount {
            error!(
                "💳️ Gateway minted intent {} for {} but order #{order_id} is for {}",
                intent.id, intent.amount, payment.amount
            );
            return Err(CourtError::GatewayUnavailable("the gateway returned an intent for the wrong amount".into()));
        }
        let payment = self.db.mark_payment_processing(payment.id, &intent.id).await?;
        info!("💳️ Intent {} created for order #{order_id} ({})", intent.id, payment.amount);
        Ok(IntentRef {
            order_id,
            payment_id: payment.id,
            gateway_order_id: intent.id,
            amount: payment.amount,
            currency: intent.currency,
        })
    }

    /// Completes the payment of an order from the gateway's signed callback.
    ///
    /// The signature is checked before anything is touched. On success the payment is completed, every order in the
    /// checkout is marked paid, pending orders are confirmed by the system, and each vendor's share is allocated for
    /// payout, all in one transaction. If the court auto-accepts orders, the vendor orders then move on to
    /// `preparing`.
    ///
    /// Replaying an already completed callback returns the current state of the order without changing anything.
    pub async fn verify_and_complete(
        &self,
        actor: &Actor,
        verification: PaymentVerification,
    ) -> Result<Order, CourtError> {
        let court = self.db.resolve_court(&actor.court_id).await?;
        let order = self.fetch_in_court(&court, verification.order_id).await?;
        let payment = self.payment_for(&order).await?;

        if payment.status == PaymentStatusType::Completed {
            return self.replayed_completion(&court, &order, &payment, &verification).await;
        }
        let valid = verify_payment_signature(
            self.config.signing_secret.reveal(),
            &verification.gateway_order_id,
            &verification.gateway_payment_id,
            &verification.signature,
        );
        if !valid {
            warn!("💳️ Invalid payment signature for order #{} from {actor}", order.id);
            return Err(CourtError::InvalidSignature);
        }
        if payment.status != PaymentStatusType::Processing ||
            payment.gateway_order_id.as_deref() != Some(verification.gateway_order_id.as_str())
        {
            return Err(CourtError::validation(format!(
                "Gateway order {} is not the open payment intent for order #{}",
                verification.gateway_order_id, order.id
            )));
        }

        let completion = self.plan_completion(&court, &order, &payment, &verification).await?;
        let changed = completion.status_changes.iter().map(|c| (c.order_id, c.from)).collect::<Vec<_>>();
        match self.db.complete_payment(completion).await {
            Ok(_) => {},
            Err(CourtError::AlreadyProcessed(_)) => {
                debug!("💳️ Payment #{} was completed by a concurrent callback", payment.id);
                return self.replayed_completion(&court, &order, &payment, &verification).await;
            },
            Err(e) => return Err(e),
        }
        info!("💳️ Payment #{} for order #{} completed ({})", payment.id, order.id, payment.amount);

        let (root, vendor_orders) = self.checkout_orders(&court, order.id).await?;
        let sub_orders = vendor_orders.iter().filter(|o| o.is_sub_order).collect::<Vec<_>>();
        let mut events = vec![OrderEvent::paid(root.clone())];
        events.extend(sub_orders.iter().map(|o| OrderEvent::paid((*o).clone())));
        for o in std::iter::once(&root).chain(sub_orders.into_iter()) {
            if let Some((_, from)) = changed.iter().find(|(id, _)| *id == o.id) {
                events.push(OrderEvent::status_changed(o.clone(), *from));
            }
        }
        self.producers.publish_order_events(events);

        if court.settings().auto_accept {
            self.auto_accept(&court, &vendor_orders).await;
        }
        self.fetch_in_court(&court, order.id).await
    }

    async fn plan_completion(
        &self,
        court: &Court,
        order: &Order,
        payment: &Payment,
        verification: &PaymentVerification,
    ) -> Result<PaymentCompletion, CourtError> {
        let now = Utc::now();
        let system = Actor::system(court.id.as_str());
        let settings = court.settings();
        let sub_orders = if order.is_parent() { self.db.fetch_sub_orders(order.id).await? } else { vec![] };
        let vendor_orders = if order.is_parent() { sub_orders.iter().collect::<Vec<_>>() } else { vec![order] };

        let mut status_changes = Vec::new();
        let mut allocations = Vec::new();
        for o in std::iter::once(order).chain(sub_orders.iter()) {
            if o.status == OrderStatusType::Pending {
                authorize_transition(o, OrderStatusType::Confirmed, &system, &settings, now)?;
                status_changes.push(plan_status_change(
                    o,
                    OrderStatusType::Confirmed,
                    &system,
                    Some("payment received".into()),
                    now,
                ));
            }
        }
        for o in vendor_orders {
            if matches!(o.status, OrderStatusType::Cancelled | OrderStatusType::Rejected) {
                warn!("💳️ Order #{} is {} but its checkout was just paid. No payout is allocated for it", o.id, o.status);
                continue;
            }
            if let Some(vendor_id) = &o.vendor_id {
                allocations.push(NewAllocation { order_id: o.id, vendor_id: vendor_id.clone(), amount: o.total });
            }
        }
        let mut paid_order_ids = vec![order.id];
        paid_order_ids.extend(sub_orders.iter().map(|o| o.id));
        let detail = json!({
            "order_id": order.id,
            "gateway_order_id": verification.gateway_order_id,
            "gateway_payment_id": verification.gateway_payment_id,
            "amount": payment.amount,
            "allocations": allocations.len(),
        });
        let audit = NewAuditEntry::new("payment", payment.id, "completed", &system.label())
            .with_court(court.id.as_str())
            .with_detail(detail.to_string());
        Ok(PaymentCompletion {
            payment_id: payment.id,
            gateway_order_id: verification.gateway_order_id.clone(),
            gateway_payment_id: verification.gateway_payment_id.clone(),
            signature: verification.signature.clone(),
            processed_at: now,
            paid_order_ids,
            status_changes,
            allocations,
            audit,
        })
    }

    async fn replayed_completion(
        &self,
        court: &Court,
        order: &Order,
        payment: &Payment,
        verification: &PaymentVerification,
    ) -> Result<Order, CourtError> {
        let payment = self.db.fetch_payment_for_order(payment.order_id).await?.unwrap_or_else(|| payment.clone());
        let same_callback = payment.status == PaymentStatusType::Completed &&
            payment.gateway_order_id.as_deref() == Some(verification.gateway_order_id.as_str()) &&
            payment.gateway_payment_id.as_deref() == Some(verification.gateway_payment_id.as_str());
        if !same_callback {
            return Err(CourtError::AlreadyProcessed(format!("Payment for order #{}", order.id)));
        }
        debug!("💳️ Payment #{} was already completed. Returning the current order state", payment.id);
        self.fetch_in_court(court, order.id).await
    }

    /// Moves freshly confirmed vendor orders on to `preparing`. The payment is already committed at this point, so a
    /// failure here is logged and the orders simply wait for the vendor.
    async fn auto_accept(&self, court: &Court, vendor_orders: &[Order]) {
        let system = Actor::system(court.id.as_str());
        let settings = court.settings();
        let now = Utc::now();
        let changes = vendor_orders
            .iter()
            .filter(|o| o.status == OrderStatusType::Confirmed)
            .filter(|o| authorize_transition(o, OrderStatusType::Preparing, &system, &settings, now).is_ok())
            .map(|o| plan_status_change(o, OrderStatusType::Preparing, &system, Some("auto-accepted".into()), now))
            .collect::<Vec<_>>();
        if changes.is_empty() {
            return;
        }
        match self.db.apply_status_changes(changes).await {
            Ok(updated) => {
                debug!("💳️ {} order(s) auto-accepted in {}", updated.len(), court.id);
                let events = updated.into_iter().map(|o| OrderEvent::status_changed(o, OrderStatusType::Confirmed));
                self.producers.publish_order_events(events);
            },
            Err(e) => warn!("💳️ Could not auto-accept paid orders in {}. {e}", court.id),
        }
    }

    /// The top-level order and its vendor orders, freshly loaded.
    async fn checkout_orders(&self, court: &Court, root_id: i64) -> Result<(Order, Vec<Order>), CourtError> {
        let root = self.fetch_in_court(court, root_id).await?;
        let vendor_orders = if root.is_parent() { self.db.fetch_sub_orders(root.id).await? } else { vec![root.clone()] };
        Ok((root, vendor_orders))
    }

    async fn payment_for(&self, order: &Order) -> Result<Payment, CourtError> {
        self.db
            .fetch_payment_for_order(order.id)
            .await?
            .ok_or_else(|| CourtError::NotFound(format!("Payment for order #{}", order.id)))
    }

    async fn fetch_in_court(&self, court: &Court, order_id: i64) -> Result<Order, CourtError> {
        self.db.fetch_order(&court.id, order_id).await?.ok_or(CourtError::OrderNotFound(order_id))
    }
}

/// Bounds a gateway call. Timeouts and gateway errors both surface as `GatewayUnavailable`.
pub(crate) async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, CourtError>
where F: Future<Output = Result<T, GatewayError>> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!("💳️ Gateway call failed. {e}");
            Err(CourtError::GatewayUnavailable(e.to_string()))
        },
        Err(_) => {
            warn!("💳️ Gateway call timed out after {timeout:?}");
            Err(CourtError::GatewayUnavailable(GatewayError::Timeout.to_string()))
        },
    }
}

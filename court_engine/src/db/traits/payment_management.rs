use crate::{
    court_api::errors::CourtError,
    db::traits::PaymentCompletion,
    db_types::{Payment, PaymentAllocation},
};

#[allow(async_fn_in_trait)]
pub trait PaymentManagement: Clone {
    /// Fetches the payment attached to the given root order.
    async fn fetch_payment_for_order(&self, order_id: i64) -> Result<Option<Payment>, CourtError>;

    async fn fetch_payment_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Payment>, CourtError>;

    /// Records the gateway order id against a payment and moves it from `created` to `processing`.
    ///
    /// Returns `AlreadyProcessed` if the payment is no longer `created`.
    async fn mark_payment_processing(&self, payment_id: i64, gateway_order_id: &str) -> Result<Payment, CourtError>;

    /// Completes a payment. In one transaction the payment becomes `completed`, the listed orders become `paid`, the
    /// status changes are applied, the vendor allocations are written and the audit entry is appended.
    ///
    /// Returns `AlreadyProcessed` if the payment is already `completed` or `failed`.
    async fn complete_payment(&self, completion: PaymentCompletion) -> Result<Payment, CourtError>;

    async fn fetch_allocations_for_payment(&self, payment_id: i64) -> Result<Vec<PaymentAllocation>, CourtError>;
}

//! Drives the engine's payment and settlement flows through the HTTP gateway client in `gateway_tools`.
use court_engine::gateway::{
    GatewayError,
    GatewayIntent,
    GatewayTransfer,
    IntentRequest,
    PaymentGateway,
    TransferRequest,
};
use gateway_tools::{GatewayApi, GatewayApiError, GatewayConfig, NewGatewayOrder, NewTransfer};
use log::*;

#[derive(Debug, Clone)]
pub struct GatewayBridge {
    api: GatewayApi,
}

impl GatewayBridge {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayApiError> {
        let api = GatewayApi::new(config)?;
        Ok(Self { api })
    }
}

impl PaymentGateway for GatewayBridge {
    async fn create_intent(&self, request: IntentRequest) -> Result<GatewayIntent, GatewayError> {
        let order = NewGatewayOrder {
            amount: request.amount.value(),
            currency: request.currency,
            receipt: request.reference,
            notes: request.metadata,
        };
        let created = self.api.create_order(order).await.map_err(to_gateway_error)?;
        debug!("💳️ Gateway order {} created for {} {}", created.id, created.amount, created.currency);
        Ok(GatewayIntent { id: created.id, amount: created.amount.into(), currency: created.currency })
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<GatewayTransfer, GatewayError> {
        let transfer = NewTransfer::new(request.fund_account_id, request.amount.value(), request.reference);
        let created = self.api.create_transfer(transfer).await.map_err(to_gateway_error)?;
        debug!("🏦️ Gateway transfer {} created for {}", created.id, created.amount);
        Ok(GatewayTransfer { transfer_id: created.id })
    }
}

/// A 4xx answer is the gateway refusing the request. Anything else means we could not get a proper answer.
fn to_gateway_error(e: GatewayApiError) -> GatewayError {
    match e {
        GatewayApiError::Timeout => GatewayError::Timeout,
        GatewayApiError::QueryError { status, message } if (400..500).contains(&status) => {
            GatewayError::Rejected(format!("{status}. {message}"))
        },
        GatewayApiError::InvalidAmount(msg) => GatewayError::Rejected(msg),
        e => GatewayError::Transport(e.to_string()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn client_errors_are_rejections() {
        let e = to_gateway_error(GatewayApiError::QueryError { status: 400, message: "amount too low".into() });
        assert!(matches!(e, GatewayError::Rejected(m) if m == "400. amount too low"));
        assert!(matches!(to_gateway_error(GatewayApiError::Timeout), GatewayError::Timeout));
        let e = to_gateway_error(GatewayApiError::QueryError { status: 503, message: "maintenance".into() });
        assert!(matches!(e, GatewayError::Transport(_)));
        assert!(matches!(to_gateway_error(GatewayApiError::JsonError("eof".into())), GatewayError::Transport(_)));
    }
}

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::gateway::{GatewayError, GatewayIntent, GatewayTransfer, IntentRequest, PaymentGateway, TransferRequest};

#[derive(Debug, Default)]
struct MockState {
    intents: Vec<IntentRequest>,
    transfers: Vec<TransferRequest>,
    fail_intents: bool,
    fail_transfers: bool,
    delay: Option<Duration>,
}

/// An in-memory gateway whose behaviour is scripted by the test.
///
/// Intent ids are `order_mock_{n}` and transfer ids are `trf_mock_{n}`, numbered from 1 in call order.
#[derive(Debug, Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_transfer_failure(&self, fail: bool) {
        self.state.lock().unwrap().fail_transfers = fail;
    }

    pub fn set_intent_failure(&self, fail: bool) {
        self.state.lock().unwrap().fail_intents = fail;
    }

    /// Every call sleeps for `delay` before answering
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn intents(&self) -> Vec<IntentRequest> {
        self.state.lock().unwrap().intents.clone()
    }

    pub fn transfers(&self) -> Vec<TransferRequest> {
        self.state.lock().unwrap().transfers.clone()
    }

    fn delay(&self) -> Option<Duration> {
        self.state.lock().unwrap().delay
    }
}

impl PaymentGateway for MockGateway {
    async fn create_intent(&self, request: IntentRequest) -> Result<GatewayIntent, GatewayError> {
        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_intents {
            return Err(GatewayError::Rejected("intent creation is switched off".into()));
        }
        state.intents.push(request.clone());
        Ok(GatewayIntent {
            id: format!("order_mock_{}", state.intents.len()),
            amount: request.amount,
            currency: request.currency,
        })
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<GatewayTransfer, GatewayError> {
        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_transfers {
            return Err(GatewayError::Transport("transfer API is down".into()));
        }
        state.transfers.push(request);
        Ok(GatewayTransfer { transfer_id: format!("trf_mock_{}", state.transfers.len()) })
    }
}

use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::GatewayConfig,
    data_objects::{GatewayOrder, GatewayTransfer, NewGatewayOrder, NewTransfer},
    helpers::error_message,
    GatewayApiError,
};

#[derive(Clone)]
pub struct GatewayApi {
    config: GatewayConfig,
    client: Arc<Client>,
}

impl std::fmt::Debug for GatewayApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GatewayApi ({})", self.config.base_url)
    }
}

impl GatewayApi {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.config.base_url)
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<T, GatewayApiError> {
        let url = self.url(path);
        trace!("Sending {method} {url}");
        let mut req = self
            .client
            .request(method, url)
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.reveal()));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await?;
        if response.status().is_success() {
            trace!("Gateway query successful. {}", response.status());
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await?;
            Err(GatewayApiError::QueryError { status, message: error_message(&body) })
        }
    }

    /// Creates a gateway order, which the customer then pays through the gateway's checkout.
    pub async fn create_order(&self, order: NewGatewayOrder) -> Result<GatewayOrder, GatewayApiError> {
        if order.amount <= 0 {
            return Err(GatewayApiError::InvalidAmount(format!("{} for {}", order.amount, order.receipt)));
        }
        debug!("Creating gateway order for {} ({} {})", order.receipt, order.amount, order.currency);
        let result = self.rest_query::<GatewayOrder, _>(Method::POST, "/orders", Some(order)).await?;
        info!("Created gateway order {}", result.id);
        Ok(result)
    }

    pub async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayApiError> {
        let path = format!("/orders/{order_id}");
        self.rest_query::<GatewayOrder, ()>(Method::GET, &path, None).await
    }

    /// Moves funds to a vendor's fund account. The transfer settles asynchronously; its outcome arrives by webhook.
    pub async fn create_transfer(&self, transfer: NewTransfer) -> Result<GatewayTransfer, GatewayApiError> {
        if transfer.amount <= 0 {
            return Err(GatewayApiError::InvalidAmount(format!("{} to {}", transfer.amount, transfer.account)));
        }
        debug!("Transferring {} {} to {}", transfer.amount, transfer.currency, transfer.account);
        let result = self.rest_query::<GatewayTransfer, _>(Method::POST, "/transfers", Some(transfer)).await?;
        info!("Created transfer {}", result.id);
        Ok(result)
    }

    pub async fn fetch_transfer(&self, transfer_id: &str) -> Result<GatewayTransfer, GatewayApiError> {
        let path = format!("/transfers/{transfer_id}");
        self.rest_query::<GatewayTransfer, ()>(Method::GET, &path, None).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn urls_are_versioned() {
        let config = GatewayConfig { base_url: "http://localhost:9000".into(), ..GatewayConfig::default() };
        let api = GatewayApi::new(config).unwrap();
        assert_eq!(api.url("/orders"), "http://localhost:9000/v1/orders");
    }

    #[tokio::test]
    async fn non_positive_amounts_never_leave_the_process() {
        let api = GatewayApi::new(GatewayConfig::default()).unwrap();
        let err = api.create_transfer(NewTransfer::new("fa_1", 0, "payout-1")).await.unwrap_err();
        assert!(matches!(err, GatewayApiError::InvalidAmount(_)));
    }
}

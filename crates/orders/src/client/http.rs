use async_trait::async_trait;
use common::ProductId;
use inventory::{
    Product, ProductReply, ReservationKey, StockChangeReply, StockChangeRequest, StockReply,
};
use serde::de::DeserializeOwned;

use super::{ClientResult, InventoryClient, InventoryClientError};

/// Reaches a remote inventory ledger over its HTTP surface.
///
/// Business failures arrive in the reply body; connection failures and
/// 5xx responses surface as `Transport` so they can be retried.
#[derive(Clone)]
pub struct HttpInventoryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInventoryClient {
    /// Creates a client for the ledger at `base_url`, e.g.
    /// `http://inventory:3001`.
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| InventoryClientError::Transport(format!("HTTP client error: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn product_url(&self, id: ProductId, suffix: &str) -> String {
        format!("{}/inventory/products/{}{}", self.base_url, id, suffix)
    }

    async fn read_reply<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(InventoryClientError::Transport(format!(
                "inventory ledger returned {status}: {body}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InventoryClientError::Rejected(format!("{status}: {body}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| InventoryClientError::Transport(format!("invalid reply: {e}")))
    }

    async fn change_stock(
        &self,
        id: ProductId,
        request: StockChangeRequest,
        action: &str,
    ) -> ClientResult<u32> {
        let quantity = request.quantity;
        let response = self
            .client
            .post(self.product_url(id, action))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;

        let reply: StockChangeReply = Self::read_reply(response).await?;
        if reply.success {
            return Ok(reply.remaining_stock);
        }

        Err(match reply.to_error(id, quantity) {
            Some(inventory::InventoryError::ProductNotFound(id)) => {
                InventoryClientError::NotFound(id)
            }
            Some(inventory::InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            }) => InventoryClientError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            Some(inventory::InventoryError::InvalidQuantity { .. }) => {
                InventoryClientError::InvalidQuantity { product_id: id }
            }
            _ => InventoryClientError::Rejected(
                reply
                    .error_message
                    .unwrap_or_else(|| "stock change rejected".to_string()),
            ),
        })
    }
}

fn transport(err: reqwest::Error) -> InventoryClientError {
    InventoryClientError::Transport(err.to_string())
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    async fn get_product(&self, id: ProductId) -> ClientResult<Product> {
        let response = self
            .client
            .get(self.product_url(id, ""))
            .send()
            .await
            .map_err(transport)?;

        let reply: ProductReply = Self::read_reply(response).await?;
        reply.into_product().ok_or(InventoryClientError::NotFound(id))
    }

    async fn check_stock(&self, id: ProductId) -> ClientResult<u32> {
        let response = self
            .client
            .get(self.product_url(id, "/stock"))
            .send()
            .await
            .map_err(transport)?;

        let reply: StockReply = Self::read_reply(response).await?;
        if !reply.found {
            return Err(InventoryClientError::NotFound(id));
        }
        Ok(reply.stock)
    }

    async fn reserve_stock(
        &self,
        key: ReservationKey,
        id: ProductId,
        quantity: u32,
    ) -> ClientResult<u32> {
        self.change_stock(id, StockChangeRequest::keyed(key, quantity), "/decrease")
            .await
    }

    async fn release_stock(
        &self,
        key: ReservationKey,
        id: ProductId,
        quantity: u32,
    ) -> ClientResult<u32> {
        self.change_stock(id, StockChangeRequest::keyed(key, quantity), "/increase")
            .await
    }

    async fn increase_stock(&self, id: ProductId, quantity: u32) -> ClientResult<u32> {
        self.change_stock(id, StockChangeRequest::new(quantity), "/increase")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_url_trims_trailing_slash() {
        let client = HttpInventoryClient::with_client(reqwest::Client::new(), "http://inv:3001/");
        let id = ProductId::new();
        assert_eq!(
            client.product_url(id, "/stock"),
            format!("http://inv:3001/inventory/products/{id}/stock")
        );
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_transient() {
        let client = HttpInventoryClient::new("http://127.0.0.1:1").unwrap();
        let err = client.check_stock(ProductId::new()).await.unwrap_err();
        assert!(err.is_transient(), "{err}");
    }
}

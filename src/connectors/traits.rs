// src/connectors/traits.rs
use crate::connectors::messages::PositionSnapshot;
use crate::error::GatewayError;
use crate::types::{CancelResult, OrderRequest, OrderResult};
use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;

/// Performs one authenticated call and returns the decoded response body.
#[async_trait]
pub trait RestTransport: Send + Sync {
    async fn execute(
        &self,
        endpoint: &str,
        method: Method,
        payload: &str,
    ) -> Result<serde_json::Value, GatewayError>;
}

#[async_trait]
impl<T: RestTransport + ?Sized> RestTransport for Arc<T> {
    async fn execute(
        &self,
        endpoint: &str,
        method: Method,
        payload: &str,
    ) -> Result<serde_json::Value, GatewayError> {
        (**self).execute(endpoint, method, payload).await
    }
}

/// Typed exchange operations used by monitors and command handlers.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn get_position(&self, symbol: &str) -> Result<PositionSnapshot, GatewayError>;

    async fn list_positions(&self, settle_coin: &str) -> Result<Vec<PositionSnapshot>, GatewayError>;

    async fn place_order(&self, request: OrderRequest) -> Result<OrderResult, GatewayError>;

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<CancelResult, GatewayError>;

    /// Reduce-only market order for the full size. `Ok(None)` when flat.
    async fn close_position(&self, symbol: &str) -> Result<Option<OrderResult>, GatewayError>;
}

// src/connectors/gateway.rs
use crate::connectors::messages::{
    ApiEnvelope, CancelOrderBody, CancelOrderResult, CreateOrderBody, CreateOrderResult,
    PositionList, PositionQuery, PositionSnapshot,
};
use crate::connectors::traits::{ExchangeGateway, RestTransport};
use crate::error::GatewayError;
use crate::storage::OrderLedger;
use crate::types::{CancelResult, Category, OrderRecord, OrderRequest, OrderResult};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{error, info, warn};

const POSITION_LIST: &str = "/v5/position/list";
const ORDER_CREATE: &str = "/v5/order/create";
const ORDER_CANCEL: &str = "/v5/order/cancel";

/// Exchange operations on top of a signed transport. Every accepted order is
/// appended to the ledger.
pub struct BybitGateway<T> {
    transport: T,
    ledger: Arc<dyn OrderLedger>,
    category: Category,
}

impl<T: RestTransport> BybitGateway<T> {
    pub fn new(transport: T, ledger: Arc<dyn OrderLedger>, category: Category) -> Self {
        Self {
            transport,
            ledger,
            category,
        }
    }

    async fn call(
        &self,
        endpoint: &str,
        method: Method,
        payload: &str,
    ) -> Result<ApiEnvelope, GatewayError> {
        let raw = self.transport.execute(endpoint, method, payload).await?;
        serde_json::from_value(raw)
            .map_err(|e| GatewayError::Validation(format!("{endpoint}: malformed envelope: {e}")))
    }

    async fn positions(&self, query: PositionQuery<'_>) -> Result<Vec<PositionSnapshot>, GatewayError> {
        let params = serde_urlencoded::to_string(&query)
            .map_err(|e| GatewayError::Validation(format!("position query: {e}")))?;
        let envelope = self.call(POSITION_LIST, Method::GET, &params).await?;
        let list: PositionList = decode_result(POSITION_LIST, envelope.result)?;
        Ok(list.list)
    }

    async fn record(&self, request: &OrderRequest, order_id: &str, create_time: i64) {
        let record = OrderRecord {
            order_id: order_id.to_string(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            qty: request.qty,
            price: request.price,
            stop_loss: request.stop_loss,
            create_time,
        };
        if let Err(e) = self.ledger.append(record).await {
            error!(symbol = %request.symbol, order_id, "ledger append failed: {}", e);
        }
    }
}

fn decode_result<R: DeserializeOwned>(endpoint: &str, result: serde_json::Value) -> Result<R, GatewayError> {
    serde_json::from_value(result)
        .map_err(|e| GatewayError::Validation(format!("{endpoint}: unexpected result: {e}")))
}

#[async_trait]
impl<T: RestTransport> ExchangeGateway for BybitGateway<T> {
    async fn get_position(&self, symbol: &str) -> Result<PositionSnapshot, GatewayError> {
        let query = PositionQuery {
            category: self.category.as_str(),
            symbol: Some(symbol),
            settle_coin: None,
        };
        self.positions(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Validation(format!("{symbol}: empty position list")))
    }

    async fn list_positions(&self, settle_coin: &str) -> Result<Vec<PositionSnapshot>, GatewayError> {
        let query = PositionQuery {
            category: self.category.as_str(),
            symbol: None,
            settle_coin: Some(settle_coin),
        };
        self.positions(query).await
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderResult, GatewayError> {
        let body = serde_json::to_string(&CreateOrderBody::from(&request))
            .map_err(|e| GatewayError::Validation(format!("order body: {e}")))?;

        let envelope = self.call(ORDER_CREATE, Method::POST, &body).await?;
        if envelope.ret_msg != "OK" {
            warn!(symbol = %request.symbol, ret_msg = %envelope.ret_msg, "order not acknowledged");
            return Err(GatewayError::Api {
                code: envelope.ret_code,
                message: envelope.ret_msg,
            });
        }

        let raw = envelope.result.clone();
        let created: CreateOrderResult = decode_result(ORDER_CREATE, envelope.result)?;
        info!(
            symbol = %request.symbol,
            side = %request.side,
            order_type = %request.order_type,
            qty = %request.qty,
            order_id = %created.order_id,
            "order placed"
        );
        self.record(&request, &created.order_id, envelope.time).await;

        Ok(OrderResult {
            order_link_id: if created.order_link_id.is_empty() {
                request.order_link_id
            } else {
                created.order_link_id
            },
            order_id: created.order_id,
            time: envelope.time,
            raw,
        })
    }

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<CancelResult, GatewayError> {
        let body = serde_json::to_string(&CancelOrderBody {
            category: self.category,
            order_id,
            symbol,
        })
        .map_err(|e| GatewayError::Validation(format!("cancel body: {e}")))?;

        let envelope = self.call(ORDER_CANCEL, Method::POST, &body).await?;
        let raw = envelope.result.clone();
        let cancelled: CancelOrderResult = decode_result(ORDER_CANCEL, envelope.result)?;
        info!(symbol, order_id = %cancelled.order_id, "order cancelled");
        Ok(CancelResult {
            order_id: cancelled.order_id,
            raw,
        })
    }

    async fn close_position(&self, symbol: &str) -> Result<Option<OrderResult>, GatewayError> {
        let snapshot = self.get_position(symbol).await?;
        let Some(figures) = snapshot.figures()? else {
            return Ok(None);
        };
        let request = OrderRequest::market(symbol, figures.side.opposite(), figures.size)
            .reduce_only()
            .in_category(self.category);
        self.place_order(request).await.map(Some)
    }
}

// src/connectors/messages.rs
//! Wire shapes of the v5 REST API. Numbers arrive as strings, often empty
//! for flat positions, so they are kept raw here and parsed on demand.
use crate::error::GatewayError;
use crate::types::{Category, OrderRequest, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// `{retCode, retMsg, result, time}` wrapper around every response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope {
    pub ret_code: i64,
    pub ret_msg: String,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default)]
    pub time: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionQuery<'a> {
    pub category: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settle_coin: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct PositionList {
    #[serde(default)]
    pub list: Vec<PositionSnapshot>,
}

/// One row of the position list.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionSnapshot {
    pub symbol: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub avg_price: String,
    #[serde(default)]
    pub mark_price: String,
    #[serde(default)]
    pub position_value: String,
    #[serde(default)]
    pub unrealised_pnl: String,
    #[serde(default)]
    pub created_time: String,
    #[serde(default)]
    pub updated_time: String,
}

/// Numbers of a non-flat snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFigures {
    pub side: Side,
    pub size: Decimal,
    pub avg_price: Decimal,
    pub mark_price: Decimal,
    pub position_value: Decimal,
    pub unrealised_pnl: Decimal,
    pub created_time: i64,
}

impl PositionSnapshot {
    /// Empty or zero size means the exchange holds no position.
    pub fn is_flat(&self) -> bool {
        let size = self.size.trim();
        size.is_empty() || Decimal::from_str(size).map(|s| s.is_zero()).unwrap_or(false)
    }

    /// Parses the numeric fields. `Ok(None)` for a flat snapshot.
    pub fn figures(&self) -> Result<Option<PositionFigures>, GatewayError> {
        if self.is_flat() {
            return Ok(None);
        }
        let side = match self.side.as_str() {
            "Buy" => Side::Buy,
            "Sell" => Side::Sell,
            other => {
                return Err(GatewayError::Validation(format!(
                    "{}: unexpected side {:?} on an open position",
                    self.symbol, other
                )))
            }
        };
        Ok(Some(PositionFigures {
            side,
            size: self.decimal("size", &self.size)?,
            avg_price: self.decimal("avgPrice", &self.avg_price)?,
            mark_price: self.decimal("markPrice", &self.mark_price)?,
            position_value: self.decimal("positionValue", &self.position_value)?,
            unrealised_pnl: self.decimal("unrealisedPnl", &self.unrealised_pnl)?,
            created_time: self.created_time.trim().parse::<i64>().map_err(|_| {
                GatewayError::Validation(format!(
                    "{}: createdTime is not a timestamp: {:?}",
                    self.symbol, self.created_time
                ))
            })?,
        }))
    }

    fn decimal(&self, field: &str, raw: &str) -> Result<Decimal, GatewayError> {
        Decimal::from_str(raw.trim()).map_err(|_| {
            GatewayError::Validation(format!("{}: {} is not a number: {:?}", self.symbol, field, raw))
        })
    }
}

/// Body of `POST /v5/order/create`.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderBody {
    pub category: Category,
    pub symbol: String,
    pub side: Side,
    pub order_type: String,
    pub qty: String,
    pub time_in_force: &'static str,
    pub reduce_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<String>,
    pub order_link_id: String,
}

impl From<&OrderRequest> for CreateOrderBody {
    fn from(req: &OrderRequest) -> Self {
        Self {
            category: req.category,
            symbol: req.symbol.clone(),
            side: req.side,
            order_type: req.order_type.to_string(),
            qty: req.qty.normalize().to_string(),
            time_in_force: "GTC",
            reduce_only: req.reduce_only,
            price: req.price.map(|p| p.normalize().to_string()),
            stop_loss: req.stop_loss.map(|p| p.normalize().to_string()),
            order_link_id: req.order_link_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResult {
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
}

/// Body of `POST /v5/order/cancel`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderBody<'a> {
    pub category: Category,
    pub order_id: &'a str,
    pub symbol: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderResult {
    pub order_id: String,
}

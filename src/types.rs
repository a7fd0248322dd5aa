// src/types.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => f.write_str("Market"),
            OrderType::Limit => f.write_str("Limit"),
        }
    }
}

/// Product family of an instrument. Only `Linear` is followed by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Linear,
    Inverse,
    Spot,
    Option,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Linear => "linear",
            Category::Inverse => "inverse",
            Category::Spot => "spot",
            Category::Option => "option",
        }
    }
}

/// Opaque destination for status events (a chat id, a console name, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything needed to place one order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub category: Category,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    pub reduce_only: bool,
    pub stop_loss: Option<Decimal>,
    /// Client id used by the exchange to reject duplicates.
    pub order_link_id: String,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: Side, qty: Decimal) -> Self {
        Self {
            category: Category::Linear,
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            qty,
            price: None,
            reduce_only: false,
            stop_loss: None,
            order_link_id: new_order_link_id(),
        }
    }

    pub fn limit(symbol: &str, side: Side, qty: Decimal, price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(symbol, side, qty)
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    pub fn in_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }
}

pub fn new_order_link_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Accepted order as reported by the exchange.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub order_id: String,
    pub order_link_id: String,
    /// Server time (ms epoch) of the response.
    pub time: i64,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CancelResult {
    pub order_id: String,
    pub raw: serde_json::Value,
}

/// Append-only record of a successful placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub create_time: i64,
}

/// Position as owned by its monitor task.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub avg_price: Decimal,
    pub mark_price: Decimal,
    pub size: Decimal,
    pub position_value: Decimal,
    pub unrealised_pnl: Decimal,
    pub created_time: i64,
    pub opened: bool,
    pub pnl_percent: Decimal,
    /// Percent level at or below which the position is force-closed.
    pub stop_loss_trigger: Decimal,
    pub limit_order_open: bool,
    pub limit_order_id: Option<String>,
}

/// Read-only view published for `/show`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionView {
    pub symbol: String,
    pub side: Side,
    pub avg_price: Decimal,
    pub mark_price: Decimal,
    pub size: Decimal,
    pub pnl_percent: Decimal,
    pub stop_loss_trigger: Decimal,
    pub limit_order_id: Option<String>,
    pub state: MonitorState,
    pub updated_at: DateTime<Utc>,
}

impl PositionView {
    pub fn of(position: &Position, state: MonitorState) -> Self {
        Self {
            symbol: position.symbol.clone(),
            side: position.side,
            avg_price: position.avg_price,
            mark_price: position.mark_price,
            size: position.size,
            pnl_percent: position.pnl_percent,
            stop_loss_trigger: position.stop_loss_trigger,
            limit_order_id: position.limit_order_id.clone(),
            state,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorState {
    Opening,
    Following,
    StoppingOut,
    Closed,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MonitorState::Opening => "opening",
            MonitorState::Following => "following",
            MonitorState::StoppingOut => "stopping out",
            MonitorState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Status event for a destination channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub channel: ChannelId,
    pub text: String,
}

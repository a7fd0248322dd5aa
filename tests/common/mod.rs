//! Scripted collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use position_follower::config::RiseStep;
use position_follower::connectors::messages::PositionSnapshot;
use position_follower::connectors::ExchangeGateway;
use position_follower::core::{MonitorSettings, Notifier, PositionMonitor, SnapshotRegistry};
use position_follower::error::GatewayError;
use position_follower::strategies::StopLossLadder;
use position_follower::types::{
    CancelResult, Category, ChannelId, Notification, OrderRequest, OrderResult, OrderType,
};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// -8% stop-out, -5% limit, +5% -> 1%, +10% -> 5%.
pub fn ladder() -> Arc<StopLossLadder> {
    Arc::new(
        StopLossLadder::new(
            d("-8"),
            d("-5"),
            vec![
                RiseStep { rise_threshold: d("5"), new_stop_percent: d("1") },
                RiseStep { rise_threshold: d("10"), new_stop_percent: d("5") },
            ],
        )
        .unwrap(),
    )
}

pub fn fast_settings() -> MonitorSettings {
    MonitorSettings {
        poll_interval: Duration::from_millis(1),
        stop_out_attempts: 3,
        retry_backoff: Duration::from_millis(1),
        tick_size: Decimal::ZERO,
        category: Category::Linear,
    }
}

/// Open long of size 1 at entry 100 whose unrealised PnL equals `pnl_pct`.
pub fn long_at(pnl_pct: &str) -> PositionSnapshot {
    let pnl = d(pnl_pct);
    PositionSnapshot {
        symbol: "BTCUSDT".into(),
        side: "Buy".into(),
        size: "1".into(),
        avg_price: "100".into(),
        mark_price: (d("100") + pnl).to_string(),
        position_value: (d("100") + pnl).to_string(),
        unrealised_pnl: pnl.to_string(),
        created_time: "1700000000000".into(),
        updated_time: "1700000001000".into(),
    }
}

pub fn flat() -> PositionSnapshot {
    PositionSnapshot {
        symbol: "BTCUSDT".into(),
        size: "0".into(),
        ..Default::default()
    }
}

/// Holds reduce-only orders until the test releases them.
#[derive(Default)]
pub struct CloseGate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetPosition(String),
    ListPositions(String),
    Place(OrderRequest),
    Cancel(String),
    Close(String),
}

/// Gateway answering from queues. When the snapshot queue runs dry the last
/// snapshot is repeated; order and cancel queues default to success.
#[derive(Default)]
pub struct ScriptedGateway {
    snapshots: Mutex<VecDeque<Result<PositionSnapshot, GatewayError>>>,
    last_snapshot: Mutex<Option<PositionSnapshot>>,
    place_results: Mutex<VecDeque<Result<(), GatewayError>>>,
    cancel_results: Mutex<VecDeque<Result<(), GatewayError>>>,
    listed: Mutex<Vec<PositionSnapshot>>,
    calls: Mutex<Vec<Call>>,
    next_id: Mutex<u64>,
    close_gate: Mutex<Option<Arc<CloseGate>>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_snapshots(snapshots: Vec<PositionSnapshot>) -> Arc<Self> {
        let gw = Self::default();
        gw.snapshots
            .lock()
            .unwrap()
            .extend(snapshots.into_iter().map(Ok));
        Arc::new(gw)
    }

    pub fn push_snapshot(&self, s: Result<PositionSnapshot, GatewayError>) {
        self.snapshots.lock().unwrap().push_back(s);
    }

    pub fn push_place_result(&self, r: Result<(), GatewayError>) {
        self.place_results.lock().unwrap().push_back(r);
    }

    pub fn push_cancel_result(&self, r: Result<(), GatewayError>) {
        self.cancel_results.lock().unwrap().push_back(r);
    }

    pub fn hold_closes(&self) -> Arc<CloseGate> {
        let gate = Arc::new(CloseGate::default());
        *self.close_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn set_listed(&self, list: Vec<PositionSnapshot>) {
        *self.listed.lock().unwrap() = list;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Place(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn placed_of(&self, order_type: OrderType) -> Vec<OrderRequest> {
        self.placed()
            .into_iter()
            .filter(|r| r.order_type == order_type)
            .collect()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Cancel(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn polls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::GetPosition(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn order_id(&self) -> String {
        let mut n = self.next_id.lock().unwrap();
        *n += 1;
        format!("order-{}", *n)
    }
}

#[async_trait]
impl ExchangeGateway for ScriptedGateway {
    async fn get_position(&self, symbol: &str) -> Result<PositionSnapshot, GatewayError> {
        self.record(Call::GetPosition(symbol.to_string()));
        let next = self.snapshots.lock().unwrap().pop_front();
        match next {
            Some(Ok(s)) => {
                *self.last_snapshot.lock().unwrap() = Some(s.clone());
                Ok(s)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last_snapshot
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| GatewayError::Validation("no snapshot scripted".into())),
        }
    }

    async fn list_positions(&self, settle_coin: &str) -> Result<Vec<PositionSnapshot>, GatewayError> {
        self.record(Call::ListPositions(settle_coin.to_string()));
        Ok(self.listed.lock().unwrap().clone())
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderResult, GatewayError> {
        self.record(Call::Place(request.clone()));
        let gate = self.close_gate.lock().unwrap().clone();
        if let Some(gate) = gate.filter(|_| request.reduce_only) {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let scripted = self.place_results.lock().unwrap().pop_front();
        if let Some(Err(e)) = scripted {
            return Err(e);
        }
        Ok(OrderResult {
            order_id: self.order_id(),
            order_link_id: request.order_link_id,
            time: 1_700_000_000_000,
            raw: serde_json::Value::Null,
        })
    }

    async fn cancel_order(&self, order_id: &str, _symbol: &str) -> Result<CancelResult, GatewayError> {
        self.record(Call::Cancel(order_id.to_string()));
        let scripted = self.cancel_results.lock().unwrap().pop_front();
        if let Some(Err(e)) = scripted {
            return Err(e);
        }
        Ok(CancelResult {
            order_id: order_id.to_string(),
            raw: serde_json::Value::Null,
        })
    }

    async fn close_position(&self, symbol: &str) -> Result<Option<OrderResult>, GatewayError> {
        self.record(Call::Close(symbol.to_string()));
        Ok(Some(OrderResult {
            order_id: self.order_id(),
            order_link_id: String::new(),
            time: 1_700_000_000_000,
            raw: serde_json::Value::Null,
        }))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|n| n.text.clone()).collect()
    }

    pub fn any_contains(&self, needle: &str) -> bool {
        self.texts().iter().any(|t| t.contains(needle))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel: &ChannelId, text: &str) {
        self.sent.lock().unwrap().push(Notification {
            channel: channel.clone(),
            text: text.to_string(),
        });
    }
}

pub fn monitor(
    gateway: Arc<ScriptedGateway>,
    notifier: Arc<RecordingNotifier>,
    registry: SnapshotRegistry,
) -> PositionMonitor {
    PositionMonitor::new(
        "BTCUSDT",
        ChannelId::new("chat-1"),
        gateway,
        notifier,
        ladder(),
        registry,
        fast_settings(),
    )
}

// src/core/dispatcher.rs
use crate::config::FollowerConfig;
use crate::connectors::messages::PositionSnapshot;
use crate::connectors::traits::ExchangeGateway;
use crate::core::monitor::{ExitReason, MonitorReport, MonitorSettings, PositionMonitor};
use crate::core::notifier::Notifier;
use crate::core::registry::SnapshotRegistry;
use crate::error::MonitorError;
use crate::strategies::ladder::StopLossLadder;
use crate::types::{ChannelId, OrderRequest, PositionView, Side};
use crate::utils::precision::normalize_quantity;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Open(Vec<String>),
    Close(Vec<String>),
    Show,
}

impl Command {
    /// `/open BTCUSDT ETHUSDT`, `close btcusdt`, `/show`, `/start`.
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let head = words.next().ok_or_else(|| "empty command".to_string())?;
        let mut symbols: Vec<String> = Vec::new();
        for w in words {
            let s = w.to_ascii_uppercase();
            if !symbols.contains(&s) {
                symbols.push(s);
            }
        }

        match head.trim_start_matches('/').to_ascii_lowercase().as_str() {
            "start" | "help" => Ok(Command::Help),
            "show" => Ok(Command::Show),
            "open" if symbols.is_empty() => Err("usage: /open SYMBOL [SYMBOL...]".to_string()),
            "open" => Ok(Command::Open(symbols)),
            "close" if symbols.is_empty() => Err("usage: /close SYMBOL [SYMBOL...]".to_string()),
            "close" => Ok(Command::Close(symbols)),
            other => Err(format!("unknown command {other:?}, try /help")),
        }
    }
}

struct MonitorHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<MonitorReport, MonitorError>>,
}

/// Turns commands into gateway calls and owns the monitor tasks.
/// Every handler answers with text; gateway errors never escape.
pub struct Dispatcher {
    gateway: Arc<dyn ExchangeGateway>,
    notifier: Arc<dyn Notifier>,
    ladder: Arc<StopLossLadder>,
    registry: SnapshotRegistry,
    settings: MonitorSettings,
    order_qty: Decimal,
    qty_step: Decimal,
    settle_coin: String,
    shutdown: CancellationToken,
    monitors: Mutex<HashMap<String, MonitorHandle>>,
}

impl Dispatcher {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        ladder: Arc<StopLossLadder>,
        follower: &FollowerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self::with_settings(
            gateway,
            notifier,
            ladder,
            follower,
            MonitorSettings::from_config(follower),
            shutdown,
        )
    }

    pub fn with_settings(
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        ladder: Arc<StopLossLadder>,
        follower: &FollowerConfig,
        settings: MonitorSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            notifier,
            ladder,
            registry: SnapshotRegistry::new(),
            settings,
            order_qty: follower.order_qty,
            qty_step: follower.qty_step,
            settle_coin: follower.settle_coin.clone(),
            shutdown,
            monitors: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &SnapshotRegistry {
        &self.registry
    }

    pub async fn handle(&self, line: &str, channel: &ChannelId) -> String {
        match Command::parse(line) {
            Ok(cmd) => self.execute(cmd, channel).await,
            Err(msg) => msg,
        }
    }

    pub async fn execute(&self, command: Command, channel: &ChannelId) -> String {
        match command {
            Command::Help => self.help(),
            Command::Show => self.show().await,
            Command::Open(symbols) => {
                join_all(symbols.iter().map(|s| self.open(s, channel)))
                    .await
                    .join("\n")
            }
            Command::Close(symbols) => {
                join_all(symbols.iter().map(|s| self.close(s)))
                    .await
                    .join("\n")
            }
        }
    }

    pub fn help(&self) -> String {
        format!(
            "Meet the positions follower. It opens Buy positions for the requested instruments \
             and follows each of them:\n{}\n\nCommands:\n\
             /open BTCUSDT ETHUSDT - open and follow positions\n\
             /close BTCUSDT - close positions and stop following them\n\
             /show - show open positions (settle coin {})",
            self.ladder.describe(),
            self.settle_coin
        )
    }

    /// Buys `symbol` at market if the account is flat there, then follows it.
    pub async fn open(&self, symbol: &str, channel: &ChannelId) -> String {
        if self.is_followed(symbol).await {
            return format!("{symbol}: already followed");
        }

        let snapshot = match self.gateway.get_position(symbol).await {
            Ok(s) => s,
            Err(e) => return format!("{symbol}: failed to check position: {e}"),
        };
        if !snapshot.is_flat() {
            return format!("{symbol}: already opened not by the follower");
        }

        let qty = normalize_quantity(self.order_qty, self.qty_step);
        if qty <= Decimal::ZERO {
            return format!("{symbol}: order quantity rounds to zero");
        }

        let entry = OrderRequest::market(symbol, Side::Buy, qty).in_category(self.settings.category);
        match self.gateway.place_order(entry).await {
            Ok(order) => {
                self.follow(symbol, channel).await;
                format!("{symbol}: bought {qty} at market (order {}), following", order.order_id)
            }
            Err(e) => {
                warn!(symbol, "entry order rejected: {}", e);
                format!("{symbol}: failed to open position: {e}")
            }
        }
    }

    /// Starts a monitor for an already opened position.
    pub async fn follow(&self, symbol: &str, channel: &ChannelId) {
        let cancel = self.shutdown.child_token();
        let monitor = PositionMonitor::new(
            symbol,
            channel.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
            self.ladder.clone(),
            self.registry.clone(),
            self.settings.clone(),
        );
        let join = tokio::spawn(monitor.run(cancel.clone()));
        info!(symbol, "monitor spawned");
        self.monitors
            .lock()
            .await
            .insert(symbol.to_string(), MonitorHandle { cancel, join });
    }

    async fn is_followed(&self, symbol: &str) -> bool {
        let mut monitors = self.monitors.lock().await;
        match monitors.get(symbol) {
            Some(h) if !h.join.is_finished() => true,
            Some(_) => {
                monitors.remove(symbol);
                false
            }
            None => false,
        }
    }

    /// Stops following `symbol`, cancels its protective limit and closes
    /// whatever remains at market.
    pub async fn close(&self, symbol: &str) -> String {
        let handle = self.monitors.lock().await.remove(symbol);
        let mut notes = Vec::new();
        let mut limit_order_id = None;

        if let Some(h) = handle {
            h.cancel.cancel();
            match h.join.await {
                Ok(Ok(report)) if report.exit != ExitReason::Cancelled => {
                    return format!("{symbol}: already closed by the follower");
                }
                Ok(Ok(report)) => {
                    limit_order_id = report.position.and_then(|p| p.limit_order_id);
                }
                Ok(Err(e)) => {
                    notes.push(format!("monitor had stopped: {e}"));
                    limit_order_id = match e.open_limit_order() {
                        Some(id) => Some(id.to_string()),
                        None => self.registry.get(symbol).await.and_then(|v| v.limit_order_id),
                    };
                }
                Err(e) => {
                    error!(symbol, "monitor task failed: {}", e);
                    notes.push(format!("monitor task failed: {e}"));
                }
            }
        }
        self.registry.remove(symbol).await;

        if let Some(order_id) = limit_order_id {
            match self.gateway.cancel_order(&order_id, symbol).await {
                Ok(_) => notes.push(format!("limit order {order_id} cancelled")),
                Err(e) => notes.push(format!("limit order {order_id} not cancelled: {e}")),
            }
        }

        let outcome = match self.gateway.close_position(symbol).await {
            Ok(Some(order)) => format!("closed at market (order {})", order.order_id),
            Ok(None) => "no open position".to_string(),
            Err(e) => format!("failed to close: {e}"),
        };
        notes.push(outcome);
        format!("{symbol}: {}", notes.join("; "))
    }

    /// Open positions of the settle coin, annotated with the followed trigger.
    pub async fn show(&self) -> String {
        let list = match self.gateway.list_positions(&self.settle_coin).await {
            Ok(l) => l,
            Err(e) => return format!("failed to list positions: {e}"),
        };

        let views: HashMap<String, PositionView> = self
            .registry
            .all()
            .await
            .into_iter()
            .map(|v| (v.symbol.clone(), v))
            .collect();

        let mut blocks = Vec::new();
        for snapshot in list.iter().filter(|s| !s.is_flat()) {
            let mut line = describe_snapshot(snapshot);
            if let Some(view) = views.get(&snapshot.symbol) {
                line.push_str(&format!(
                    "pnl: {}% | stopLoss: {}% | ",
                    view.pnl_percent, view.stop_loss_trigger
                ));
                if let Some(id) = &view.limit_order_id {
                    line.push_str(&format!("limitOrder: {id} | "));
                }
            }
            blocks.push(line);
        }

        if blocks.is_empty() {
            "There are no open positions".to_string()
        } else {
            blocks.join("\n***\n")
        }
    }

    /// Cancels every monitor and waits for them to exit. Positions stay open.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = self.monitors.lock().await.drain().collect();
        for (symbol, h) in handles {
            match h.join.await {
                Ok(Ok(report)) => info!(%symbol, exit = ?report.exit, "monitor stopped"),
                Ok(Err(e)) => warn!(%symbol, "monitor ended with error: {}", e),
                Err(e) => error!(%symbol, "monitor task failed: {}", e),
            }
        }
    }
}

fn describe_snapshot(s: &PositionSnapshot) -> String {
    let fields = [
        ("symbol", &s.symbol),
        ("side", &s.side),
        ("avgPrice", &s.avg_price),
        ("markPrice", &s.mark_price),
        ("size", &s.size),
        ("positionValue", &s.position_value),
        ("unrealisedPnl", &s.unrealised_pnl),
        ("createdTime", &s.created_time),
        ("updatedTime", &s.updated_time),
    ];
    fields
        .iter()
        .map(|(k, v)| format!("{k}: {v} | "))
        .collect()
}

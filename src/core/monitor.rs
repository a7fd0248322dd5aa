// src/core/monitor.rs
use crate::config::FollowerConfig;
use crate::connectors::messages::PositionFigures;
use crate::connectors::traits::ExchangeGateway;
use crate::core::notifier::Notifier;
use crate::core::registry::SnapshotRegistry;
use crate::error::{GatewayError, MonitorError};
use crate::strategies::ladder::StopLossLadder;
use crate::types::{
    Category, ChannelId, MonitorState, OrderRequest, OrderResult, Position, PositionView,
};
use crate::utils::precision::{normalize_price, percent_of};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Exchange answer to a cancel for an order it no longer knows.
const ORDER_NOT_FOUND: i64 = 110001;
/// Exchange answer to a reused orderLinkId: the earlier attempt landed.
const DUPLICATE_LINK_ID: i64 = 110072;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub stop_out_attempts: u32,
    pub retry_backoff: Duration,
    pub tick_size: Decimal,
    pub category: Category,
}

impl MonitorSettings {
    pub fn from_config(cfg: &FollowerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            stop_out_attempts: cfg.stop_out_attempts.max(1),
            retry_backoff: Duration::from_millis(cfg.retry_backoff_ms),
            tick_size: cfg.tick_size,
            category: cfg.category,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&FollowerConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The exchange reported the position flat.
    ExternallyClosed,
    /// The trigger was hit and the position closed at market.
    StoppedOut,
    /// Monitoring was cancelled; the position may still be open.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub symbol: String,
    pub state: MonitorState,
    pub exit: ExitReason,
    pub position: Option<Position>,
}

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Finished(ExitReason),
}

/// Owns one symbol's position from the first snapshot until it is closed.
pub struct PositionMonitor {
    symbol: String,
    channel: ChannelId,
    gateway: Arc<dyn ExchangeGateway>,
    notifier: Arc<dyn Notifier>,
    ladder: Arc<StopLossLadder>,
    registry: SnapshotRegistry,
    settings: MonitorSettings,
    state: MonitorState,
    position: Option<Position>,
    auth_failures: u32,
}

impl PositionMonitor {
    pub fn new(
        symbol: impl Into<String>,
        channel: ChannelId,
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        ladder: Arc<StopLossLadder>,
        registry: SnapshotRegistry,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            channel,
            gateway,
            notifier,
            ladder,
            registry,
            settings,
            state: MonitorState::Opening,
            position: None,
            auth_failures: 0,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Polls until the position is closed, the monitor fails, or `cancel`
    /// fires. Cancellation is only observed between iterations, so a stop-out
    /// that has started always runs to completion.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<MonitorReport, MonitorError> {
        info!(symbol = %self.symbol, "monitor started");
        let outcome = self.follow(&cancel).await;
        match &outcome {
            Ok(report) => {
                info!(symbol = %self.symbol, exit = ?report.exit, state = %report.state, "monitor finished");
                self.registry.remove(&self.symbol).await;
            }
            Err(MonitorError::StopOutFailed { .. }) => {
                // The view stays visible as StoppingOut until an operator acts.
                error!(symbol = %self.symbol, "monitor aborted during stop-out");
            }
            Err(e) => {
                error!(symbol = %self.symbol, "monitor aborted: {}", e);
                self.registry.remove(&self.symbol).await;
            }
        }
        outcome
    }

    async fn follow(&mut self, cancel: &CancellationToken) -> Result<MonitorReport, MonitorError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(self.report(ExitReason::Cancelled));
            }
            if let Step::Finished(exit) = self.poll_once().await? {
                return Ok(self.report(exit));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(self.report(ExitReason::Cancelled)),
                _ = sleep(self.settings.poll_interval) => {}
            }
        }
    }

    fn report(&self, exit: ExitReason) -> MonitorReport {
        MonitorReport {
            symbol: self.symbol.clone(),
            state: self.state,
            exit,
            position: self.position.clone(),
        }
    }

    /// One iteration of the following loop: fetch, update, then act on the
    /// first matching rule (stop-out, protective limit, ladder).
    pub async fn poll_once(&mut self) -> Result<Step, MonitorError> {
        let snapshot = match self.gateway.get_position(&self.symbol).await {
            Ok(s) => {
                self.auth_failures = 0;
                s
            }
            Err(GatewayError::Validation(reason)) => return Err(self.invalid(reason).await),
            Err(e @ GatewayError::Auth(_)) => {
                self.auth_failures += 1;
                error!(symbol = %self.symbol, failures = self.auth_failures, "poll rejected: {}", e);
                if self.auth_failures == 1 {
                    self.say(format!("{}: exchange rejected credentials: {}", self.symbol, e))
                        .await;
                }
                return Ok(Step::Continue);
            }
            Err(e) => {
                warn!(symbol = %self.symbol, "poll failed, retrying next interval: {}", e);
                return Ok(Step::Continue);
            }
        };

        let figures = match snapshot.figures() {
            Ok(f) => f,
            Err(e) => return Err(self.invalid(e.to_string()).await),
        };

        let Some(figures) = figures else {
            return Ok(self.on_flat().await);
        };

        let pnl_percent = match percent_of(figures.unrealised_pnl, figures.avg_price) {
            Some(p) => p,
            None => {
                return Err(self
                    .invalid(format!("entry price is {}, pnl % undefined", figures.avg_price))
                    .await)
            }
        };

        self.absorb(figures, pnl_percent).await;
        let Some(position) = self.position.as_ref() else {
            return Ok(Step::Continue);
        };
        let (pnl, trigger, limit_open) = (
            position.pnl_percent,
            position.stop_loss_trigger,
            position.limit_order_open,
        );
        debug!(symbol = %self.symbol, %pnl, %trigger, limit_open, "position polled");

        if pnl <= trigger {
            self.stop_out().await?;
            return Ok(Step::Finished(ExitReason::StoppedOut));
        } else if pnl <= self.ladder.limit_threshold() && !limit_open {
            self.place_protective_limit().await;
        } else {
            let next = self.ladder.next(trigger, pnl);
            if next > trigger {
                if let Some(p) = self.position.as_mut() {
                    p.stop_loss_trigger = next;
                }
                info!(symbol = %self.symbol, from = %trigger, to = %next, %pnl, "stop-loss raised");
                self.say(format!(
                    "{}: PnL {}%, stop-loss moved from {}% to {}%",
                    self.symbol, pnl, trigger, next
                ))
                .await;
            }
        }

        self.publish().await;
        Ok(Step::Continue)
    }

    /// Creates the position on the first snapshot, refreshes it afterwards.
    async fn absorb(&mut self, figures: PositionFigures, pnl_percent: Decimal) {
        match self.position.as_mut() {
            Some(p) => {
                p.mark_price = figures.mark_price;
                p.position_value = figures.position_value;
                p.unrealised_pnl = figures.unrealised_pnl;
                p.size = figures.size;
                p.pnl_percent = pnl_percent;
            }
            None => {
                let position = Position {
                    symbol: self.symbol.clone(),
                    side: figures.side,
                    avg_price: figures.avg_price,
                    mark_price: figures.mark_price,
                    size: figures.size,
                    position_value: figures.position_value,
                    unrealised_pnl: figures.unrealised_pnl,
                    created_time: figures.created_time,
                    opened: true,
                    pnl_percent,
                    stop_loss_trigger: self.ladder.initial_trigger(),
                    limit_order_open: false,
                    limit_order_id: None,
                };
                info!(
                    symbol = %self.symbol,
                    side = %position.side,
                    entry = %position.avg_price,
                    size = %position.size,
                    "following position"
                );
                let text = format!(
                    "{}: following {} {} @ {}, stop-loss at {}% PnL",
                    self.symbol, position.side, position.size, position.avg_price, position.stop_loss_trigger
                );
                self.position = Some(position);
                self.state = MonitorState::Following;
                self.say(text).await;
            }
        }
    }

    async fn on_flat(&mut self) -> Step {
        let text = match self.position.as_mut() {
            Some(p) => {
                p.opened = false;
                p.size = Decimal::ZERO;
                format!("{}: position was closed on the exchange, monitoring stopped", self.symbol)
            }
            None => format!("{}: no open position found, nothing to follow", self.symbol),
        };
        self.state = MonitorState::Closed;
        info!(symbol = %self.symbol, "exchange reports position flat");
        self.say(text).await;
        Step::Finished(ExitReason::ExternallyClosed)
    }

    async fn place_protective_limit(&mut self) {
        let Some(p) = self.position.as_ref() else {
            return;
        };
        let price = normalize_price(p.avg_price, self.settings.tick_size);
        let request = OrderRequest::limit(&self.symbol, p.side.opposite(), p.size, price)
            .in_category(self.settings.category);
        let pnl = p.pnl_percent;

        match self.gateway.place_order(request).await {
            Ok(order) => {
                if let Some(p) = self.position.as_mut() {
                    p.limit_order_open = true;
                    p.limit_order_id = Some(order.order_id.clone());
                }
                info!(symbol = %self.symbol, order_id = %order.order_id, %price, "protective limit placed");
                self.say(format!(
                    "{}: PnL dropped to {}%, limit order placed at entry price {} (id {})",
                    self.symbol, pnl, price, order.order_id
                ))
                .await;
            }
            Err(e) => {
                warn!(symbol = %self.symbol, "protective limit rejected: {}", e);
                self.say(format!("{}: failed to place limit order: {}", self.symbol, e))
                    .await;
            }
        }
    }

    /// Cancel-if-open then reduce-only market close. Every step is retried;
    /// exhausting the attempts escalates instead of dropping the stop-out.
    async fn stop_out(&mut self) -> Result<(), MonitorError> {
        self.state = MonitorState::StoppingOut;
        self.publish().await;
        let Some(p) = self.position.clone() else {
            return Ok(());
        };
        warn!(symbol = %self.symbol, pnl = %p.pnl_percent, trigger = %p.stop_loss_trigger, "stop-loss hit");

        if let Some(order_id) = p.limit_order_id.as_deref() {
            self.cancel_with_retries(order_id).await?;
            if let Some(pos) = self.position.as_mut() {
                pos.limit_order_open = false;
                pos.limit_order_id = None;
            }
            self.publish().await;
        }

        let close = OrderRequest::market(&self.symbol, p.side.opposite(), p.size)
            .reduce_only()
            .in_category(self.settings.category);
        let placed = self.close_with_retries(close).await?;

        if let Some(pos) = self.position.as_mut() {
            pos.opened = false;
            pos.size = Decimal::ZERO;
        }
        self.state = MonitorState::Closed;
        let order_note = placed
            .map(|o| format!(" (order {})", o.order_id))
            .unwrap_or_default();
        self.say(format!(
            "{}: stop-loss hit at {}% PnL (trigger {}%), position closed at market{}",
            self.symbol, p.pnl_percent, p.stop_loss_trigger, order_note
        ))
        .await;
        Ok(())
    }

    async fn cancel_with_retries(&mut self, order_id: &str) -> Result<(), MonitorError> {
        let attempts = self.settings.stop_out_attempts;
        for attempt in 1..=attempts {
            match self.gateway.cancel_order(order_id, &self.symbol).await {
                Ok(_) => return Ok(()),
                Err(e) if e.api_code() == Some(ORDER_NOT_FOUND) => {
                    info!(symbol = %self.symbol, order_id, "limit order already gone");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(symbol = %self.symbol, attempt, "cancel failed, retrying: {}", e);
                    sleep(self.settings.retry_backoff * attempt).await;
                }
                Err(e) => return Err(self.escalate("cancel of the limit order", e).await),
            }
        }
        Ok(())
    }

    /// `Ok(None)` when the close cannot be attributed to an order id: an
    /// earlier attempt landed, or the position went flat in between.
    async fn close_with_retries(
        &mut self,
        close: OrderRequest,
    ) -> Result<Option<OrderResult>, MonitorError> {
        let attempts = self.settings.stop_out_attempts;
        for attempt in 1..=attempts {
            match self.gateway.place_order(close.clone()).await {
                Ok(order) => return Ok(Some(order)),
                Err(e) if e.api_code() == Some(DUPLICATE_LINK_ID) => {
                    info!(symbol = %self.symbol, link_id = %close.order_link_id, "close already accepted");
                    return Ok(None);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(symbol = %self.symbol, attempt, "market close failed, retrying: {}", e);
                    if matches!(e, GatewayError::Api { .. }) && self.exchange_reports_flat().await {
                        return Ok(None);
                    }
                    sleep(self.settings.retry_backoff * attempt).await;
                }
                Err(e) => {
                    if matches!(e, GatewayError::Api { .. }) && self.exchange_reports_flat().await {
                        return Ok(None);
                    }
                    return Err(self.escalate("market close", e).await);
                }
            }
        }
        Ok(None)
    }

    async fn exchange_reports_flat(&self) -> bool {
        matches!(self.gateway.get_position(&self.symbol).await, Ok(s) if s.is_flat())
    }

    async fn escalate(&mut self, step: &'static str, source: GatewayError) -> MonitorError {
        error!(symbol = %self.symbol, step, "stop-out failed: {}", source);
        self.say(format!(
            "ESCALATION {}: stop-out failed during {}: {}. The position is NOT protected, close it manually.",
            self.symbol, step, source
        ))
        .await;
        MonitorError::StopOutFailed {
            symbol: self.symbol.clone(),
            step,
            source,
            position: self.position.clone().map(Box::new),
        }
    }

    async fn invalid(&mut self, reason: String) -> MonitorError {
        error!(symbol = %self.symbol, "invalid position data: {}", reason);
        self.say(format!(
            "{}: invalid position data ({}), monitoring stopped without further orders",
            self.symbol, reason
        ))
        .await;
        MonitorError::Validation {
            symbol: self.symbol.clone(),
            reason,
            position: self.position.clone().map(Box::new),
        }
    }

    async fn publish(&self) {
        if let Some(p) = &self.position {
            self.registry.publish(PositionView::of(p, self.state)).await;
        }
    }

    async fn say(&self, text: String) {
        self.notifier.notify(&self.channel, &text).await;
    }
}

// src/strategies/ladder.rs
use crate::config::{LadderConfig, RiseStep};
use crate::error::LadderError;
use rust_decimal::Decimal;

/// Next stop-loss trigger for `current` at `pnl_percent`.
///
/// Steps are scanned from the highest rise threshold down; the first step
/// whose threshold is reached and whose stop lies above `current` wins.
/// Otherwise the trigger is returned unchanged, so it never moves down.
pub fn next_trigger(current: Decimal, pnl_percent: Decimal, steps_desc: &[RiseStep]) -> Decimal {
    steps_desc
        .iter()
        .find(|s| pnl_percent >= s.rise_threshold && s.new_stop_percent > current)
        .map(|s| s.new_stop_percent)
        .unwrap_or(current)
}

/// Trigger ladder a position walks up as it becomes profitable.
#[derive(Debug, Clone, PartialEq)]
pub struct StopLossLadder {
    stopout_percent: Decimal,
    limit_threshold: Decimal,
    // Sorted by rise threshold, highest first.
    steps: Vec<RiseStep>,
}

impl StopLossLadder {
    pub fn new(
        stopout_percent: Decimal,
        limit_threshold: Decimal,
        mut steps: Vec<RiseStep>,
    ) -> Result<Self, LadderError> {
        if stopout_percent >= limit_threshold {
            return Err(LadderError::LimitBelowStopout {
                stopout: stopout_percent,
                limit: limit_threshold,
            });
        }
        if let Some(bad) = steps
            .iter()
            .find(|s| s.new_stop_percent >= s.rise_threshold || s.new_stop_percent <= stopout_percent)
        {
            return Err(LadderError::BadStep {
                rise: bad.rise_threshold,
                stop: bad.new_stop_percent,
            });
        }
        steps.sort_by(|a, b| b.rise_threshold.cmp(&a.rise_threshold));
        Ok(Self {
            stopout_percent,
            limit_threshold,
            steps,
        })
    }

    pub fn from_config(cfg: &LadderConfig) -> Result<Self, LadderError> {
        Self::new(cfg.stopout_percent, cfg.limit_threshold, cfg.rises.clone())
    }

    /// Trigger a freshly opened position starts with.
    pub fn initial_trigger(&self) -> Decimal {
        self.stopout_percent
    }

    pub fn limit_threshold(&self) -> Decimal {
        self.limit_threshold
    }

    pub fn steps(&self) -> &[RiseStep] {
        &self.steps
    }

    pub fn next(&self, current: Decimal, pnl_percent: Decimal) -> Decimal {
        next_trigger(current, pnl_percent, &self.steps)
    }

    /// Human readable rules, used by the help command.
    pub fn describe(&self) -> String {
        let mut lines = vec![
            format!(
                "If the PnL drops to {}%, a limit order closes the position at its entry price.",
                self.limit_threshold
            ),
            format!(
                "If the PnL drops to the stop-loss level (initially {}%), the limit order is cancelled and the position is closed at market.",
                self.stopout_percent
            ),
        ];
        for step in self.steps.iter().rev() {
            lines.push(format!(
                "If the PnL rises to {}%, the stop-loss level moves up to {}%.",
                step.rise_threshold, step.new_stop_percent
            ));
        }
        lines.join("\n")
    }
}

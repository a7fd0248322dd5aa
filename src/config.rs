// src/config.rs

use crate::types::Category;
use anyhow::Context;
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Credentials and endpoint of the exchange account.
#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub secret_key: String,
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ExchangeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct RiseStep {
    pub rise_threshold: Decimal,
    pub new_stop_percent: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LadderConfig {
    #[serde(default = "default_stopout")]
    pub stopout_percent: Decimal,
    #[serde(default = "default_limit_threshold")]
    pub limit_threshold: Decimal,
    #[serde(default = "default_rises")]
    pub rises: Vec<RiseStep>,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            stopout_percent: default_stopout(),
            limit_threshold: default_limit_threshold(),
            rises: default_rises(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FollowerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_order_qty")]
    pub order_qty: Decimal,
    #[serde(default)]
    pub qty_step: Decimal,
    #[serde(default)]
    pub tick_size: Decimal,
    #[serde(default = "default_settle_coin")]
    pub settle_coin: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default = "default_stop_out_attempts")]
    pub stop_out_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            order_qty: default_order_qty(),
            qty_step: Decimal::ZERO,
            tick_size: Decimal::ZERO,
            settle_coin: default_settle_coin(),
            category: Category::Linear,
            stop_out_attempts: default_stop_out_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub ladder: LadderConfig,
    #[serde(default)]
    pub follower: FollowerConfig,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl AppConfig {
    /// Reads `Settings.*` (optional) and `APP_*` environment overrides,
    /// e.g. `APP_EXCHANGE__API_KEY`.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_environment(environment())
    }

    fn from_environment(env: Environment) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("Settings").required(false))
            .add_source(env);

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn load() -> anyhow::Result<Self> {
        let cfg = Self::new().context("failed to read configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        Url::parse(&self.exchange.base_url)
            .with_context(|| format!("invalid exchange.base_url {:?}", self.exchange.base_url))?;
        anyhow::ensure!(
            !self.exchange.api_key.is_empty() && !self.exchange.secret_key.is_empty(),
            "exchange.api_key and exchange.secret_key are required"
        );
        anyhow::ensure!(
            self.follower.order_qty > Decimal::ZERO,
            "follower.order_qty must be positive"
        );
        anyhow::ensure!(
            self.follower.stop_out_attempts > 0,
            "follower.stop_out_attempts must be at least 1"
        );
        crate::strategies::ladder::StopLossLadder::from_config(&self.ladder)
            .context("invalid ladder")?;
        Ok(())
    }
}

/// `APP_` prefix, `__` between nested keys.
fn environment() -> Environment {
    Environment::with_prefix("APP")
        .prefix_separator("_")
        .separator("__")
}

fn default_recv_window() -> u64 {
    5000
}

fn default_base_url() -> String {
    "https://api-testnet.bybit.com".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_stopout() -> Decimal {
    Decimal::from(-8)
}

fn default_limit_threshold() -> Decimal {
    Decimal::from(-5)
}

fn default_rises() -> Vec<RiseStep> {
    vec![
        RiseStep {
            rise_threshold: Decimal::from(5),
            new_stop_percent: Decimal::from(1),
        },
        RiseStep {
            rise_threshold: Decimal::from(10),
            new_stop_percent: Decimal::from(5),
        },
    ]
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_order_qty() -> Decimal {
    Decimal::ONE
}

fn default_settle_coin() -> String {
    "USDT".to_string()
}

fn default_stop_out_attempts() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_ledger_path() -> String {
    "orders.jsonl".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

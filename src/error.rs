// src/error.rs
use crate::types::Position;
use thiserror::Error;

/// Exchange-side failures, classified by how callers should react.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Signature, key or timestamp rejected. Never retried inside one call.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Well-formed response with a non-zero `retCode`.
    #[error("exchange error {code}: {message}")]
    Api { code: i64, message: String },

    /// Network failure, timeout or an unreadable error response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Malformed or contradictory data.
    #[error("invalid data: {0}")]
    Validation(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::Api { .. })
    }

    pub fn api_code(&self) -> Option<i64> {
        match self {
            GatewayError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Transport(e.to_string())
    }
}

/// Reasons a monitor stops without reaching a clean `Closed` state. Both
/// carry the last known position so a caller can still clean up after it.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("{symbol}: invalid position data: {reason}")]
    Validation {
        symbol: String,
        reason: String,
        position: Option<Box<Position>>,
    },

    #[error("{symbol}: stop-out failed during {step}: {source}")]
    StopOutFailed {
        symbol: String,
        step: &'static str,
        #[source]
        source: GatewayError,
        position: Option<Box<Position>>,
    },
}

impl MonitorError {
    pub fn position(&self) -> Option<&Position> {
        match self {
            MonitorError::Validation { position, .. } | MonitorError::StopOutFailed { position, .. } => {
                position.as_deref()
            }
        }
    }

    /// Protective limit still resting on the exchange, if any.
    pub fn open_limit_order(&self) -> Option<&str> {
        self.position()
            .filter(|p| p.limit_order_open)
            .and_then(|p| p.limit_order_id.as_deref())
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum LadderError {
    #[error("stop-out {stopout}% must be below the limit threshold {limit}%")]
    LimitBelowStopout {
        stopout: rust_decimal::Decimal,
        limit: rust_decimal::Decimal,
    },

    #[error("rise step ({rise}%, {stop}%) must lock a stop below its rise and above stop-out")]
    BadStep {
        rise: rust_decimal::Decimal,
        stop: rust_decimal::Decimal,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_and_api_retry() {
        assert!(GatewayError::Transport("timeout".into()).is_retryable());
        assert!(GatewayError::Api { code: 10001, message: "params".into() }.is_retryable());
        assert!(!GatewayError::Auth("sign".into()).is_retryable());
        assert!(!GatewayError::Validation("empty".into()).is_retryable());
    }
}

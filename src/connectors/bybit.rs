// src/connectors/bybit.rs
use crate::config::ExchangeConfig;
use crate::connectors::traits::RestTransport;
use crate::error::GatewayError;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Signature scheme version sent with every request.
const SIGN_TYPE: &str = "2";

/// retCodes meaning the key, signature or timestamp was refused.
const AUTH_RET_CODES: [i64; 5] = [10002, 10003, 10004, 10005, 33004];

/// Hex HMAC-SHA256 over `timestamp ∥ api_key ∥ recv_window ∥ payload`.
pub fn sign_payload(
    secret_key: &str,
    timestamp: &str,
    api_key: &str,
    recv_window: &str,
    payload: &str,
) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|e| GatewayError::Auth(format!("invalid secret key: {e}")))?;
    mac.update(timestamp.as_bytes());
    mac.update(api_key.as_bytes());
    mac.update(recv_window.as_bytes());
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Maps an HTTP status and body to the decoded JSON or a classified error.
pub fn interpret_response(status: StatusCode, body: &str) -> Result<serde_json::Value, GatewayError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(GatewayError::Auth(format!("HTTP {status}: {body}")));
    }

    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) if !status.is_success() => {
            return Err(GatewayError::Transport(format!("HTTP {status}: {body}")));
        }
        Err(e) => {
            return Err(GatewayError::Validation(format!("response is not JSON: {e}")));
        }
    };

    let Some(code) = value.get("retCode").and_then(|c| c.as_i64()) else {
        return Err(if status.is_success() {
            GatewayError::Validation(format!("response without retCode: {body}"))
        } else {
            GatewayError::Transport(format!("HTTP {status}: {body}"))
        });
    };

    if code == 0 {
        return Ok(value);
    }

    let message = value
        .get("retMsg")
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string();

    if AUTH_RET_CODES.contains(&code) {
        Err(GatewayError::Auth(format!("{code}: {message}")))
    } else {
        Err(GatewayError::Api { code, message })
    }
}

/// Stateless signer + HTTP caller. Safe to share between monitor tasks.
pub struct SignedRequestClient {
    api_key: String,
    secret_key: String,
    recv_window: String,
    http_client: Client,
    base_rest_url: String,
}

impl SignedRequestClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self, GatewayError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            recv_window: config.recv_window.to_string(),
            http_client,
            base_rest_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Auth headers for `payload`, stamped with the current time.
    pub fn signed_headers(&self, payload: &str) -> Result<HeaderMap, GatewayError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = sign_payload(
            &self.secret_key,
            &timestamp,
            &self.api_key,
            &self.recv_window,
            payload,
        )?;

        let mut headers = HeaderMap::new();
        headers.insert("X-BAPI-API-KEY", header_value(&self.api_key)?);
        headers.insert("X-BAPI-SIGN", header_value(&signature)?);
        headers.insert("X-BAPI-SIGN-TYPE", HeaderValue::from_static(SIGN_TYPE));
        headers.insert("X-BAPI-TIMESTAMP", header_value(&timestamp)?);
        headers.insert("X-BAPI-RECV-WINDOW", header_value(&self.recv_window)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, GatewayError> {
    HeaderValue::from_str(raw).map_err(|e| GatewayError::Auth(format!("bad header value: {e}")))
}

#[async_trait]
impl RestTransport for SignedRequestClient {
    async fn execute(
        &self,
        endpoint: &str,
        method: Method,
        payload: &str,
    ) -> Result<serde_json::Value, GatewayError> {
        let headers = self.signed_headers(payload)?;

        let request = if method == Method::GET {
            let url = if payload.is_empty() {
                format!("{}{}", self.base_rest_url, endpoint)
            } else {
                format!("{}{}?{}", self.base_rest_url, endpoint, payload)
            };
            self.http_client.get(url)
        } else {
            self.http_client
                .request(method.clone(), format!("{}{}", self.base_rest_url, endpoint))
                .body(payload.to_string())
        };

        debug!(%method, endpoint, payload, "signed request");
        let response = request.headers(headers).send().await?;
        let status = response.status();
        let body = response.text().await?;
        interpret_response(status, &body)
    }
}

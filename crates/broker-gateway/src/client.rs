use async_trait::async_trait;
use core_types::Direction;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::error::BrokerError;
use crate::types::{BrokerPosition, Epic, MarketDetails, OpenPositionResult, PriceQuote, Resolution};

/// Capability set every broker kind exposes, dispatched dynamically by
/// `BrokerGateway` over whichever kind a Credential names. The wire protocol
/// behind each implementation is a thin external collaborator: these structs
/// model the shape of the calls, not a full vendor integration.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn resolve_epic_candidate(&self, symbol: &str, candidate: &str) -> Result<MarketDetails, BrokerError>;
    async fn get_latest_price(&self, epic: &Epic) -> Result<PriceQuote, BrokerError>;
    async fn get_ohlc(
        &self,
        epic: &Epic,
        resolution: Resolution,
        from: chrono::DateTime<chrono::Utc>,
        to: chrono::DateTime<chrono::Utc>,
        count: usize,
    ) -> Result<Vec<crate::types::Candle>, BrokerError>;
    async fn open_position(
        &self,
        epic: &Epic,
        direction: Direction,
        size: Decimal,
        sl: Option<Decimal>,
        tp: Option<Decimal>,
    ) -> Result<OpenPositionResult, BrokerError>;
    async fn close_position(&self, deal_id: &str, direction: Direction, size: Decimal) -> Result<String, BrokerError>;
    async fn list_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;
    async fn market_details(&self, epic: &Epic) -> Result<MarketDetails, BrokerError>;
    fn broker_name(&self) -> &'static str;
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .build()
        .expect("broker http client builds")
}

fn map_status(status: reqwest::StatusCode, body: String) -> BrokerError {
    match status.as_u16() {
        401 => BrokerError::Unauthorized,
        429 => BrokerError::RateLimited,
        _ => BrokerError::Unavailable(format!("status {}: {}", status, body)),
    }
}

macro_rules! thin_broker_client {
    ($name:ident, $label:literal) => {
        pub struct $name {
            http: reqwest::Client,
            base_url: String,
            api_key: String,
        }

        impl $name {
            pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
                Self {
                    http: http_client(Duration::from_secs(30)),
                    base_url: base_url.into(),
                    api_key: api_key.into(),
                }
            }
        }

        #[async_trait]
        impl BrokerClient for $name {
            async fn resolve_epic_candidate(
                &self,
                _symbol: &str,
                candidate: &str,
            ) -> Result<MarketDetails, BrokerError> {
                self.market_details(&candidate.to_string()).await
            }

            async fn get_latest_price(&self, epic: &Epic) -> Result<PriceQuote, BrokerError> {
                let url = format!("{}/prices/{}/latest", self.base_url, epic);
                let resp = self
                    .http
                    .get(&url)
                    .header("X-API-KEY", &self.api_key)
                    .send()
                    .await
                    .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(map_status(status, body));
                }
                resp.json::<PriceQuote>()
                    .await
                    .map_err(|e| BrokerError::Unavailable(e.to_string()))
            }

            async fn get_ohlc(
                &self,
                epic: &Epic,
                resolution: Resolution,
                from: chrono::DateTime<chrono::Utc>,
                to: chrono::DateTime<chrono::Utc>,
                count: usize,
            ) -> Result<Vec<crate::types::Candle>, BrokerError> {
                let url = format!(
                    "{}/prices/{}?resolution={}&from={}&to={}&max={}",
                    self.base_url, epic, resolution.candle_minutes, from, to, count
                );
                let resp = self
                    .http
                    .get(&url)
                    .header("X-API-KEY", &self.api_key)
                    .send()
                    .await
                    .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(map_status(status, body));
                }
                resp.json::<Vec<crate::types::Candle>>()
                    .await
                    .map_err(|e| BrokerError::Unavailable(e.to_string()))
            }

            async fn open_position(
                &self,
                epic: &Epic,
                direction: Direction,
                size: Decimal,
                sl: Option<Decimal>,
                tp: Option<Decimal>,
            ) -> Result<OpenPositionResult, BrokerError> {
                let url = format!("{}/positions", self.base_url);
                let body = serde_json::json!({
                    "epic": epic,
                    "direction": if matches!(direction, Direction::Buy) { "BUY" } else { "SELL" },
                    "size": size,
                    "stopLevel": sl,
                    "limitLevel": tp,
                });
                let resp = self
                    .http
                    .post(&url)
                    .header("X-API-KEY", &self.api_key)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    return Err(map_status(status, text));
                }
                resp.json::<OpenPositionResult>()
                    .await
                    .map_err(|e| BrokerError::Unavailable(e.to_string()))
            }

            async fn close_position(
                &self,
                deal_id: &str,
                direction: Direction,
                size: Decimal,
            ) -> Result<String, BrokerError> {
                let url = format!("{}/positions/{}", self.base_url, deal_id);
                let body = serde_json::json!({
                    "direction": if matches!(direction, Direction::Buy) { "SELL" } else { "BUY" },
                    "size": size,
                });
                let resp = self
                    .http
                    .delete(&url)
                    .header("X-API-KEY", &self.api_key)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    return Err(map_status(status, text));
                }
                Ok("closed".to_string())
            }

            async fn list_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
                let url = format!("{}/positions", self.base_url);
                let resp = self
                    .http
                    .get(&url)
                    .header("X-API-KEY", &self.api_key)
                    .send()
                    .await
                    .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    return Err(map_status(status, text));
                }
                resp.json::<Vec<BrokerPosition>>()
                    .await
                    .map_err(|e| BrokerError::Unavailable(e.to_string()))
            }

            async fn market_details(&self, epic: &Epic) -> Result<MarketDetails, BrokerError> {
                let url = format!("{}/markets/{}", self.base_url, epic);
                let resp = self
                    .http
                    .get(&url)
                    .header("X-API-KEY", &self.api_key)
                    .send()
                    .await
                    .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    return Err(map_status(status, text));
                }
                resp.json::<MarketDetails>()
                    .await
                    .map_err(|e| BrokerError::Unavailable(e.to_string()))
            }

            fn broker_name(&self) -> &'static str {
                $label
            }
        }
    };
}

thin_broker_client!(CapitalClient, "capital");
thin_broker_client!(BinanceClient, "binance");
thin_broker_client!(CoinbaseClient, "coinbase");
thin_broker_client!(CustomClient, "custom");

use std::sync::Arc;
use std::time::Duration;

use core_types::Direction;
use rust_decimal::Decimal;

use crate::client::BrokerClient;
use crate::epic::EpicResolver;
use crate::error::BrokerError;
use crate::retry::{with_deadline, with_retry};
use crate::types::{BrokerPosition, Candle, Epic, MarketDetails, OpenPositionResult, PriceQuote, Resolution};

const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);
const PRICE_DEADLINE: Duration = Duration::from_secs(30);

/// Per-credential façade over a `BrokerClient`: owns the epic cache, applies
/// the retry/backoff policy, and enforces per-call deadlines. One instance
/// is created per credential at load time (§9: no process-wide singletons).
pub struct BrokerGateway {
    client: Arc<dyn BrokerClient>,
    epics: EpicResolver,
}

impl BrokerGateway {
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self {
            client,
            epics: EpicResolver::new(),
        }
    }

    /// §9 open question: live credential probing is unspecified; the source
    /// treats this as always-true, so this stub matches that pending a real
    /// live-probe implementation.
    pub async fn verify_credentials(&self) -> Result<bool, BrokerError> {
        Ok(true)
    }

    pub async fn resolve_epic(&self, symbol: &str) -> Result<Epic, BrokerError> {
        let (epic, _cached) = self
            .epics
            .resolve(self.client.as_ref(), symbol, chrono::Utc::now())
            .await?;
        Ok(epic)
    }

    pub async fn get_latest_price(&self, epic: &Epic) -> Result<PriceQuote, BrokerError> {
        let client = self.client.clone();
        let epic = epic.clone();
        with_deadline(
            PRICE_DEADLINE,
            with_retry(move || {
                let client = client.clone();
                let epic = epic.clone();
                async move { client.get_latest_price(&epic).await }
            }),
        )
        .await
    }

    pub async fn get_ohlc(
        &self,
        epic: &Epic,
        resolution: Resolution,
        from: chrono::DateTime<chrono::Utc>,
        to: chrono::DateTime<chrono::Utc>,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        let client = self.client.clone();
        let epic = epic.clone();
        with_deadline(
            DEFAULT_DEADLINE,
            with_retry(move || {
                let client = client.clone();
                let epic = epic.clone();
                async move { client.get_ohlc(&epic, resolution, from, to, count).await }
            }),
        )
        .await
    }

    pub async fn open_position(
        &self,
        epic: &Epic,
        direction: Direction,
        size: Decimal,
        sl: Option<Decimal>,
        tp: Option<Decimal>,
    ) -> Result<OpenPositionResult, BrokerError> {
        let client = self.client.clone();
        let epic = epic.clone();
        with_deadline(
            DEFAULT_DEADLINE,
            with_retry(move || {
                let client = client.clone();
                let epic = epic.clone();
                async move { client.open_position(&epic, direction, size, sl, tp).await }
            }),
        )
        .await
    }

    pub async fn close_position(&self, deal_id: &str, direction: Direction, size: Decimal) -> Result<String, BrokerError> {
        let client = self.client.clone();
        let deal_id = deal_id.to_string();
        with_deadline(
            DEFAULT_DEADLINE,
            with_retry(move || {
                let client = client.clone();
                let deal_id = deal_id.clone();
                async move { client.close_position(&deal_id, direction, size).await }
            }),
        )
        .await
    }

    pub async fn list_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let client = self.client.clone();
        with_deadline(
            DEFAULT_DEADLINE,
            with_retry(move || {
                let client = client.clone();
                async move { client.list_positions().await }
            }),
        )
        .await
    }

    pub async fn market_details(&self, epic: &Epic) -> Result<MarketDetails, BrokerError> {
        let client = self.client.clone();
        let epic = epic.clone();
        with_deadline(
            DEFAULT_DEADLINE,
            with_retry(move || {
                let client = client.clone();
                let epic = epic.clone();
                async move { client.market_details(&epic).await }
            }),
        )
        .await
    }

    pub fn symbol_for_epic(&self, epic: &str) -> Option<String> {
        self.epics.symbol_for_epic(epic)
    }
}

/// Builds the concrete client for a Credential's broker kind (§9: dynamic
/// dispatch over broker kinds maps to a small capability set, each kind a
/// tagged variant chosen at Credential load time).
pub fn build_client(
    kind: core_types::BrokerKind,
    base_url: &str,
    api_key: &str,
) -> Result<Arc<dyn BrokerClient>, BrokerError> {
    use crate::client::{BinanceClient, CapitalClient, CoinbaseClient, CustomClient};
    use core_types::BrokerKind;

    Ok(match kind {
        BrokerKind::Capital => Arc::new(CapitalClient::new(base_url, api_key)),
        BrokerKind::Binance => Arc::new(BinanceClient::new(base_url, api_key)),
        BrokerKind::Coinbase => Arc::new(CoinbaseClient::new(base_url, api_key)),
        BrokerKind::Custom => Arc::new(CustomClient::new(base_url, api_key)),
    })
}

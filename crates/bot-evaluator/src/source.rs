use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use broker_gateway::{BrokerGateway, Candle, PriceQuote, Resolution};
use chrono::Utc;
use core_types::Timeframe;
use market_data_cache::{MarketDataError, MarketDataSource};
use rate_coordinator::RateCoordinator;
use tokio::time::Instant;
use uuid::Uuid;

const ADMISSION_PRIORITY: u8 = 50;
const ADMISSION_DEADLINE: Duration = Duration::from_secs(30);

/// What L3 fetches through on a miss in production: resolves the epic, takes
/// an L2 lease for the credential, then calls the broker gateway. The lease
/// is held only for the duration of the one call it guards.
pub struct BrokerMarketDataSource {
    gateway: Arc<BrokerGateway>,
    rate_coordinator: Arc<RateCoordinator>,
    credential_id: Uuid,
    max_concurrent: u32,
}

impl BrokerMarketDataSource {
    pub fn new(gateway: Arc<BrokerGateway>, rate_coordinator: Arc<RateCoordinator>, credential_id: Uuid, max_concurrent: u32) -> Self {
        Self {
            gateway,
            rate_coordinator,
            credential_id,
            max_concurrent,
        }
    }
}

#[async_trait]
impl MarketDataSource for BrokerMarketDataSource {
    async fn fetch_price(&self, symbol: &str) -> Result<PriceQuote, MarketDataError> {
        let epic = self
            .gateway
            .resolve_epic(symbol)
            .await
            .map_err(|e| MarketDataError::Unavailable(e.to_string()))?;

        let _lease = self
            .rate_coordinator
            .acquire(self.credential_id, self.max_concurrent, ADMISSION_PRIORITY, Instant::now() + ADMISSION_DEADLINE)
            .await
            .map_err(|e| MarketDataError::Unavailable(e.to_string()))?;

        self.gateway.get_latest_price(&epic).await.map_err(|e| MarketDataError::Unavailable(e.to_string()))
    }

    async fn fetch_ohlc(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, MarketDataError> {
        let epic = self
            .gateway
            .resolve_epic(symbol)
            .await
            .map_err(|e| MarketDataError::Unavailable(e.to_string()))?;

        let _lease = self
            .rate_coordinator
            .acquire(self.credential_id, self.max_concurrent, ADMISSION_PRIORITY, Instant::now() + ADMISSION_DEADLINE)
            .await
            .map_err(|e| MarketDataError::Unavailable(e.to_string()))?;

        let resolution = Resolution {
            candle_minutes: timeframe.to_minutes(),
        };
        let to = Utc::now();
        let from = to - chrono::Duration::minutes(timeframe.to_minutes() * limit as i64);

        self.gateway
            .get_ohlc(&epic, resolution, from, to, limit)
            .await
            .map_err(|e| MarketDataError::Unavailable(e.to_string()))
    }
}

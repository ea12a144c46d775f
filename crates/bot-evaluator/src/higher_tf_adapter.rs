use std::sync::Arc;

use async_trait::async_trait;
use broker_gateway::Candle;
use core_types::Timeframe;
use market_data_cache::MarketDataCache;
use multi_timeframe::HigherTimeframeSource;

use crate::source::BrokerMarketDataSource;

/// Bridges L3's cache onto L6's fetch trait. Neither type is local to this
/// crate, so a wrapper is the only way around the orphan rule; it exists
/// purely to satisfy that coherence requirement and adds no behaviour beyond
/// delegating and dropping the `degraded` flag (L6 is already best-effort).
pub struct CacheHigherTimeframeAdapter {
    cache: Arc<MarketDataCache<BrokerMarketDataSource>>,
}

impl CacheHigherTimeframeAdapter {
    pub fn new(cache: Arc<MarketDataCache<BrokerMarketDataSource>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl HigherTimeframeSource for CacheHigherTimeframeAdapter {
    async fn fetch_ohlc(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, String> {
        self.cache
            .get_ohlc(symbol, timeframe, limit)
            .await
            .map(|fetched| fetched.value)
            .map_err(|e| e.to_string())
    }
}

use async_trait::async_trait;
use broker_gateway::{Candle, PriceQuote};
use core_types::Timeframe;

use crate::error::MarketDataError;

/// What the cache fetches through on a miss — L1 (broker gateway) gated by
/// L2 (rate coordinator) in production, a canned source in tests.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_price(&self, symbol: &str) -> Result<PriceQuote, MarketDataError>;
    async fn fetch_ohlc(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, MarketDataError>;
}

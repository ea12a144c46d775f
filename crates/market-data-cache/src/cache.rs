use std::sync::Arc;
use std::time::{Duration, Instant};

use broker_gateway::Candle;
use core_types::Timeframe;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::MarketDataError;
use crate::source::MarketDataSource;

const PRICE_FRESHNESS: Duration = Duration::from_secs(10);
const OHLC_FRESHNESS: Duration = Duration::from_secs(60);

struct CachedPrice {
    quote: broker_gateway::PriceQuote,
    fetched_at: Instant,
}

struct CachedOhlc {
    candles: Vec<Candle>,
    fetched_at: Instant,
}

/// Result of a cache lookup that degraded to a stale value because the
/// upstream fetch failed. The caller is allowed to proceed but should treat
/// this as lowering confidence, never as a hard failure.
pub struct Fetched<T> {
    pub value: T,
    pub degraded: bool,
}

/// Two-level cache over live prices (10s freshness) and OHLC series (60s
/// freshness, keyed by symbol/timeframe/limit), with single-flight collapsing
/// of concurrent misses onto one upstream call per key.
pub struct MarketDataCache<S: MarketDataSource> {
    source: S,
    prices: DashMap<String, CachedPrice>,
    ohlc: DashMap<(String, Timeframe, usize), CachedOhlc>,
    price_locks: DashMap<String, Arc<Mutex<()>>>,
    ohlc_locks: DashMap<(String, Timeframe, usize), Arc<Mutex<()>>>,
}

impl<S: MarketDataSource> MarketDataCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            prices: DashMap::new(),
            ohlc: DashMap::new(),
            price_locks: DashMap::new(),
            ohlc_locks: DashMap::new(),
        }
    }

    pub async fn get_price(&self, symbol: &str) -> Result<Fetched<broker_gateway::PriceQuote>, MarketDataError> {
        if let Some(entry) = self.prices.get(symbol) {
            if entry.fetched_at.elapsed() < PRICE_FRESHNESS {
                return Ok(Fetched {
                    value: entry.quote.clone(),
                    degraded: false,
                });
            }
        }

        let lock = self
            .price_locks
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Re-check: a concurrent winner may have refreshed it while we waited.
        if let Some(entry) = self.prices.get(symbol) {
            if entry.fetched_at.elapsed() < PRICE_FRESHNESS {
                return Ok(Fetched {
                    value: entry.quote.clone(),
                    degraded: false,
                });
            }
        }

        match self.source.fetch_price(symbol).await {
            Ok(quote) => {
                self.prices.insert(
                    symbol.to_string(),
                    CachedPrice {
                        quote: quote.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Ok(Fetched {
                    value: quote,
                    degraded: false,
                })
            }
            Err(e) => match self.prices.get(symbol) {
                Some(stale) => {
                    tracing::warn!(symbol, "price fetch failed, serving stale value: {}", e);
                    Ok(Fetched {
                        value: stale.quote.clone(),
                        degraded: true,
                    })
                }
                None => Err(e),
            },
        }
    }

    pub async fn get_ohlc(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Fetched<Vec<Candle>>, MarketDataError> {
        let key = (symbol.to_string(), timeframe, limit);

        if let Some(entry) = self.ohlc.get(&key) {
            if entry.fetched_at.elapsed() < OHLC_FRESHNESS {
                return Ok(Fetched {
                    value: entry.candles.clone(),
                    degraded: false,
                });
            }
        }

        let lock = self
            .ohlc_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(entry) = self.ohlc.get(&key) {
            if entry.fetched_at.elapsed() < OHLC_FRESHNESS {
                return Ok(Fetched {
                    value: entry.candles.clone(),
                    degraded: false,
                });
            }
        }

        match self.source.fetch_ohlc(symbol, timeframe, limit).await {
            Ok(candles) => {
                self.ohlc.insert(
                    key,
                    CachedOhlc {
                        candles: candles.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Ok(Fetched {
                    value: candles,
                    degraded: false,
                })
            }
            Err(e) => match self.ohlc.get(&key) {
                Some(stale) => {
                    tracing::warn!(symbol, "ohlc fetch failed, serving stale value: {}", e);
                    Ok(Fetched {
                        value: stale.candles.clone(),
                        degraded: true,
                    })
                }
                None => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSource {
        calls: AtomicU32,
        fail_after: Option<u32>,
    }

    #[async_trait]
    impl MarketDataSource for CountingSource {
        async fn fetch_price(&self, _symbol: &str) -> Result<broker_gateway::PriceQuote, MarketDataError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = self.fail_after {
                if n >= limit {
                    return Err(MarketDataError::Unavailable("upstream down".into()));
                }
            }
            Ok(broker_gateway::PriceQuote {
                bid: Decimal::from(100),
                ask: Decimal::from(101),
                ts: Utc::now(),
            })
        }

        async fn fetch_ohlc(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            _limit: usize,
        ) -> Result<Vec<Candle>, MarketDataError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn fresh_price_is_served_from_cache() {
        let cache = MarketDataCache::new(CountingSource {
            calls: AtomicU32::new(0),
            fail_after: None,
        });
        cache.get_price("EURUSD").await.unwrap();
        cache.get_price("EURUSD").await.unwrap();
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_value_served_degraded_on_fetch_failure() {
        let cache = MarketDataCache::new(CountingSource {
            calls: AtomicU32::new(0),
            fail_after: Some(1),
        });
        let first = cache.get_price("EURUSD").await.unwrap();
        assert!(!first.degraded);

        cache.prices.alter(&"EURUSD".to_string(), |_, mut v| {
            v.fetched_at = Instant::now() - Duration::from_secs(999);
            v
        });

        let second = cache.get_price("EURUSD").await.unwrap();
        assert!(second.degraded);
    }
}

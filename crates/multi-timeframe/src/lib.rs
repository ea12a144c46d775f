use async_trait::async_trait;
use broker_gateway::Candle;
use core_types::Timeframe;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Static table mapping a bot's primary timeframe to the higher timeframe its
/// context is drawn from, biased towards very short lookbacks so the fetch
/// stays cheap against a broker's narrow history window.
pub fn higher_timeframe_for(primary: Timeframe) -> Timeframe {
    match primary {
        Timeframe::M1 => Timeframe::M5,
        Timeframe::M5 => Timeframe::M15,
        Timeframe::M15 => Timeframe::M30,
        Timeframe::M30 => Timeframe::H1,
        Timeframe::H1 => Timeframe::H4,
        Timeframe::H4 => Timeframe::D1,
        Timeframe::D1 => Timeframe::D1,
    }
}

/// Thin collaborator the analyser fetches minimal OHLC through; the bot
/// evaluator wires this to the market-data cache (L3).
#[async_trait]
pub trait HigherTimeframeSource: Send + Sync {
    async fn fetch_ohlc(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Momentum {
    Strong,
    Weak,
    Neutral,
}

#[derive(Debug, Clone)]
pub struct HigherTimeframeContext {
    pub timeframe: Timeframe,
    pub trend: Trend,
    pub momentum: Momentum,
    pub support: Option<Decimal>,
    pub resistance: Option<Decimal>,
    pub confidence: f64,
}

impl HigherTimeframeContext {
    /// The context returned on any fetch or computation failure. Never blocks
    /// the evaluation — a neutral read is always a valid answer.
    pub fn neutral(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            trend: Trend::Neutral,
            momentum: Momentum::Neutral,
            support: None,
            resistance: None,
            confidence: 30.0,
        }
    }
}

const MIN_CANDLES: usize = 4;
const LOOKBACK_CANDLES: usize = 20;

fn sma(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period || period == 0 {
        return None;
    }
    let window = &candles[candles.len() - period..];
    let sum: f64 = window.iter().filter_map(|c| c.close.to_f64()).sum();
    Some(sum / period as f64)
}

/// Best-effort higher-timeframe read: maps the bot's timeframe up one step,
/// fetches a small amount of OHLC, and computes adaptive-period SMAs to tag
/// trend/momentum. Any error — fetch failure, too little data — collapses to
/// a neutral context rather than propagating, since this summary only biases
/// the primary decision and must never block it.
pub async fn analyze(source: &dyn HigherTimeframeSource, symbol: &str, primary_timeframe: Timeframe) -> HigherTimeframeContext {
    let higher = higher_timeframe_for(primary_timeframe);

    let candles = match source.fetch_ohlc(symbol, higher, LOOKBACK_CANDLES).await {
        Ok(c) if c.len() >= MIN_CANDLES => c,
        Ok(_) => {
            tracing::debug!(symbol, ?higher, "too few candles for higher-timeframe context");
            return HigherTimeframeContext::neutral(higher);
        }
        Err(e) => {
            tracing::warn!(symbol, ?higher, "higher-timeframe fetch failed: {}", e);
            return HigherTimeframeContext::neutral(higher);
        }
    };

    let short_period = (candles.len() / 3).clamp(2, 10);
    let long_period = candles.len().clamp(short_period + 1, 20);

    let (short, long) = match (sma(&candles, short_period), sma(&candles, long_period)) {
        (Some(s), Some(l)) => (s, l),
        _ => return HigherTimeframeContext::neutral(higher),
    };

    let spread_pct = if long != 0.0 { ((short - long) / long).abs() * 100.0 } else { 0.0 };

    let trend = if short > long * 1.001 {
        Trend::Bullish
    } else if short < long * 0.999 {
        Trend::Bearish
    } else {
        Trend::Neutral
    };

    let momentum = if spread_pct > 0.5 {
        Momentum::Strong
    } else if spread_pct > 0.1 {
        Momentum::Weak
    } else {
        Momentum::Neutral
    };

    let support = candles.iter().map(|c| c.low).min();
    let resistance = candles.iter().map(|c| c.high).max();

    // Confidence scales with trend/momentum agreement, clamped to the 30-70 band.
    let confidence = match (trend, momentum) {
        (Trend::Neutral, _) => 40.0,
        (_, Momentum::Strong) => 70.0,
        (_, Momentum::Weak) => 55.0,
        (_, Momentum::Neutral) => 30.0,
    };

    HigherTimeframeContext {
        timeframe: higher,
        trend,
        momentum,
        support,
        resistance,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(close: i64) -> Candle {
        Candle {
            ts: Utc::now(),
            open: Decimal::from(close),
            high: Decimal::from(close + 1),
            low: Decimal::from(close - 1),
            close: Decimal::from(close),
            volume: Decimal::from(1000),
        }
    }

    struct FixedSource(Vec<Candle>);

    #[async_trait]
    impl HigherTimeframeSource for FixedSource {
        async fn fetch_ohlc(&self, _symbol: &str, _timeframe: Timeframe, _limit: usize) -> Result<Vec<Candle>, String> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl HigherTimeframeSource for FailingSource {
        async fn fetch_ohlc(&self, _symbol: &str, _timeframe: Timeframe, _limit: usize) -> Result<Vec<Candle>, String> {
            Err("unavailable".into())
        }
    }

    #[test]
    fn higher_timeframe_table_steps_up() {
        assert_eq!(higher_timeframe_for(Timeframe::M5), Timeframe::M15);
        assert_eq!(higher_timeframe_for(Timeframe::H1), Timeframe::H4);
        assert_eq!(higher_timeframe_for(Timeframe::D1), Timeframe::D1);
    }

    #[tokio::test]
    async fn fetch_failure_returns_neutral_context() {
        let ctx = analyze(&FailingSource, "EURUSD", Timeframe::M15).await;
        assert_eq!(ctx.trend, Trend::Neutral);
        assert_eq!(ctx.confidence, 30.0);
    }

    #[tokio::test]
    async fn uptrend_candles_tag_bullish() {
        let candles: Vec<Candle> = (1..=20).map(|i| candle(100 + i)).collect();
        let ctx = analyze(&FixedSource(candles), "EURUSD", Timeframe::M15).await;
        assert_eq!(ctx.trend, Trend::Bullish);
        assert!(ctx.confidence >= 30.0 && ctx.confidence <= 70.0);
    }
}

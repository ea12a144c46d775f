use chrono::{DateTime, Utc};
use core_types::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The broker's internal instrument id, distinct from the user-facing symbol.
pub type Epic = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDetails {
    pub epic: Epic,
    pub tradeable: bool,
    pub min_deal_size: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPositionResult {
    pub deal_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub deal_id: String,
    pub epic: Epic,
    pub symbol: String,
    pub direction: Direction,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Resolution {
    pub candle_minutes: i64,
}

use chrono::{DateTime, Utc};
use core_types::{BrokerKind, Decision, Direction, Timeframe, TradeStatus};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::PersistenceError;

/// Every value crossing the `sqlx::Any` boundary is stored as text — `Any`
/// has to work across sqlite and postgres alike, and the two disagree on
/// native decimal/uuid/timestamp column types, so persistence keeps the
/// column shapes as plain, backend-neutral strings and does the conversion
/// here instead.
pub fn decimal_to_text(d: Decimal) -> String {
    d.to_string()
}

pub fn text_to_decimal(s: &str) -> Result<Decimal, PersistenceError> {
    Decimal::from_str(s).map_err(|e| PersistenceError::Decode(format!("bad decimal {s:?}: {e}")))
}

pub fn opt_decimal_to_text(d: Option<Decimal>) -> Option<String> {
    d.map(decimal_to_text)
}

pub fn text_to_opt_decimal(s: Option<String>) -> Result<Option<Decimal>, PersistenceError> {
    s.map(|s| text_to_decimal(&s)).transpose()
}

pub fn datetime_to_text(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub fn text_to_datetime(s: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Decode(format!("bad timestamp {s:?}: {e}")))
}

pub fn opt_datetime_to_text(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(datetime_to_text)
}

pub fn text_to_opt_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, PersistenceError> {
    s.map(|s| text_to_datetime(&s)).transpose()
}

pub fn direction_to_text(d: Direction) -> &'static str {
    match d {
        Direction::Buy => "BUY",
        Direction::Sell => "SELL",
    }
}

pub fn text_to_direction(s: &str) -> Result<Direction, PersistenceError> {
    match s {
        "BUY" => Ok(Direction::Buy),
        "SELL" => Ok(Direction::Sell),
        other => Err(PersistenceError::Decode(format!("unknown direction {other:?}"))),
    }
}

pub fn status_to_text(s: TradeStatus) -> &'static str {
    match s {
        TradeStatus::Pending => "PENDING",
        TradeStatus::Open => "OPEN",
        TradeStatus::Closed => "CLOSED",
        TradeStatus::Cancelled => "CANCELLED",
    }
}

pub fn text_to_status(s: &str) -> Result<TradeStatus, PersistenceError> {
    match s {
        "PENDING" => Ok(TradeStatus::Pending),
        "OPEN" => Ok(TradeStatus::Open),
        "CLOSED" => Ok(TradeStatus::Closed),
        "CANCELLED" => Ok(TradeStatus::Cancelled),
        other => Err(PersistenceError::Decode(format!("unknown trade status {other:?}"))),
    }
}

pub fn decision_to_text(d: Decision) -> &'static str {
    match d {
        Decision::Hold => "HOLD",
        Decision::ExecuteTrade => "EXECUTE_TRADE",
        Decision::Abort => "ABORT",
    }
}

pub fn text_to_decision(s: &str) -> Result<Decision, PersistenceError> {
    match s {
        "HOLD" => Ok(Decision::Hold),
        "EXECUTE_TRADE" => Ok(Decision::ExecuteTrade),
        "ABORT" => Ok(Decision::Abort),
        other => Err(PersistenceError::Decode(format!("unknown decision {other:?}"))),
    }
}

pub fn timeframe_to_text(t: Timeframe) -> &'static str {
    match t {
        Timeframe::M1 => "M1",
        Timeframe::M5 => "M5",
        Timeframe::M15 => "M15",
        Timeframe::M30 => "M30",
        Timeframe::H1 => "H1",
        Timeframe::H4 => "H4",
        Timeframe::D1 => "D1",
    }
}

pub fn text_to_timeframe(s: &str) -> Result<Timeframe, PersistenceError> {
    Timeframe::parse(s).ok_or_else(|| PersistenceError::Decode(format!("unknown timeframe {s:?}")))
}

pub fn broker_kind_to_text(k: BrokerKind) -> &'static str {
    match k {
        BrokerKind::Capital => "capital",
        BrokerKind::Binance => "binance",
        BrokerKind::Coinbase => "coinbase",
        BrokerKind::Custom => "custom",
    }
}

pub fn text_to_broker_kind(s: &str) -> Result<BrokerKind, PersistenceError> {
    match s {
        "capital" => Ok(BrokerKind::Capital),
        "binance" => Ok(BrokerKind::Binance),
        "coinbase" => Ok(BrokerKind::Coinbase),
        "custom" => Ok(BrokerKind::Custom),
        other => Err(PersistenceError::Decode(format!("unknown broker kind {other:?}"))),
    }
}

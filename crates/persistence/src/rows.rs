use chrono::{DateTime, Utc};
use core_types::{
    AssetClass, Bot, Credential, Evaluation, OwnershipProvenance, PositionOwnership, Strategy, Timeframe, Trade,
};
use uuid::Uuid;

use crate::codec::*;
use crate::error::PersistenceError;

fn parse_uuid(s: &str) -> Result<Uuid, PersistenceError> {
    Uuid::parse_str(s).map_err(|e| PersistenceError::Decode(format!("bad uuid {s:?}: {e}")))
}

fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>, PersistenceError> {
    s.map(|s| parse_uuid(&s)).transpose()
}

fn asset_class_to_text(a: AssetClass) -> &'static str {
    match a {
        AssetClass::Crypto => "crypto",
        AssetClass::Forex => "forex",
        AssetClass::IndexStockOrCommodity => "index_stock_or_commodity",
    }
}

fn text_to_asset_class(s: &str) -> Result<AssetClass, PersistenceError> {
    match s {
        "crypto" => Ok(AssetClass::Crypto),
        "forex" => Ok(AssetClass::Forex),
        "index_stock_or_commodity" => Ok(AssetClass::IndexStockOrCommodity),
        other => Err(PersistenceError::Decode(format!("unknown asset class {other:?}"))),
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct CredentialRow {
    pub id: String,
    pub user_id: String,
    pub broker_kind: String,
    pub max_concurrent: i64,
    pub is_live: i64,
    pub base_url: String,
    pub ciphertext: String,
    pub created_at: String,
}

impl CredentialRow {
    pub fn into_domain(self) -> Result<Credential, PersistenceError> {
        Ok(Credential {
            id: parse_uuid(&self.id)?,
            user_id: parse_uuid(&self.user_id)?,
            broker_kind: text_to_broker_kind(&self.broker_kind)?,
            max_concurrent: self.max_concurrent as u32,
            is_live: self.is_live != 0,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct StrategyRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description_text: String,
    pub timeframes: String,
    pub indicators: String,
    pub entry_conditions: String,
    pub exit_conditions: String,
    pub risk_controls: String,
    pub min_risk_per_trade: f64,
    pub max_risk_per_trade: f64,
    pub confidence_threshold: f64,
    pub parsed_rules: String,
    pub parser_version: i64,
}

impl StrategyRow {
    pub fn into_domain(self) -> Result<Strategy, PersistenceError> {
        let timeframes = serde_json::from_str::<Vec<String>>(&self.timeframes)
            .map_err(|e| PersistenceError::Decode(format!("bad timeframes json: {e}")))?
            .iter()
            .map(|s| text_to_timeframe(s))
            .collect::<Result<Vec<Timeframe>, _>>()?;
        let indicators = decode_string_list(&self.indicators)?;
        let entry_conditions = decode_string_list(&self.entry_conditions)?;
        let exit_conditions = decode_string_list(&self.exit_conditions)?;
        let risk_controls = serde_json::from_str(&self.risk_controls)
            .map_err(|e| PersistenceError::Decode(format!("bad risk_controls json: {e}")))?;

        Ok(Strategy {
            id: parse_uuid(&self.id)?,
            user_id: parse_uuid(&self.user_id)?,
            name: self.name,
            description_text: self.description_text,
            timeframes,
            indicators,
            entry_conditions,
            exit_conditions,
            risk_controls,
            min_risk_per_trade: self.min_risk_per_trade,
            max_risk_per_trade: self.max_risk_per_trade,
            confidence_threshold: self.confidence_threshold,
        })
    }
}

fn decode_string_list(s: &str) -> Result<Vec<String>, PersistenceError> {
    serde_json::from_str(s).map_err(|e| PersistenceError::Decode(format!("bad string list json: {e}")))
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct BotRow {
    pub id: String,
    pub user_id: String,
    pub credential_id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub asset_class: Option<String>,
    pub timeframe: String,
    pub is_active: i64,
    pub ai_enabled: i64,
    pub max_open_trades: i64,
    pub min_interval_between_trades_seconds: i64,
    pub last_eval_at: Option<String>,
    pub last_trade_at: Option<String>,
}

impl BotRow {
    pub fn into_domain(self) -> Result<Bot, PersistenceError> {
        Ok(Bot {
            id: parse_uuid(&self.id)?,
            user_id: parse_uuid(&self.user_id)?,
            credential_id: parse_uuid(&self.credential_id)?,
            strategy_id: parse_uuid(&self.strategy_id)?,
            symbol: self.symbol,
            timeframe: text_to_timeframe(&self.timeframe)?,
            is_active: self.is_active != 0,
            ai_enabled: self.ai_enabled != 0,
            max_open_trades: self.max_open_trades as u32,
            min_interval_between_trades: chrono::Duration::seconds(self.min_interval_between_trades_seconds),
            last_eval_at: text_to_opt_datetime(self.last_eval_at)?,
            last_trade_at: text_to_opt_datetime(self.last_trade_at)?,
        })
    }

    /// Resolved asset class: the stored column when present, else the
    /// symbol-pattern fallback the bot evaluator already falls back to.
    pub fn resolved_asset_class(&self) -> Result<AssetClass, PersistenceError> {
        match &self.asset_class {
            Some(s) => text_to_asset_class(s),
            None => Ok(bot_evaluator::market_class::classify_asset(&self.symbol)),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct TradeRow {
    pub id: String,
    pub bot_id: String,
    pub credential_id: String,
    pub symbol: String,
    pub direction: String,
    pub quantity: String,
    pub entry_price: String,
    pub stop_loss: Option<String>,
    pub take_profit: Option<String>,
    pub current_price: Option<String>,
    pub status: String,
    pub opened_at: Option<String>,
    pub closed_at: Option<String>,
    pub broker_deal_id: Option<String>,
    pub profit_loss: Option<String>,
    pub rationale: String,
    pub ai_confidence: f64,
    pub evaluation_id: Option<String>,
}

impl TradeRow {
    pub fn into_domain(self) -> Result<Trade, PersistenceError> {
        Ok(Trade {
            id: parse_uuid(&self.id)?,
            bot_id: parse_uuid(&self.bot_id)?,
            credential_id: parse_uuid(&self.credential_id)?,
            symbol: self.symbol,
            direction: text_to_direction(&self.direction)?,
            quantity: text_to_decimal(&self.quantity)?,
            entry_price: text_to_decimal(&self.entry_price)?,
            stop_loss: text_to_opt_decimal(self.stop_loss)?,
            take_profit: text_to_opt_decimal(self.take_profit)?,
            current_price: text_to_opt_decimal(self.current_price)?,
            status: text_to_status(&self.status)?,
            opened_at: text_to_opt_datetime(self.opened_at)?,
            closed_at: text_to_opt_datetime(self.closed_at)?,
            broker_deal_id: self.broker_deal_id,
            profit_loss: text_to_opt_decimal(self.profit_loss)?,
            rationale: self.rationale,
            ai_confidence: self.ai_confidence,
            evaluation_id: parse_opt_uuid(self.evaluation_id)?,
        })
    }
}

pub(crate) fn trade_columns(t: &Trade) -> TradeRow {
    TradeRow {
        id: t.id.to_string(),
        bot_id: t.bot_id.to_string(),
        credential_id: t.credential_id.to_string(),
        symbol: t.symbol.clone(),
        direction: direction_to_text(t.direction).to_string(),
        quantity: decimal_to_text(t.quantity),
        entry_price: decimal_to_text(t.entry_price),
        stop_loss: opt_decimal_to_text(t.stop_loss),
        take_profit: opt_decimal_to_text(t.take_profit),
        current_price: opt_decimal_to_text(t.current_price),
        status: status_to_text(t.status).to_string(),
        opened_at: opt_datetime_to_text(t.opened_at),
        closed_at: opt_datetime_to_text(t.closed_at),
        broker_deal_id: t.broker_deal_id.clone(),
        profit_loss: opt_decimal_to_text(t.profit_loss),
        rationale: t.rationale.clone(),
        ai_confidence: t.ai_confidence,
        evaluation_id: t.evaluation_id.map(|id| id.to_string()),
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct EvaluationRow {
    pub id: String,
    pub bot_id: String,
    pub started_at: String,
    pub chart_ref: Option<String>,
    pub decision: String,
    pub confidence: f64,
    pub reasoning: String,
    pub trade_params: Option<String>,
}

impl EvaluationRow {
    pub fn into_domain(self) -> Result<Evaluation, PersistenceError> {
        let trade_params = match self.trade_params {
            Some(s) => Some(
                serde_json::from_str(&s).map_err(|e| PersistenceError::Decode(format!("bad trade_params json: {e}")))?,
            ),
            None => None,
        };
        Ok(Evaluation {
            id: parse_uuid(&self.id)?,
            bot_id: parse_uuid(&self.bot_id)?,
            started_at: text_to_datetime(&self.started_at)?,
            chart_ref: self.chart_ref,
            decision: text_to_decision(&self.decision)?,
            confidence: self.confidence,
            reasoning: self.reasoning,
            trade_params,
        })
    }
}

pub(crate) fn evaluation_columns(e: &Evaluation) -> Result<EvaluationRow, PersistenceError> {
    let trade_params = match &e.trade_params {
        Some(p) => Some(serde_json::to_string(p).map_err(|e| PersistenceError::Decode(e.to_string()))?),
        None => None,
    };
    Ok(EvaluationRow {
        id: e.id.to_string(),
        bot_id: e.bot_id.to_string(),
        started_at: datetime_to_text(e.started_at),
        chart_ref: e.chart_ref.clone(),
        decision: decision_to_text(e.decision).to_string(),
        confidence: e.confidence,
        reasoning: e.reasoning.clone(),
        trade_params,
    })
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct OwnershipRow {
    pub broker_deal_id: String,
    pub bot_id: String,
    pub provenance: String,
    pub attributed_at: String,
}

impl OwnershipRow {
    pub fn into_domain(self) -> Result<PositionOwnership, PersistenceError> {
        Ok(PositionOwnership {
            broker_deal_id: self.broker_deal_id,
            bot_id: parse_uuid(&self.bot_id)?,
            provenance: text_to_provenance(&self.provenance)?,
            attributed_at: text_to_datetime(&self.attributed_at)?,
        })
    }
}

fn provenance_to_text(p: OwnershipProvenance) -> &'static str {
    match p {
        OwnershipProvenance::DealIdMatch => "deal_id_match",
        OwnershipProvenance::TimeSymbolSizeMatch => "time_symbol_size_match",
    }
}

fn text_to_provenance(s: &str) -> Result<OwnershipProvenance, PersistenceError> {
    match s {
        "deal_id_match" => Ok(OwnershipProvenance::DealIdMatch),
        "time_symbol_size_match" => Ok(OwnershipProvenance::TimeSymbolSizeMatch),
        other => Err(PersistenceError::Decode(format!("unknown provenance {other:?}"))),
    }
}

pub(crate) fn ownership_columns(o: &PositionOwnership) -> OwnershipRow {
    OwnershipRow {
        broker_deal_id: o.broker_deal_id.clone(),
        bot_id: o.bot_id.to_string(),
        provenance: provenance_to_text(o.provenance).to_string(),
        attributed_at: datetime_to_text(o.attributed_at),
    }
}

/// Point-in-time rollup for a bot, written on each tick the scheduler or
/// position monitor completes. Not part of the core domain model — purely a
/// read-side convenience the dashboard/API layer queries.
#[derive(Debug, Clone)]
pub struct PerformanceSnapshot {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub open_trades: u32,
    pub realised_pnl: rust_decimal::Decimal,
    pub win_rate: Option<f64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct PerformanceRow {
    pub id: String,
    pub bot_id: String,
    pub taken_at: String,
    pub open_trades: i64,
    pub realised_pnl: String,
    pub win_rate: Option<f64>,
}

impl PerformanceRow {
    pub fn into_domain(self) -> Result<PerformanceSnapshot, PersistenceError> {
        Ok(PerformanceSnapshot {
            id: parse_uuid(&self.id)?,
            bot_id: parse_uuid(&self.bot_id)?,
            taken_at: text_to_datetime(&self.taken_at)?,
            open_trades: self.open_trades as u32,
            realised_pnl: text_to_decimal(&self.realised_pnl)?,
            win_rate: self.win_rate,
        })
    }
}

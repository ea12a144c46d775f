use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Timeframe a bot or rule operates on. Minutes come from the candle-resolution
/// mapping used by both the strategy parser (L5) and the higher-timeframe
/// analyser (L6): M1=1, M5=5, M15=15, M30=30, H1=60, H4=240, D1=1440.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn to_minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "m1" | "1min" | "1m" => Some(Timeframe::M1),
            "m5" | "5min" | "5m" => Some(Timeframe::M5),
            "m15" | "15min" | "15m" => Some(Timeframe::M15),
            "m30" | "30min" | "30m" => Some(Timeframe::M30),
            "h1" | "1hour" | "1h" => Some(Timeframe::H1),
            "h4" | "4hour" | "4h" => Some(Timeframe::H4),
            "d1" | "daily" | "1d" => Some(Timeframe::D1),
            _ => None,
        }
    }
}

/// Broad asset class, used by the Risk Gate's market-timing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    Crypto,
    Forex,
    IndexStockOrCommodity,
}

/// Broker kind a Credential authenticates against. Each kind is a tagged
/// variant dispatched by the Broker Gateway (L1), chosen at credential-load
/// time and cached per credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Capital,
    Binance,
    Coinbase,
    Custom,
}

/// Identity of a recurring evaluation. Owned by a user; mutated by the user
/// or by the Bot Coordinator (`last_eval_at`); destruction is forbidden while
/// open positions exist (enforced by the persistence layer, not here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub credential_id: Uuid,
    pub strategy_id: Uuid,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub is_active: bool,
    pub ai_enabled: bool,
    pub max_open_trades: u32,
    pub min_interval_between_trades: chrono::Duration,
    pub last_eval_at: Option<DateTime<Utc>>,
    pub last_trade_at: Option<DateTime<Utc>>,
}

impl Bot {
    /// Whether enough time has passed since the last trade to open another one.
    /// Boundary: exactly `min_interval_between_trades` ago is allowed.
    pub fn interval_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_trade_at {
            None => true,
            Some(last) => now - last >= self.min_interval_between_trades,
        }
    }
}

/// Opaque secret bundle plus broker kind. The ciphertext itself is out of
/// scope (§6); this struct models only what the orchestration core needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub broker_kind: BrokerKind,
    pub max_concurrent: u32,
    pub is_live: bool,
}

impl Default for Credential {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            broker_kind: BrokerKind::Custom,
            max_concurrent: 1,
            is_live: false,
        }
    }
}

/// Risk controls parsed out of a Strategy's free-text description, separate
/// from the ordered ParsedRule list (entry/exit conditions).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskControls {
    pub max_drawdown: Option<f64>,
    pub trailing_stop_loss: Option<f64>,
    pub take_profit_level: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description_text: String,
    pub timeframes: Vec<Timeframe>,
    pub indicators: Vec<String>,
    pub entry_conditions: Vec<String>,
    pub exit_conditions: Vec<String>,
    pub risk_controls: RiskControls,
    pub min_risk_per_trade: f64,
    pub max_risk_per_trade: f64,
    pub confidence_threshold: f64,
}

/// Unit a rule's trigger value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerUnit {
    Candles,
    Minutes,
    Hours,
    Percent,
    Pips,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    GreaterThan,
    LessThan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleType {
    ExitAfterCandles,
    ExitAfterTime,
    ExitOnProfit,
    ExitOnLoss,
    TrailStop,
    ScaleOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleAction {
    CloseFull,
    ClosePartial,
    ModifySl,
    ModifyTp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RuleTrigger {
    pub value: f64,
    pub unit: TriggerUnit,
    pub condition: Option<Condition>,
}

/// A single executable exit/management rule, the output of the Strategy Rule
/// Parser (L5). Rules are evaluated in descending `priority` order by the
/// Position Monitor (C2); only the first whose trigger holds fires per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedRule {
    pub rule_type: RuleType,
    pub trigger: RuleTrigger,
    pub action: RuleAction,
    pub parameters: Option<serde_json::Value>,
    pub priority: u8,
    pub enabled: bool,
    /// Bumped whenever the parser's pattern table changes (§9: parser output
    /// is versioned so stale parses can be detected and re-evaluated).
    pub parser_version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Pending,
    Open,
    Closed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub credential_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub status: TradeStatus,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub broker_deal_id: Option<String>,
    pub profit_loss: Option<Decimal>,
    pub rationale: String,
    pub ai_confidence: f64,
    pub evaluation_id: Option<Uuid>,
}

impl Trade {
    /// `status=OPEN ⇔ openedAt ≠ ∅ ∧ closedAt = ∅` (§3 invariant).
    pub fn invariant_holds(&self) -> bool {
        match self.status {
            TradeStatus::Open => self.opened_at.is_some() && self.closed_at.is_none(),
            TradeStatus::Closed => self.closed_at.is_some(),
            _ => true,
        }
    }

    pub fn unrealised_pnl_percent(&self) -> Option<f64> {
        let current = self.current_price?;
        if self.entry_price.is_zero() {
            return None;
        }
        let diff = match self.direction {
            Direction::Buy => current - self.entry_price,
            Direction::Sell => self.entry_price - current,
        };
        let pct = (diff / self.entry_price) * Decimal::from(100);
        rust_decimal::prelude::ToPrimitive::to_f64(&pct)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Hold,
    ExecuteTrade,
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeParams {
    pub symbol: String,
    pub direction: Direction,
    pub order_type: String,
    pub quantity: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// Append-only record of one decision cycle, whether or not a trade followed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub chart_ref: Option<String>,
    pub decision: Decision,
    pub confidence: f64,
    pub reasoning: String,
    pub trade_params: Option<TradeParams>,
}

/// How a broker position was attributed to a bot by the Position Ledger (L8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipProvenance {
    DealIdMatch,
    TimeSymbolSizeMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionOwnership {
    pub broker_deal_id: String,
    pub bot_id: Uuid,
    pub provenance: OwnershipProvenance,
    pub attributed_at: DateTime<Utc>,
}

/// Per-credential admission state (L2). `in_flight ≤ credential.max_concurrent`.
#[derive(Debug, Clone)]
pub struct RateToken {
    pub in_flight: u32,
    pub last_started_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl Default for RateToken {
    fn default() -> Self {
        Self {
            in_flight: 0,
            last_started_at: None,
            cooldown_until: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_minutes_match_mapping() {
        assert_eq!(Timeframe::M1.to_minutes(), 1);
        assert_eq!(Timeframe::M15.to_minutes(), 15);
        assert_eq!(Timeframe::H4.to_minutes(), 240);
        assert_eq!(Timeframe::D1.to_minutes(), 1440);
    }

    #[test]
    fn trade_invariant_open_requires_opened_at() {
        let mut t = sample_trade();
        t.status = TradeStatus::Open;
        t.opened_at = None;
        assert!(!t.invariant_holds());
        t.opened_at = Some(Utc::now());
        assert!(t.invariant_holds());
    }

    #[test]
    fn bot_interval_boundary_exact_is_allowed() {
        let mut bot = sample_bot();
        bot.min_interval_between_trades = chrono::Duration::minutes(5);
        let now = Utc::now();
        bot.last_trade_at = Some(now - chrono::Duration::minutes(5));
        assert!(bot.interval_elapsed(now));

        bot.last_trade_at = Some(now - chrono::Duration::minutes(5) + chrono::Duration::seconds(1));
        assert!(!bot.interval_elapsed(now));
    }

    fn sample_trade() -> Trade {
        Trade {
            id: Uuid::new_v4(),
            bot_id: Uuid::new_v4(),
            credential_id: Uuid::new_v4(),
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            quantity: Decimal::from(1000),
            entry_price: Decimal::new(10870, 4),
            stop_loss: None,
            take_profit: None,
            current_price: None,
            status: TradeStatus::Pending,
            opened_at: None,
            closed_at: None,
            broker_deal_id: None,
            profit_loss: None,
            rationale: String::new(),
            ai_confidence: 0.0,
            evaluation_id: None,
        }
    }

    fn sample_bot() -> Bot {
        Bot {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            credential_id: Uuid::new_v4(),
            strategy_id: Uuid::new_v4(),
            symbol: "EURUSD".into(),
            timeframe: Timeframe::M15,
            is_active: true,
            ai_enabled: true,
            max_open_trades: 2,
            min_interval_between_trades: chrono::Duration::minutes(5),
            last_eval_at: None,
            last_trade_at: None,
        }
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{ParsedRule, Trade};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::PositionMonitorError;

/// An OPEN trade plus the exit/management rules parsed from its bot's
/// strategy, in the order the parser produced them (priority is a field on
/// each rule, not positional).
#[derive(Debug, Clone)]
pub struct MonitoredTrade {
    pub trade: Trade,
    pub rules: Vec<ParsedRule>,
    pub timeframe_minutes: i64,
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn load_open_trades(&self, credential_id: Uuid) -> Result<Vec<MonitoredTrade>, PositionMonitorError>;

    async fn update_current_price(&self, trade_id: Uuid, price: Decimal) -> Result<(), PositionMonitorError>;

    async fn update_stop_loss(&self, trade_id: Uuid, new_sl: Decimal) -> Result<(), PositionMonitorError>;

    async fn close_trade(
        &self,
        trade_id: Uuid,
        closed_at: DateTime<Utc>,
        profit_loss: Decimal,
        reason: &str,
    ) -> Result<(), PositionMonitorError>;

    /// Reduces the open trade's quantity to `remaining_quantity` and persists
    /// `closed_portion` as a separate, already-closed Trade row.
    async fn scale_out(&self, trade_id: Uuid, remaining_quantity: Decimal, closed_portion: Trade) -> Result<(), PositionMonitorError>;

    async fn set_broker_deal_id(&self, trade_id: Uuid, deal_id: String) -> Result<(), PositionMonitorError>;

    async fn max_open_trades(&self, bot_id: Uuid) -> Result<u32, PositionMonitorError>;
}

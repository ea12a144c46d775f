use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{AssetClass, Bot, Credential, Evaluation, Strategy, Trade};
use risk_gate::PortfolioSnapshot;
use uuid::Uuid;

use crate::error::BotEvaluatorError;

/// Everything one evaluation attempt needs, assembled by the persistence
/// layer before the pipeline starts. `asset_class` and `recent_close` are
/// cheap derived reads the store is expected to have on hand already.
pub struct EvaluationContext {
    pub bot: Bot,
    pub strategy: Strategy,
    pub credential: Credential,
    pub open_trade_count: u32,
    pub has_open_trade_for_symbol: bool,
    pub has_pending_trade_for_symbol: bool,
    pub portfolio: PortfolioSnapshot,
    pub asset_class: AssetClass,
    pub recent_close: Option<rust_decimal::Decimal>,
}

/// What C1 reads and writes through; the real implementation lives in
/// `persistence` over `sqlx::AnyPool`, same split `risk-manager::manager`
/// draws between its pure checks and its table access.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    async fn load_context(&self, bot_id: Uuid) -> Result<EvaluationContext, BotEvaluatorError>;
    async fn save_evaluation(&self, evaluation: &Evaluation) -> Result<(), BotEvaluatorError>;
    async fn save_trade(&self, trade: &Trade) -> Result<(), BotEvaluatorError>;
    async fn update_last_trade_at(&self, bot_id: Uuid, at: DateTime<Utc>) -> Result<(), BotEvaluatorError>;
}

use async_trait::async_trait;
use bot_evaluator::{BotEvaluatorError, EvaluationContext, EvaluationStore};
use chrono::{DateTime, Utc};
use core_types::{Evaluation, Trade, TradeStatus};
use risk_gate::PortfolioSnapshot;
use sqlx::AnyPool;
use uuid::Uuid;

use crate::rows::{evaluation_columns, trade_columns, BotRow, CredentialRow, StrategyRow, TradeRow};

/// The live `EvaluationStore` the bot evaluator calls through. Built over
/// `sqlx::AnyPool` so the same binary runs against sqlite in dev and
/// postgres in production without a second implementation.
///
/// Equity-dependent `PortfolioSnapshot` fields (`current_risk_percent`,
/// `total_exposure_percent`, `drawdown_percent`, `daily_pnl_percent`) are
/// zeroed here: computing them faithfully needs live account equity from the
/// broker, and `load_context` is not allowed to reach the network. Those risk
/// gate checks are inert until an equity feed is wired into this struct.
pub struct SqlEvaluationStore {
    pool: AnyPool,
}

impl SqlEvaluationStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    async fn consecutive_losses(&self, bot_id: Uuid) -> u32 {
        let pnl_rows: Vec<(Option<String>,)> = sqlx::query_as(
            "SELECT profit_loss FROM trades WHERE bot_id = ? AND status = 'CLOSED' ORDER BY closed_at DESC LIMIT 20",
        )
        .bind(bot_id.to_string())
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default();

        let mut consecutive = 0u32;
        for (pnl,) in pnl_rows {
            let is_loss = pnl
                .and_then(|s| s.parse::<f64>().ok())
                .map(|v| v < 0.0)
                .unwrap_or(false);
            if is_loss {
                consecutive += 1;
            } else {
                break;
            }
        }
        consecutive
    }
}

#[async_trait]
impl EvaluationStore for SqlEvaluationStore {
    async fn load_context(&self, bot_id: Uuid) -> Result<EvaluationContext, BotEvaluatorError> {
        let bot_row: BotRow = sqlx::query_as("SELECT * FROM bots WHERE id = ?")
            .bind(bot_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BotEvaluatorError::Store(e.to_string()))?
            .ok_or_else(|| BotEvaluatorError::Store(format!("bot {bot_id} not found")))?;
        let bot = bot_row
            .clone()
            .into_domain()
            .map_err(|e| BotEvaluatorError::Store(e.to_string()))?;
        let asset_class = bot_row
            .resolved_asset_class()
            .map_err(|e| BotEvaluatorError::Store(e.to_string()))?;

        let strategy_row: StrategyRow = sqlx::query_as("SELECT * FROM strategies WHERE id = ?")
            .bind(bot.strategy_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BotEvaluatorError::Store(e.to_string()))?
            .ok_or_else(|| BotEvaluatorError::Store(format!("strategy {} not found", bot.strategy_id)))?;
        let strategy = strategy_row
            .into_domain()
            .map_err(|e| BotEvaluatorError::Store(e.to_string()))?;

        let credential_row: CredentialRow = sqlx::query_as("SELECT * FROM credentials WHERE id = ?")
            .bind(bot.credential_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BotEvaluatorError::Store(e.to_string()))?
            .ok_or_else(|| BotEvaluatorError::Store(format!("credential {} not found", bot.credential_id)))?;
        let credential = credential_row
            .into_domain()
            .map_err(|e| BotEvaluatorError::Store(e.to_string()))?;

        let open_trade_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trades WHERE bot_id = ? AND status = 'OPEN'")
            .bind(bot_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BotEvaluatorError::Store(e.to_string()))?;

        let has_open_trade_for_symbol: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM trades WHERE bot_id = ? AND symbol = ? AND status = 'OPEN'",
        )
        .bind(bot_id.to_string())
        .bind(&bot.symbol)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BotEvaluatorError::Store(e.to_string()))?;

        let has_pending_trade_for_symbol: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM trades WHERE bot_id = ? AND symbol = ? AND status = 'PENDING'",
        )
        .bind(bot_id.to_string())
        .bind(&bot.symbol)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BotEvaluatorError::Store(e.to_string()))?;

        let total_open_positions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trades WHERE status = 'OPEN'")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BotEvaluatorError::Store(e.to_string()))?;

        let recent_close_row: Option<(String,)> = sqlx::query_as(
            "SELECT current_price FROM trades WHERE bot_id = ? AND current_price IS NOT NULL ORDER BY opened_at DESC LIMIT 1",
        )
        .bind(bot_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BotEvaluatorError::Store(e.to_string()))?;
        let recent_close = recent_close_row
            .map(|(s,)| s.parse::<rust_decimal::Decimal>())
            .transpose()
            .map_err(|e| BotEvaluatorError::Store(format!("bad recent_close: {e}")))?;

        let portfolio = PortfolioSnapshot {
            current_risk_percent: 0.0,
            total_exposure_percent: 0.0,
            drawdown_percent: 0.0,
            open_positions: total_open_positions as u32,
            daily_pnl_percent: 0.0,
            consecutive_losses: self.consecutive_losses(bot_id).await,
            trading_halted: false,
        };

        Ok(EvaluationContext {
            bot,
            strategy,
            credential,
            open_trade_count: open_trade_count as u32,
            has_open_trade_for_symbol: has_open_trade_for_symbol > 0,
            has_pending_trade_for_symbol: has_pending_trade_for_symbol > 0,
            portfolio,
            asset_class,
            recent_close,
        })
    }

    async fn save_evaluation(&self, evaluation: &Evaluation) -> Result<(), BotEvaluatorError> {
        let row = evaluation_columns(evaluation).map_err(|e| BotEvaluatorError::Store(e.to_string()))?;
        sqlx::query(
            "INSERT INTO evaluations (id, bot_id, started_at, chart_ref, decision, confidence, reasoning, trade_params)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.id)
        .bind(row.bot_id)
        .bind(row.started_at)
        .bind(row.chart_ref)
        .bind(row.decision)
        .bind(row.confidence)
        .bind(row.reasoning)
        .bind(row.trade_params)
        .execute(&self.pool)
        .await
        .map_err(|e| BotEvaluatorError::Store(e.to_string()))?;
        Ok(())
    }

    async fn save_trade(&self, trade: &Trade) -> Result<(), BotEvaluatorError> {
        let row: TradeRow = trade_columns(trade);
        sqlx::query(
            "INSERT INTO trades (
                id, bot_id, credential_id, symbol, direction, quantity, entry_price,
                stop_loss, take_profit, current_price, status, opened_at, closed_at,
                broker_deal_id, profit_loss, rationale, ai_confidence, evaluation_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.id)
        .bind(row.bot_id)
        .bind(row.credential_id)
        .bind(row.symbol)
        .bind(row.direction)
        .bind(row.quantity)
        .bind(row.entry_price)
        .bind(row.stop_loss)
        .bind(row.take_profit)
        .bind(row.current_price)
        .bind(row.status)
        .bind(row.opened_at)
        .bind(row.closed_at)
        .bind(row.broker_deal_id)
        .bind(row.profit_loss)
        .bind(row.rationale)
        .bind(row.ai_confidence)
        .bind(row.evaluation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| BotEvaluatorError::Store(e.to_string()))?;

        if trade.status == TradeStatus::Open || trade.status == TradeStatus::Pending {
            let at = trade.opened_at.unwrap_or_else(Utc::now);
            self.touch_last_trade_at(trade.bot_id, at)
                .await
                .map_err(|e| BotEvaluatorError::Store(e.to_string()))?;
        }
        Ok(())
    }

    async fn update_last_trade_at(&self, bot_id: Uuid, at: DateTime<Utc>) -> Result<(), BotEvaluatorError> {
        self.touch_last_trade_at(bot_id, at)
            .await
            .map_err(|e| BotEvaluatorError::Store(e.to_string()))
    }
}

impl SqlEvaluationStore {
    async fn touch_last_trade_at(&self, bot_id: Uuid, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE bots SET last_trade_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(bot_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::test_pool;
    use crate::test_support::{insert_bot, insert_credential, insert_strategy, insert_trade};
    use core_types::TradeStatus;

    #[tokio::test]
    async fn load_context_counts_open_and_pending_trades_for_symbol() {
        let pool = test_pool().await;
        let credential_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        insert_credential(&pool, credential_id, "plaintext").await;
        insert_strategy(&pool, strategy_id, "close position after 10 candles", 1).await;
        let bot_id = Uuid::new_v4();
        insert_bot(&pool, bot_id, credential_id, strategy_id, "EURUSD", true).await;
        insert_trade(&pool, Uuid::new_v4(), bot_id, credential_id, "EURUSD", "OPEN", None, None).await;
        insert_trade(&pool, Uuid::new_v4(), bot_id, credential_id, "GBPUSD", "PENDING", None, None).await;

        let store = SqlEvaluationStore::new(pool);
        let ctx = store.load_context(bot_id).await.unwrap();

        assert_eq!(ctx.open_trade_count, 1);
        assert!(ctx.has_open_trade_for_symbol);
        assert!(!ctx.has_pending_trade_for_symbol);
        assert_eq!(ctx.portfolio.open_positions, 1);
    }

    #[tokio::test]
    async fn load_context_zeroes_equity_dependent_portfolio_fields() {
        let pool = test_pool().await;
        let credential_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        insert_credential(&pool, credential_id, "plaintext").await;
        insert_strategy(&pool, strategy_id, "close position after 10 candles", 1).await;
        let bot_id = Uuid::new_v4();
        insert_bot(&pool, bot_id, credential_id, strategy_id, "EURUSD", true).await;

        let store = SqlEvaluationStore::new(pool);
        let ctx = store.load_context(bot_id).await.unwrap();

        assert_eq!(ctx.portfolio.current_risk_percent, 0.0);
        assert_eq!(ctx.portfolio.total_exposure_percent, 0.0);
        assert_eq!(ctx.portfolio.drawdown_percent, 0.0);
        assert_eq!(ctx.portfolio.daily_pnl_percent, 0.0);
        assert!(!ctx.portfolio.trading_halted);
    }

    #[tokio::test]
    async fn consecutive_losses_stops_at_first_winning_trade() {
        let pool = test_pool().await;
        let credential_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        insert_credential(&pool, credential_id, "plaintext").await;
        insert_strategy(&pool, strategy_id, "close position after 10 candles", 1).await;
        let bot_id = Uuid::new_v4();
        insert_bot(&pool, bot_id, credential_id, strategy_id, "EURUSD", true).await;

        let now = Utc::now();
        insert_trade(
            &pool,
            Uuid::new_v4(),
            bot_id,
            credential_id,
            "EURUSD",
            "CLOSED",
            Some("-10.0"),
            Some((now - chrono::Duration::minutes(1)).to_rfc3339()),
        )
        .await;
        insert_trade(
            &pool,
            Uuid::new_v4(),
            bot_id,
            credential_id,
            "EURUSD",
            "CLOSED",
            Some("-5.0"),
            Some(now.to_rfc3339()),
        )
        .await;

        let store = SqlEvaluationStore::new(pool);
        assert_eq!(store.consecutive_losses(bot_id).await, 2);
    }

    #[tokio::test]
    async fn save_trade_touches_last_trade_at_when_opened() {
        let pool = test_pool().await;
        let credential_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        insert_credential(&pool, credential_id, "plaintext").await;
        insert_strategy(&pool, strategy_id, "close position after 10 candles", 1).await;
        let bot_id = Uuid::new_v4();
        insert_bot(&pool, bot_id, credential_id, strategy_id, "EURUSD", true).await;

        let store = SqlEvaluationStore::new(pool.clone());
        let trade = core_types::Trade {
            id: Uuid::new_v4(),
            bot_id,
            credential_id,
            symbol: "EURUSD".into(),
            direction: core_types::Direction::Buy,
            quantity: rust_decimal::Decimal::new(1000, 0),
            entry_price: rust_decimal::Decimal::new(10870, 4),
            stop_loss: None,
            take_profit: None,
            current_price: None,
            status: TradeStatus::Open,
            opened_at: Some(Utc::now()),
            closed_at: None,
            broker_deal_id: None,
            profit_loss: None,
            rationale: String::new(),
            ai_confidence: 0.8,
            evaluation_id: None,
        };
        store.save_trade(&trade).await.unwrap();

        let bot = crate::bots::load_bot(&pool, bot_id).await.unwrap();
        assert!(bot.last_trade_at.is_some());
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{ParsedRule, Trade};
use position_monitor::store::{MonitoredTrade, PositionStore};
use position_monitor::PositionMonitorError;
use rust_decimal::Decimal;
use sqlx::AnyPool;
use uuid::Uuid;

use crate::codec::decimal_to_text;
use crate::rows::{trade_columns, BotRow, StrategyRow, TradeRow};
use crate::strategies::load_strategy_with_rules;

pub struct SqlPositionStore {
    pool: AnyPool,
}

impl SqlPositionStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionStore for SqlPositionStore {
    async fn load_open_trades(&self, credential_id: Uuid) -> Result<Vec<MonitoredTrade>, PositionMonitorError> {
        let trade_rows: Vec<TradeRow> =
            sqlx::query_as("SELECT * FROM trades WHERE credential_id = ? AND status = 'OPEN'")
                .bind(credential_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| PositionMonitorError::Store(e.to_string()))?;

        let mut monitored = Vec::with_capacity(trade_rows.len());
        for row in trade_rows {
            let trade = row.into_domain().map_err(|e| PositionMonitorError::Store(e.to_string()))?;

            let bot_row: BotRow = sqlx::query_as("SELECT * FROM bots WHERE id = ?")
                .bind(trade.bot_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PositionMonitorError::Store(e.to_string()))?
                .ok_or_else(|| PositionMonitorError::Store(format!("bot {} not found", trade.bot_id)))?;

            let strategy_row: StrategyRow = sqlx::query_as("SELECT * FROM strategies WHERE id = ?")
                .bind(&bot_row.strategy_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PositionMonitorError::Store(e.to_string()))?
                .ok_or_else(|| PositionMonitorError::Store(format!("strategy {} not found", bot_row.strategy_id)))?;

            let rules: Vec<ParsedRule> = if strategy_row.parser_version as u32 == strategy_parser::RULE_SET_VERSION {
                serde_json::from_str(&strategy_row.parsed_rules)
                    .map_err(|e| PositionMonitorError::Store(format!("bad parsed_rules json: {e}")))?
            } else {
                let strategy_id = Uuid::parse_str(&bot_row.strategy_id)
                    .map_err(|e| PositionMonitorError::Store(format!("bad strategy id: {e}")))?;
                let (_, rules) = load_strategy_with_rules(&self.pool, strategy_id)
                    .await
                    .map_err(|e| PositionMonitorError::Store(e.to_string()))?;
                rules
            };

            let timeframe_minutes = core_types::Timeframe::parse(&bot_row.timeframe)
                .map(|t| t.to_minutes())
                .unwrap_or(15);

            monitored.push(MonitoredTrade {
                trade,
                rules,
                timeframe_minutes,
            });
        }

        Ok(monitored)
    }

    async fn update_current_price(&self, trade_id: Uuid, price: Decimal) -> Result<(), PositionMonitorError> {
        sqlx::query("UPDATE trades SET current_price = ? WHERE id = ?")
            .bind(decimal_to_text(price))
            .bind(trade_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PositionMonitorError::Store(e.to_string()))?;
        Ok(())
    }

    async fn update_stop_loss(&self, trade_id: Uuid, new_sl: Decimal) -> Result<(), PositionMonitorError> {
        sqlx::query("UPDATE trades SET stop_loss = ? WHERE id = ?")
            .bind(decimal_to_text(new_sl))
            .bind(trade_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PositionMonitorError::Store(e.to_string()))?;
        Ok(())
    }

    async fn close_trade(
        &self,
        trade_id: Uuid,
        closed_at: DateTime<Utc>,
        profit_loss: Decimal,
        reason: &str,
    ) -> Result<(), PositionMonitorError> {
        sqlx::query(
            "UPDATE trades SET status = 'CLOSED', closed_at = ?, profit_loss = ?, rationale = ? WHERE id = ?",
        )
        .bind(closed_at.to_rfc3339())
        .bind(decimal_to_text(profit_loss))
        .bind(reason)
        .bind(trade_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| PositionMonitorError::Store(e.to_string()))?;
        Ok(())
    }

    async fn scale_out(
        &self,
        trade_id: Uuid,
        remaining_quantity: Decimal,
        closed_portion: Trade,
    ) -> Result<(), PositionMonitorError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PositionMonitorError::Store(e.to_string()))?;

        sqlx::query("UPDATE trades SET quantity = ? WHERE id = ?")
            .bind(decimal_to_text(remaining_quantity))
            .bind(trade_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| PositionMonitorError::Store(e.to_string()))?;

        let row: TradeRow = trade_columns(&closed_portion);
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
        .execute(&mut *tx)
        .await
        .map_err(|e| PositionMonitorError::Store(e.to_string()))?;

        tx.commit().await.map_err(|e| PositionMonitorError::Store(e.to_string()))?;
        Ok(())
    }

    async fn set_broker_deal_id(&self, trade_id: Uuid, deal_id: String) -> Result<(), PositionMonitorError> {
        sqlx::query("UPDATE trades SET broker_deal_id = ? WHERE id = ?")
            .bind(deal_id)
            .bind(trade_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PositionMonitorError::Store(e.to_string()))?;
        Ok(())
    }

    async fn max_open_trades(&self, bot_id: Uuid) -> Result<u32, PositionMonitorError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT max_open_trades FROM bots WHERE id = ?")
            .bind(bot_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PositionMonitorError::Store(e.to_string()))?;
        Ok(row.map(|(n,)| n as u32).unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::test_pool;
    use crate::test_support::{insert_bot, insert_credential, insert_strategy, insert_trade};
    use core_types::Direction;

    #[tokio::test]
    async fn load_open_trades_attaches_parsed_rules_from_the_owning_strategy() {
        let pool = test_pool().await;
        let credential_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        insert_credential(&pool, credential_id, "plaintext").await;
        insert_strategy(&pool, strategy_id, "close position after 10 candles", 0).await;
        let bot_id = Uuid::new_v4();
        insert_bot(&pool, bot_id, credential_id, strategy_id, "EURUSD", true).await;
        insert_trade(&pool, Uuid::new_v4(), bot_id, credential_id, "EURUSD", "OPEN", None, None).await;

        let store = SqlPositionStore::new(pool);
        let monitored = store.load_open_trades(credential_id).await.unwrap();

        assert_eq!(monitored.len(), 1);
        assert!(!monitored[0].rules.is_empty());
        assert_eq!(monitored[0].timeframe_minutes, 15);
    }

    #[tokio::test]
    async fn close_trade_sets_status_and_profit_loss() {
        let pool = test_pool().await;
        let credential_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        insert_credential(&pool, credential_id, "plaintext").await;
        insert_strategy(&pool, strategy_id, "close position after 10 candles", 1).await;
        let bot_id = Uuid::new_v4();
        insert_bot(&pool, bot_id, credential_id, strategy_id, "EURUSD", true).await;
        let trade_id = Uuid::new_v4();
        insert_trade(&pool, trade_id, bot_id, credential_id, "EURUSD", "OPEN", None, None).await;

        let store = SqlPositionStore::new(pool.clone());
        store
            .close_trade(trade_id, Utc::now(), Decimal::new(1250, 2), "take profit hit")
            .await
            .unwrap();

        let row: (String, Option<String>) = sqlx::query_as("SELECT status, profit_loss FROM trades WHERE id = ?")
            .bind(trade_id.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, "CLOSED");
        assert_eq!(row.1.unwrap(), "12.50");
    }

    #[tokio::test]
    async fn scale_out_shrinks_remaining_and_inserts_closed_portion() {
        let pool = test_pool().await;
        let credential_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        insert_credential(&pool, credential_id, "plaintext").await;
        insert_strategy(&pool, strategy_id, "close position after 10 candles", 1).await;
        let bot_id = Uuid::new_v4();
        insert_bot(&pool, bot_id, credential_id, strategy_id, "EURUSD", true).await;
        let trade_id = Uuid::new_v4();
        insert_trade(&pool, trade_id, bot_id, credential_id, "EURUSD", "OPEN", None, None).await;

        let store = SqlPositionStore::new(pool.clone());
        let closed_portion = Trade {
            id: Uuid::new_v4(),
            bot_id,
            credential_id,
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            quantity: Decimal::new(500, 0),
            entry_price: Decimal::new(10870, 4),
            stop_loss: None,
            take_profit: None,
            current_price: None,
            status: core_types::TradeStatus::Closed,
            opened_at: Some(Utc::now()),
            closed_at: Some(Utc::now()),
            broker_deal_id: None,
            profit_loss: Some(Decimal::new(500, 2)),
            rationale: "scale out".into(),
            ai_confidence: 0.0,
            evaluation_id: None,
        };
        store.scale_out(trade_id, Decimal::new(500, 0), closed_portion).await.unwrap();

        let rows: Vec<(String,)> = sqlx::query_as("SELECT quantity FROM trades WHERE bot_id = ? ORDER BY rowid")
            .bind(bot_id.to_string())
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "500");
    }
}

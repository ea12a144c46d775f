#![cfg(test)]

use chrono::Utc;
use sqlx::AnyPool;
use uuid::Uuid;

pub(crate) async fn insert_credential(pool: &AnyPool, id: Uuid, ciphertext: &str) {
    sqlx::query(
        "INSERT INTO credentials (id, user_id, broker_kind, max_concurrent, is_live, base_url, ciphertext, created_at)
         VALUES (?, ?, 'capital', 2, 0, 'https://example.test', ?, ?)",
    )
    .bind(id.to_string())
    .bind(Uuid::new_v4().to_string())
    .bind(ciphertext)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .unwrap();
}

pub(crate) async fn insert_strategy(pool: &AnyPool, id: Uuid, description_text: &str, parser_version: i64) {
    sqlx::query(
        "INSERT INTO strategies (id, user_id, name, description_text, timeframes, indicators,
            entry_conditions, exit_conditions, risk_controls, min_risk_per_trade, max_risk_per_trade,
            confidence_threshold, parsed_rules, parser_version, created_at, updated_at)
         VALUES (?, ?, 'test strategy', ?, '[\"m15\"]', '[]', '[]', '[]', '{}', 0.01, 0.02, 0.6, '[]', ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(Uuid::new_v4().to_string())
    .bind(description_text)
    .bind(parser_version)
    .bind(Utc::now().to_rfc3339())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .unwrap();
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn insert_bot(pool: &AnyPool, id: Uuid, credential_id: Uuid, strategy_id: Uuid, symbol: &str, is_active: bool) {
    sqlx::query(
        "INSERT INTO bots (id, user_id, credential_id, strategy_id, symbol, asset_class, timeframe,
            is_active, ai_enabled, max_open_trades, min_interval_between_trades_seconds,
            last_eval_at, last_trade_at, created_at)
         VALUES (?, ?, ?, ?, ?, NULL, 'm15', ?, 1, 2, 300, NULL, NULL, ?)",
    )
    .bind(id.to_string())
    .bind(Uuid::new_v4().to_string())
    .bind(credential_id.to_string())
    .bind(strategy_id.to_string())
    .bind(symbol)
    .bind(is_active as i64)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .unwrap();
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn insert_trade(
    pool: &AnyPool,
    id: Uuid,
    bot_id: Uuid,
    credential_id: Uuid,
    symbol: &str,
    status: &str,
    profit_loss: Option<&str>,
    closed_at: Option<String>,
) {
    sqlx::query(
        "INSERT INTO trades (id, bot_id, credential_id, symbol, direction, quantity, entry_price,
            stop_loss, take_profit, current_price, status, opened_at, closed_at, broker_deal_id,
            profit_loss, rationale, ai_confidence, evaluation_id)
         VALUES (?, ?, ?, ?, 'BUY', '1000', '1.0870', NULL, NULL, NULL, ?, ?, ?, NULL, ?, '', 0.0, NULL)",
    )
    .bind(id.to_string())
    .bind(bot_id.to_string())
    .bind(credential_id.to_string())
    .bind(symbol)
    .bind(status)
    .bind(Utc::now().to_rfc3339())
    .bind(closed_at)
    .bind(profit_loss)
    .execute(pool)
    .await
    .unwrap();
}

use core_types::{AssetClass, Bot};
use sqlx::AnyPool;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::rows::BotRow;

pub async fn list_active_bots(pool: &AnyPool) -> Result<Vec<Bot>, PersistenceError> {
    let rows: Vec<BotRow> = sqlx::query_as("SELECT * FROM bots WHERE is_active = 1")
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(|r| r.into_domain()).collect()
}

pub async fn load_bot(pool: &AnyPool, bot_id: Uuid) -> Result<Bot, PersistenceError> {
    load_bot_row(pool, bot_id).await?.into_domain()
}

pub async fn resolved_asset_class(pool: &AnyPool, bot_id: Uuid) -> Result<AssetClass, PersistenceError> {
    load_bot_row(pool, bot_id).await?.resolved_asset_class()
}

async fn load_bot_row(pool: &AnyPool, bot_id: Uuid) -> Result<BotRow, PersistenceError> {
    sqlx::query_as("SELECT * FROM bots WHERE id = ?")
        .bind(bot_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(format!("bot {bot_id}")))
}

pub async fn update_last_eval_at(
    pool: &AnyPool,
    bot_id: Uuid,
    at: chrono::DateTime<chrono::Utc>,
) -> Result<(), PersistenceError> {
    sqlx::query("UPDATE bots SET last_eval_at = ? WHERE id = ?")
        .bind(at.to_rfc3339())
        .bind(bot_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_last_trade_at(
    pool: &AnyPool,
    bot_id: Uuid,
    at: chrono::DateTime<chrono::Utc>,
) -> Result<(), PersistenceError> {
    sqlx::query("UPDATE bots SET last_trade_at = ? WHERE id = ?")
        .bind(at.to_rfc3339())
        .bind(bot_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn max_open_trades_for(pool: &AnyPool, bot_id: Uuid) -> Result<u32, PersistenceError> {
    Ok(load_bot_row(pool, bot_id).await?.max_open_trades as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::test_pool;
    use crate::test_support::{insert_bot, insert_credential, insert_strategy};
    use core_types::AssetClass;

    #[tokio::test]
    async fn list_active_bots_excludes_inactive() {
        let pool = test_pool().await;
        let credential_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        insert_credential(&pool, credential_id, "plaintext").await;
        insert_strategy(&pool, strategy_id, "close position after 10 candles", 1).await;

        let active_id = Uuid::new_v4();
        let inactive_id = Uuid::new_v4();
        insert_bot(&pool, active_id, credential_id, strategy_id, "EURUSD", true).await;
        insert_bot(&pool, inactive_id, credential_id, strategy_id, "GBPUSD", false).await;

        let bots = list_active_bots(&pool).await.unwrap();
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].id, active_id);
    }

    #[tokio::test]
    async fn resolved_asset_class_falls_back_to_classifier_when_unset() {
        let pool = test_pool().await;
        let credential_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        insert_credential(&pool, credential_id, "plaintext").await;
        insert_strategy(&pool, strategy_id, "close position after 10 candles", 1).await;
        let bot_id = Uuid::new_v4();
        insert_bot(&pool, bot_id, credential_id, strategy_id, "BTCUSD", true).await;

        let class = resolved_asset_class(&pool, bot_id).await.unwrap();
        assert_eq!(class, AssetClass::Crypto);
    }

    #[tokio::test]
    async fn update_last_eval_at_persists() {
        let pool = test_pool().await;
        let credential_id = Uuid::new_v4();
        let strategy_id = Uuid::new_v4();
        insert_credential(&pool, credential_id, "plaintext").await;
        insert_strategy(&pool, strategy_id, "close position after 10 candles", 1).await;
        let bot_id = Uuid::new_v4();
        insert_bot(&pool, bot_id, credential_id, strategy_id, "EURUSD", true).await;

        let now = chrono::Utc::now();
        update_last_eval_at(&pool, bot_id, now).await.unwrap();
        let bot = load_bot(&pool, bot_id).await.unwrap();
        assert!(bot.last_eval_at.is_some());
    }
}

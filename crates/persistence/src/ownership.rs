use core_types::PositionOwnership;
use sqlx::AnyPool;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::rows::{ownership_columns, OwnershipRow};

/// Appends an audit record of a broker position's attribution to a bot.
/// Purely a log: the Position Ledger itself is in-memory and re-derives
/// ownership from `trades.broker_deal_id` on every sync, so nothing reads
/// this table back into a running decision.
pub async fn record_attribution(pool: &AnyPool, ownership: &PositionOwnership) -> Result<(), PersistenceError> {
    let row = ownership_columns(ownership);
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM position_ownership_log WHERE broker_deal_id = ?")
        .bind(&row.broker_deal_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "INSERT INTO position_ownership_log (broker_deal_id, bot_id, provenance, attributed_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(row.broker_deal_id)
    .bind(row.bot_id)
    .bind(row.provenance)
    .bind(row.attributed_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn history_for_bot(pool: &AnyPool, bot_id: Uuid) -> Result<Vec<PositionOwnership>, PersistenceError> {
    let rows: Vec<OwnershipRow> = sqlx::query_as(
        "SELECT * FROM position_ownership_log WHERE bot_id = ? ORDER BY attributed_at DESC",
    )
    .bind(bot_id.to_string())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(|r| r.into_domain()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::test_pool;
    use core_types::OwnershipProvenance;

    fn sample(broker_deal_id: &str, bot_id: Uuid) -> PositionOwnership {
        PositionOwnership {
            broker_deal_id: broker_deal_id.to_string(),
            bot_id,
            provenance: OwnershipProvenance::DealIdMatch,
            attributed_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn re_attributing_the_same_deal_id_replaces_rather_than_duplicates() {
        let pool = test_pool().await;
        let bot_a = Uuid::new_v4();
        let bot_b = Uuid::new_v4();

        record_attribution(&pool, &sample("deal-1", bot_a)).await.unwrap();
        record_attribution(&pool, &sample("deal-1", bot_b)).await.unwrap();

        let for_a = history_for_bot(&pool, bot_a).await.unwrap();
        let for_b = history_for_bot(&pool, bot_b).await.unwrap();
        assert!(for_a.is_empty());
        assert_eq!(for_b.len(), 1);
    }

    #[tokio::test]
    async fn history_for_bot_orders_newest_first() {
        let pool = test_pool().await;
        let bot_id = Uuid::new_v4();
        record_attribution(&pool, &sample("deal-1", bot_id)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        record_attribution(&pool, &sample("deal-2", bot_id)).await.unwrap();

        let history = history_for_bot(&pool, bot_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].broker_deal_id, "deal-2");
    }
}

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::AnyPool;
use uuid::Uuid;

use crate::codec::decimal_to_text;
use crate::error::PersistenceError;
use crate::rows::{PerformanceRow, PerformanceSnapshot};

pub async fn record_snapshot(
    pool: &AnyPool,
    bot_id: Uuid,
    open_trades: u32,
    realised_pnl: Decimal,
    win_rate: Option<f64>,
) -> Result<(), PersistenceError> {
    sqlx::query(
        "INSERT INTO performance_snapshots (id, bot_id, taken_at, open_trades, realised_pnl, win_rate)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(bot_id.to_string())
    .bind(Utc::now().to_rfc3339())
    .bind(open_trades as i64)
    .bind(decimal_to_text(realised_pnl))
    .bind(win_rate)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_recent(pool: &AnyPool, bot_id: Uuid, limit: u32) -> Result<Vec<PerformanceSnapshot>, PersistenceError> {
    let rows: Vec<PerformanceRow> = sqlx::query_as(
        "SELECT * FROM performance_snapshots WHERE bot_id = ? ORDER BY taken_at DESC LIMIT ?",
    )
    .bind(bot_id.to_string())
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(|r| r.into_domain()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::test_pool;

    #[tokio::test]
    async fn list_recent_orders_newest_first_and_respects_limit() {
        let pool = test_pool().await;
        let bot_id = Uuid::new_v4();

        for (open_trades, pnl) in [(1u32, "10.0"), (2, "-5.0"), (0, "20.0")] {
            record_snapshot(&pool, bot_id, open_trades, pnl.parse().unwrap(), Some(0.5)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let recent = list_recent(&pool, bot_id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].open_trades, 0);
        assert_eq!(recent[1].open_trades, 2);
    }
}

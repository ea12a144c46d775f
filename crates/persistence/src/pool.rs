use sqlx::AnyPool;

use crate::error::PersistenceError;

const SCHEMA: &str = include_str!("schema.sql");

/// Connects to `database_url` (sqlite or postgres, via `sqlx::Any`) and
/// ensures the schema exists. Mirrors the portfolio manager's own
/// connect-then-init-schema sequence, generalised off a single sqlite pool
/// onto whichever backend `DATABASE_URL` points at.
pub async fn connect(database_url: &str) -> Result<AnyPool, PersistenceError> {
    sqlx::any::install_default_drivers();
    let pool = AnyPool::connect(database_url).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Splits the bundled schema by statement and executes each in turn — `Any`
/// doesn't support multi-statement execution in one call, the same
/// constraint the portfolio manager's own schema loader works around.
pub async fn init_schema(pool: &AnyPool) -> Result<(), PersistenceError> {
    for statement in SCHEMA.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt).execute(pool).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> AnyPool {
    sqlx::any::install_default_drivers();
    let pool = AnyPool::connect("sqlite::memory:").await.unwrap();
    init_schema(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connects_and_initialises_schema_idempotently() {
        let pool = test_pool().await;
        // running init_schema again must not fail on already-existing tables
        init_schema(&pool).await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bots")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}

use chrono::Utc;
use core_types::{ParsedRule, Strategy};
use sqlx::AnyPool;
use strategy_parser::RULE_SET_VERSION;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::rows::StrategyRow;

/// Loads a strategy along with its cached parsed rule list, re-parsing and
/// persisting a fresh cache when the stored `parser_version` is behind the
/// parser's current `RULE_SET_VERSION` — the staleness check `ParsedRule`'s
/// own doc comment describes.
pub async fn load_strategy_with_rules(
    pool: &AnyPool,
    strategy_id: Uuid,
) -> Result<(Strategy, Vec<ParsedRule>), PersistenceError> {
    let row: StrategyRow = sqlx::query_as("SELECT * FROM strategies WHERE id = ?")
        .bind(strategy_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PersistenceError::NotFound(format!("strategy {strategy_id}")))?;

    let stored_version = row.parser_version as u32;
    let strategy = row.clone().into_domain()?;

    if stored_version == RULE_SET_VERSION {
        let rules: Vec<ParsedRule> = serde_json::from_str(&row.parsed_rules)
            .map_err(|e| PersistenceError::Decode(format!("bad parsed_rules json: {e}")))?;
        return Ok((strategy, rules));
    }

    let primary_timeframe = strategy
        .timeframes
        .first()
        .copied()
        .unwrap_or(core_types::Timeframe::M15);
    let parsed = strategy_parser::parse_strategy(&strategy.description_text, primary_timeframe)
        .map_err(|e| PersistenceError::Decode(format!("re-parse failed: {e}")))?;

    let rules_json =
        serde_json::to_string(&parsed.rules).map_err(|e| PersistenceError::Decode(e.to_string()))?;
    sqlx::query("UPDATE strategies SET parsed_rules = ?, parser_version = ?, updated_at = ? WHERE id = ?")
        .bind(&rules_json)
        .bind(RULE_SET_VERSION as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(strategy_id.to_string())
        .execute(pool)
        .await?;

    Ok((strategy, parsed.rules))
}

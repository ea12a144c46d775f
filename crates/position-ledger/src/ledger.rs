use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use broker_gateway::BrokerPosition;
use core_types::{OwnershipProvenance, PositionOwnership, Trade, TradeStatus};

use crate::error::PositionLedgerError;

/// Window within which a broker position's `createdDate` must fall of a local
/// trade's creation for a time/symbol/size match to be considered.
const MATCH_WINDOW: Duration = Duration::minutes(5);

/// A broker position older than this is never eligible for time/symbol/size
/// recovery; it either already has a deal-id match or it's an orphan.
const RECOVERY_WINDOW: Duration = Duration::minutes(10);

/// Resolves which bot owns a broker-reported position when the broker itself
/// carries no bot identity. A deal id, once attributed, is never reattributed
/// or migrated — the map below is append-only for the lifetime of the process.
#[derive(Default)]
pub struct PositionLedger {
    owners: DashMap<String, PositionOwnership>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner_of(&self, deal_id: &str) -> Option<PositionOwnership> {
        self.owners.get(deal_id).map(|e| e.clone())
    }

    /// Attribute one broker position to a bot. `trades` is the set of known
    /// local trades to search for a match; `open_count` and `max_open` report
    /// a candidate bot's current load so recovery never pushes it over its cap.
    pub fn attribute(
        &self,
        position: &BrokerPosition,
        trades: &[Trade],
        open_count: impl Fn(uuid::Uuid) -> u32,
        max_open: impl Fn(uuid::Uuid) -> u32,
        now: DateTime<Utc>,
    ) -> Result<PositionOwnership, PositionLedgerError> {
        if let Some(existing) = self.owner_of(&position.deal_id) {
            return Ok(existing);
        }

        if let Some(trade) = trades
            .iter()
            .find(|t| t.broker_deal_id.as_deref() == Some(position.deal_id.as_str()))
        {
            let ownership = PositionOwnership {
                broker_deal_id: position.deal_id.clone(),
                bot_id: trade.bot_id,
                provenance: OwnershipProvenance::DealIdMatch,
                attributed_at: now,
            };
            self.owners.insert(position.deal_id.clone(), ownership.clone());
            return Ok(ownership);
        }

        if now - position.created_at <= RECOVERY_WINDOW {
            if let Some(trade) = self.find_time_symbol_size_match(position, trades, &open_count, &max_open) {
                let ownership = PositionOwnership {
                    broker_deal_id: position.deal_id.clone(),
                    bot_id: trade.bot_id,
                    provenance: OwnershipProvenance::TimeSymbolSizeMatch,
                    attributed_at: now,
                };
                self.owners.insert(position.deal_id.clone(), ownership.clone());
                return Ok(ownership);
            }
        }

        tracing::warn!(deal_id = %position.deal_id, symbol = %position.symbol, "position could not be attributed to any bot, refusing assignment");
        Err(PositionLedgerError::Orphan {
            deal_id: position.deal_id.clone(),
        })
    }

    fn find_time_symbol_size_match<'a>(
        &self,
        position: &BrokerPosition,
        trades: &'a [Trade],
        open_count: &impl Fn(uuid::Uuid) -> u32,
        max_open: &impl Fn(uuid::Uuid) -> u32,
    ) -> Option<&'a Trade> {
        trades
            .iter()
            .filter(|t| {
                matches!(t.status, TradeStatus::Pending | TradeStatus::Open)
                    && t.broker_deal_id.is_none()
                    && t.symbol == position.symbol
                    && t.direction == position.direction
                    && t.quantity == position.size
            })
            .filter_map(|t| t.opened_at.map(|created| (t, created)))
            .filter(|(_, created)| (position.created_at - *created).num_seconds().abs() <= MATCH_WINDOW.num_seconds())
            .filter(|(t, _)| open_count(t.bot_id) < max_open(t.bot_id))
            .min_by_key(|(_, created)| (position.created_at - *created).num_seconds().abs())
            .map(|(t, _)| t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Direction;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn position(deal_id: &str, symbol: &str, created_at: DateTime<Utc>) -> BrokerPosition {
        BrokerPosition {
            deal_id: deal_id.to_string(),
            epic: format!("EPIC.{symbol}"),
            symbol: symbol.to_string(),
            direction: Direction::Buy,
            size: dec!(1),
            entry_price: dec!(100),
            created_at,
        }
    }

    fn pending_trade(bot_id: Uuid, symbol: &str, opened_at: DateTime<Utc>) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            bot_id,
            credential_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            direction: Direction::Buy,
            quantity: dec!(1),
            entry_price: dec!(100),
            stop_loss: None,
            take_profit: None,
            current_price: None,
            status: TradeStatus::Pending,
            opened_at: Some(opened_at),
            closed_at: None,
            broker_deal_id: None,
            profit_loss: None,
            rationale: String::new(),
            ai_confidence: 0.0,
            evaluation_id: None,
        }
    }

    #[test]
    fn deal_id_match_wins_over_everything_else() {
        let ledger = PositionLedger::new();
        let now = Utc::now();
        let bot_id = Uuid::new_v4();
        let mut trade = pending_trade(bot_id, "EURUSD", now);
        trade.broker_deal_id = Some("D1".into());

        let pos = position("D1", "EURUSD", now);
        let ownership = ledger
            .attribute(&pos, &[trade], |_| 0, |_| 5, now)
            .unwrap();
        assert_eq!(ownership.provenance, OwnershipProvenance::DealIdMatch);
        assert_eq!(ownership.bot_id, bot_id);
    }

    #[test]
    fn time_symbol_size_match_within_window_and_under_cap() {
        let ledger = PositionLedger::new();
        let now = Utc::now();
        let bot_id = Uuid::new_v4();
        let trade = pending_trade(bot_id, "EURUSD", now - Duration::minutes(2));

        let pos = position("D2", "EURUSD", now);
        let ownership = ledger
            .attribute(&pos, &[trade], |_| 1, |_| 5, now)
            .unwrap();
        assert_eq!(ownership.provenance, OwnershipProvenance::TimeSymbolSizeMatch);
        assert_eq!(ownership.bot_id, bot_id);
    }

    #[test]
    fn refuses_when_candidate_bot_is_at_cap() {
        let ledger = PositionLedger::new();
        let now = Utc::now();
        let bot_id = Uuid::new_v4();
        let trade = pending_trade(bot_id, "EURUSD", now - Duration::minutes(1));

        let pos = position("D3", "EURUSD", now);
        let err = ledger.attribute(&pos, &[trade], |_| 5, |_| 5, now).unwrap_err();
        assert!(matches!(err, PositionLedgerError::Orphan { .. }));
    }

    #[test]
    fn refuses_outside_recovery_window() {
        let ledger = PositionLedger::new();
        let now = Utc::now();
        let bot_id = Uuid::new_v4();
        let trade = pending_trade(bot_id, "EURUSD", now - Duration::minutes(11));

        let pos = position("D4", "EURUSD", now - Duration::minutes(11));
        // position itself is 11 minutes old relative to "now" passed to attribute
        let err = ledger.attribute(&pos, &[trade], |_| 0, |_| 5, now).unwrap_err();
        assert!(matches!(err, PositionLedgerError::Orphan { .. }));
    }

    #[test]
    fn ownership_never_migrates_once_attributed() {
        let ledger = PositionLedger::new();
        let now = Utc::now();
        let first_owner = Uuid::new_v4();
        let second_owner = Uuid::new_v4();

        let mut first_trade = pending_trade(first_owner, "EURUSD", now);
        first_trade.broker_deal_id = Some("D5".into());
        let pos = position("D5", "EURUSD", now);
        ledger.attribute(&pos, &[first_trade], |_| 0, |_| 5, now).unwrap();

        let mut second_trade = pending_trade(second_owner, "EURUSD", now);
        second_trade.broker_deal_id = Some("D5".into());
        let re_attributed = ledger
            .attribute(&pos, &[second_trade], |_| 0, |_| 5, now + Duration::minutes(1))
            .unwrap();
        assert_eq!(re_attributed.bot_id, first_owner);
    }
}

use core_types::{Direction, ParsedRule, RuleType, Trade};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Finds the trade's enabled trailing-stop rule, if its strategy has one.
/// Only one is meaningful per trade; the parser never emits more than one
/// `TrailStop` rule per description.
pub fn trailing_rule(rules: &[ParsedRule]) -> Option<&ParsedRule> {
    rules.iter().find(|r| r.enabled && r.rule_type == RuleType::TrailStop)
}

/// Once unrealised P/L reaches the rule's threshold, moves the stop by the
/// same percentage in the favourable direction only — mirrors a single
/// trail-distance percent, the way `risk-manager`'s trailing-stop update
/// multiplies the highest price seen by one `trailing_stop_percent`. Never
/// widens an existing stop. Returns the new stop if one should be written.
pub fn next_stop_loss(trade: &Trade, rule: &ParsedRule, pnl_percent: f64, current_price: Decimal) -> Option<Decimal> {
    if pnl_percent < rule.trigger.value {
        return None;
    }
    let distance = Decimal::from_f64(rule.trigger.value).unwrap_or_default() / Decimal::from(100);

    match trade.direction {
        Direction::Buy => {
            let candidate = current_price * (Decimal::ONE - distance);
            match trade.stop_loss {
                Some(current_stop) if candidate <= current_stop => None,
                _ => Some(candidate),
            }
        }
        Direction::Sell => {
            let candidate = current_price * (Decimal::ONE + distance);
            match trade.stop_loss {
                Some(current_stop) if candidate >= current_stop => None,
                _ => Some(candidate),
            }
        }
    }
}

use core_types::{Direction, ParsedRule, RuleAction, RuleType, Trade, TriggerUnit};

/// What a fired rule asks the monitor to do. Distinct from `RuleAction` since
/// a firing also carries the rule's own parameters (e.g. the scale-out
/// fraction) the monitor needs to act on.
#[derive(Debug, Clone)]
pub enum RuleFire {
    CloseFull { reason: String },
    ClosePartial { scale_out_percent: f64, reason: String },
}

/// Minutes a trade has been open as of `now`. Trades reaching this function
/// are always OPEN, so `opened_at` is always set (§3 invariant).
pub fn minutes_in_position(trade: &Trade, now: chrono::DateTime<chrono::Utc>) -> f64 {
    let opened_at = trade.opened_at.expect("open trade carries opened_at");
    (now - opened_at).num_seconds() as f64 / 60.0
}

fn rule_holds(rule: &ParsedRule, pnl_percent: f64, minutes_open: f64, timeframe_minutes: i64) -> bool {
    if !rule.enabled {
        return false;
    }
    match rule.rule_type {
        RuleType::ExitAfterCandles => {
            let tf_minutes = rule
                .parameters
                .as_ref()
                .and_then(|p| p.get("timeframeMinutes"))
                .and_then(|v| v.as_i64())
                .unwrap_or(timeframe_minutes) as f64;
            minutes_open >= rule.trigger.value * tf_minutes
        }
        RuleType::ExitAfterTime => {
            let value_minutes = match rule.trigger.unit {
                TriggerUnit::Hours => rule.trigger.value * 60.0,
                _ => rule.trigger.value,
            };
            minutes_open >= value_minutes
        }
        RuleType::ExitOnProfit => pnl_percent >= rule.trigger.value,
        RuleType::ExitOnLoss => pnl_percent <= rule.trigger.value,
        RuleType::ScaleOut => pnl_percent >= rule.trigger.value,
        // Trailing stop isn't evaluated in descending-priority order; the
        // caller handles it as its own step.
        RuleType::TrailStop => false,
    }
}

/// Evaluates every enabled, non-trailing rule in descending priority order
/// and returns the first whose trigger holds. Ties keep the parser's
/// original ordering (`sort_by_key` is stable).
pub fn first_firing_rule(rules: &[ParsedRule], trade: &Trade, pnl_percent: f64, now: chrono::DateTime<chrono::Utc>, timeframe_minutes: i64) -> Option<RuleFire> {
    let minutes_open = minutes_in_position(trade, now);

    let mut ordered: Vec<&ParsedRule> = rules.iter().filter(|r| r.rule_type != RuleType::TrailStop).collect();
    ordered.sort_by_key(|r| std::cmp::Reverse(r.priority));

    for rule in ordered {
        if rule_holds(rule, pnl_percent, minutes_open, timeframe_minutes) {
            return Some(match rule.action {
                RuleAction::ClosePartial => RuleFire::ClosePartial {
                    scale_out_percent: rule
                        .parameters
                        .as_ref()
                        .and_then(|p| p.get("scaleOutPercent"))
                        .and_then(|v| v.as_f64())
                        .unwrap_or(50.0),
                    reason: format!("{:?}", rule.rule_type),
                },
                _ => RuleFire::CloseFull {
                    reason: format!("{:?}", rule.rule_type),
                },
            });
        }
    }
    None
}

/// Whether the current price has crossed the trade's stop-loss / take-profit
/// level. BUY: SL fires when `price ≤ sl`, TP when `price ≥ tp`. SELL mirrored.
pub fn stop_or_target_hit(trade: &Trade, price: rust_decimal::Decimal) -> Option<&'static str> {
    match trade.direction {
        Direction::Buy => {
            if trade.stop_loss.is_some_and(|sl| price <= sl) {
                return Some("stop loss");
            }
            if trade.take_profit.is_some_and(|tp| price >= tp) {
                return Some("take profit");
            }
        }
        Direction::Sell => {
            if trade.stop_loss.is_some_and(|sl| price >= sl) {
                return Some("stop loss");
            }
            if trade.take_profit.is_some_and(|tp| price <= tp) {
                return Some("take profit");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_types::{Condition, RuleTrigger, TradeStatus};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn trade(direction: Direction, opened_minutes_ago: i64) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            bot_id: Uuid::new_v4(),
            credential_id: Uuid::new_v4(),
            symbol: "EURUSD".into(),
            direction,
            quantity: dec!(1000),
            entry_price: dec!(1.1000),
            stop_loss: Some(dec!(1.0950)),
            take_profit: Some(dec!(1.1100)),
            current_price: None,
            status: TradeStatus::Open,
            opened_at: Some(chrono::Utc::now() - Duration::minutes(opened_minutes_ago)),
            closed_at: None,
            broker_deal_id: Some("D1".into()),
            profit_loss: None,
            rationale: String::new(),
            ai_confidence: 0.0,
            evaluation_id: None,
        }
    }

    fn candles_rule(value: f64, priority: u8, timeframe_minutes: i64) -> ParsedRule {
        ParsedRule {
            rule_type: RuleType::ExitAfterCandles,
            trigger: RuleTrigger {
                value,
                unit: TriggerUnit::Candles,
                condition: Some(Condition::GreaterThan),
            },
            action: RuleAction::CloseFull,
            parameters: Some(serde_json::json!({ "timeframeMinutes": timeframe_minutes })),
            priority,
            enabled: true,
            parser_version: 1,
        }
    }

    fn scale_out_rule(value: f64, priority: u8) -> ParsedRule {
        ParsedRule {
            rule_type: RuleType::ScaleOut,
            trigger: RuleTrigger {
                value,
                unit: TriggerUnit::Percent,
                condition: Some(Condition::GreaterThan),
            },
            action: RuleAction::ClosePartial,
            parameters: Some(serde_json::json!({ "scaleOutPercent": 50.0 })),
            priority,
            enabled: true,
            parser_version: 1,
        }
    }

    #[test]
    fn buy_stop_loss_fires_at_or_below_level() {
        let t = trade(Direction::Buy, 10);
        assert_eq!(stop_or_target_hit(&t, dec!(1.0950)), Some("stop loss"));
        assert_eq!(stop_or_target_hit(&t, dec!(1.0960)), None);
    }

    #[test]
    fn sell_take_profit_fires_at_or_below_level() {
        let mut t = trade(Direction::Sell, 10);
        t.take_profit = Some(dec!(1.0900));
        assert_eq!(stop_or_target_hit(&t, dec!(1.0900)), Some("take profit"));
    }

    #[test]
    fn higher_priority_rule_wins_even_if_a_lower_one_also_holds() {
        // Opened 45 minutes ago on M15 (3 candles = 45 min), exit-after-candles
        // priority 8 vs scale-out priority 5 also satisfied by profit.
        let t = trade(Direction::Buy, 45);
        let rules = vec![scale_out_rule(2.0, 5), candles_rule(3.0, 8, 15)];
        let fire = first_firing_rule(&rules, &t, 5.0, chrono::Utc::now(), 15);
        assert!(matches!(fire, Some(RuleFire::CloseFull { .. })));
    }

    #[test]
    fn rule_does_not_fire_before_its_threshold() {
        let t = trade(Direction::Buy, 44);
        let rules = vec![candles_rule(3.0, 8, 15)];
        assert!(first_firing_rule(&rules, &t, 0.0, chrono::Utc::now(), 15).is_none());
    }
}

use std::sync::LazyLock;

use core_types::{Condition, ParsedRule, RuleAction, RuleTrigger, RuleType, Timeframe, TriggerUnit};
use regex::Regex;

use crate::error::StrategyParseError;

/// Bumped whenever the pattern table below changes; stamped onto every
/// `ParsedRule` so stale parses (produced before a table change) can be
/// detected and re-parsed.
pub const RULE_SET_VERSION: u32 = 1;

const MAX_CANDLES: f64 = 100.0;
const MAX_PROFIT_TARGET_PERCENT: f64 = 50.0;
const MAX_LOSS_LIMIT_PERCENT: f64 = 20.0;
const DEFAULT_TRAIL_PERCENT: f64 = 2.0;
const DEFAULT_SCALE_OUT_PERCENT: f64 = 50.0;

static EXIT_AFTER_CANDLES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"close.*after\s+(\d+)\s+candles?").unwrap());
static EXIT_AFTER_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"close.*after\s+(\d+)\s+(minutes?|hours?)").unwrap());
static EXIT_ON_PROFIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:take profit|close)\s*(?:at|reaches)\s*(\d+(?:\.\d+)?)\s*%").unwrap());
static EXIT_ON_LOSS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:stop loss|close)\s*(?:at|exceeds)\s*(\d+(?:\.\d+)?)\s*%").unwrap());
static TRAIL_STOP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"trail(?:ing)?\s*stop").unwrap());
static SCALE_OUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:scale out|partial close)\s*(?:at|when)\s*(\d+(?:\.\d+)?)\s*%").unwrap());

static RISK_PER_TRADE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^risk\s+(\d+(?:\.\d+)?)\s*%\s*per\s*trade$").unwrap());
static RISK_STOP_LOSS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^stop loss\s+(\d+(?:\.\d+)?)\s*%$").unwrap());
static RISK_TAKE_PROFIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^take profit\s+(\d+(?:\.\d+)?)\s*%$").unwrap());

/// Risk-management defaults extracted separately from the ordered rule list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskDefaults {
    pub risk_per_trade_percent: Option<f64>,
    pub stop_loss_percent: Option<f64>,
    pub take_profit_percent: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ParsedStrategy {
    pub rules: Vec<ParsedRule>,
    pub risk_defaults: RiskDefaults,
}

fn normalize_line(line: &str) -> String {
    line.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '%')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a strategy's free-text description into an ordered rule list plus
/// risk defaults. Deterministic and idempotent: the same input always
/// produces the same output.
pub fn parse_strategy(description: &str, primary_timeframe: Timeframe) -> Result<ParsedStrategy, StrategyParseError> {
    if description.trim().is_empty() {
        return Err(StrategyParseError::Empty);
    }

    let mut rules = Vec::new();
    let mut risk_defaults = RiskDefaults::default();

    for raw_line in description.lines() {
        let line = normalize_line(raw_line);
        if line.is_empty() {
            continue;
        }

        if let Some(rule) = match_rule(&line, primary_timeframe) {
            rules.push(rule);
        }
        match_risk_defaults(&line, &mut risk_defaults);
    }

    Ok(ParsedStrategy { rules, risk_defaults })
}

fn match_rule(line: &str, primary_timeframe: Timeframe) -> Option<ParsedRule> {
    if let Some(caps) = EXIT_AFTER_CANDLES.captures(line) {
        let candles: f64 = caps[1].parse().ok()?;
        if candles > MAX_CANDLES {
            tracing::warn!(candles, "rejecting EXIT_AFTER_CANDLES rule, exceeds maximum");
            return None;
        }
        return Some(ParsedRule {
            rule_type: RuleType::ExitAfterCandles,
            trigger: RuleTrigger {
                value: candles,
                unit: TriggerUnit::Candles,
                condition: Some(Condition::GreaterThan),
            },
            action: RuleAction::CloseFull,
            parameters: Some(serde_json::json!({ "timeframeMinutes": primary_timeframe.to_minutes() })),
            priority: 8,
            enabled: true,
            parser_version: RULE_SET_VERSION,
        });
    }

    if let Some(caps) = EXIT_AFTER_TIME.captures(line) {
        let value: f64 = caps[1].parse().ok()?;
        let unit = if caps[2].starts_with("hour") {
            TriggerUnit::Hours
        } else {
            TriggerUnit::Minutes
        };
        return Some(ParsedRule {
            rule_type: RuleType::ExitAfterTime,
            trigger: RuleTrigger {
                value,
                unit,
                condition: Some(Condition::GreaterThan),
            },
            action: RuleAction::CloseFull,
            parameters: None,
            priority: 7,
            enabled: true,
            parser_version: RULE_SET_VERSION,
        });
    }

    if let Some(caps) = EXIT_ON_PROFIT.captures(line) {
        let value: f64 = caps[1].parse().ok()?;
        if value > MAX_PROFIT_TARGET_PERCENT {
            tracing::warn!(value, "rejecting EXIT_ON_PROFIT rule, exceeds maximum");
            return None;
        }
        return Some(ParsedRule {
            rule_type: RuleType::ExitOnProfit,
            trigger: RuleTrigger {
                value,
                unit: TriggerUnit::Percent,
                condition: Some(Condition::GreaterThan),
            },
            action: RuleAction::CloseFull,
            parameters: None,
            priority: 9,
            enabled: true,
            parser_version: RULE_SET_VERSION,
        });
    }

    if let Some(caps) = EXIT_ON_LOSS.captures(line) {
        let value: f64 = caps[1].parse().ok()?;
        if value.abs() > MAX_LOSS_LIMIT_PERCENT {
            tracing::warn!(value, "rejecting EXIT_ON_LOSS rule, exceeds maximum");
            return None;
        }
        return Some(ParsedRule {
            rule_type: RuleType::ExitOnLoss,
            trigger: RuleTrigger {
                value: -value,
                unit: TriggerUnit::Percent,
                condition: Some(Condition::LessThan),
            },
            action: RuleAction::CloseFull,
            parameters: None,
            priority: 10,
            enabled: true,
            parser_version: RULE_SET_VERSION,
        });
    }

    if TRAIL_STOP.is_match(line) {
        return Some(ParsedRule {
            rule_type: RuleType::TrailStop,
            trigger: RuleTrigger {
                value: DEFAULT_TRAIL_PERCENT,
                unit: TriggerUnit::Percent,
                condition: None,
            },
            action: RuleAction::ModifySl,
            parameters: None,
            priority: 6,
            enabled: true,
            parser_version: RULE_SET_VERSION,
        });
    }

    if let Some(caps) = SCALE_OUT.captures(line) {
        let value: f64 = caps[1].parse().ok()?;
        return Some(ParsedRule {
            rule_type: RuleType::ScaleOut,
            trigger: RuleTrigger {
                value,
                unit: TriggerUnit::Percent,
                condition: Some(Condition::GreaterThan),
            },
            action: RuleAction::ClosePartial,
            parameters: Some(serde_json::json!({ "scaleOutPercent": DEFAULT_SCALE_OUT_PERCENT })),
            priority: 5,
            enabled: true,
            parser_version: RULE_SET_VERSION,
        });
    }

    None
}

fn match_risk_defaults(line: &str, defaults: &mut RiskDefaults) {
    if let Some(caps) = RISK_PER_TRADE.captures(line) {
        if let Ok(v) = caps[1].parse() {
            defaults.risk_per_trade_percent = Some(v);
        }
    }
    if let Some(caps) = RISK_STOP_LOSS.captures(line) {
        if let Ok(v) = caps[1].parse() {
            defaults.stop_loss_percent = Some(v);
        }
    }
    if let Some(caps) = RISK_TAKE_PROFIT.captures(line) {
        if let Ok(v) = caps[1].parse() {
            defaults.take_profit_percent = Some(v);
        }
    }
}

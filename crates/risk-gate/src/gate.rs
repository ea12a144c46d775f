use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use core_types::{AssetClass, Bot};

use crate::market_hours::is_market_open;
use crate::portfolio::{PortfolioLimits, PortfolioSnapshot};

/// Everything the gate needs to judge one candidate trade. The caller (C1)
/// assembles this from the bot, its open trades, and the current portfolio
/// snapshot; the gate itself holds no state and makes no calls.
pub struct RiskGateRequest<'a> {
    pub bot: &'a Bot,
    pub has_credential: bool,
    pub open_trades: u32,
    pub has_open_trade_for_symbol: bool,
    pub has_pending_trade_for_symbol: bool,
    pub asset_class: AssetClass,
    pub now: DateTime<Utc>,
    pub requested_quantity: Decimal,
    pub portfolio: PortfolioSnapshot,
    pub limits: PortfolioLimits,
}

#[derive(Debug, Clone)]
pub struct RiskVerdict {
    pub approved: bool,
    pub adjusted_quantity: Option<Decimal>,
    pub risk_score: u8,
    pub reasons: Vec<String>,
}

/// Checks a candidate trade against active-bot preconditions, bot-local
/// limits, market timing, and portfolio-level limits. Accumulates every
/// failing reason rather than stopping at the first, since the caller
/// surfaces all of them to the user.
pub fn evaluate(req: &RiskGateRequest) -> RiskVerdict {
    let mut reasons = Vec::new();

    if req.portfolio.trading_halted {
        reasons.push("critical: trading is manually halted".to_string());
    }

    if !req.bot.is_active {
        reasons.push("bot is not active".to_string());
    }
    if !req.bot.ai_enabled {
        reasons.push("bot does not have AI trading enabled".to_string());
    }
    if !req.has_credential {
        reasons.push("bot has no credential".to_string());
    }

    if req.open_trades >= req.bot.max_open_trades {
        reasons.push(format!(
            "open trades {} at or above max_open_trades {}",
            req.open_trades, req.bot.max_open_trades
        ));
    }
    if req.has_open_trade_for_symbol {
        reasons.push(format!("an open trade already exists for {}", req.bot.symbol));
    }
    if req.has_pending_trade_for_symbol {
        reasons.push(format!("a pending trade already exists for {}", req.bot.symbol));
    }
    if !req.bot.interval_elapsed(req.now) {
        reasons.push("minimum interval between trades has not elapsed".to_string());
    }

    if !is_market_open(req.asset_class, req.now) {
        reasons.push(format!("{:?} market is closed at {}", req.asset_class, req.now));
    }

    if req.portfolio.current_risk_percent > req.limits.max_risk_per_trade_percent {
        reasons.push(format!(
            "current risk {:.1}% exceeds max risk per trade {:.1}%",
            req.portfolio.current_risk_percent, req.limits.max_risk_per_trade_percent
        ));
    }
    if req.portfolio.total_exposure_percent > req.limits.max_total_exposure_percent {
        reasons.push(format!(
            "total exposure {:.1}% exceeds max total exposure {:.1}%",
            req.portfolio.total_exposure_percent, req.limits.max_total_exposure_percent
        ));
    }
    if req.portfolio.drawdown_percent > req.limits.max_drawdown_percent {
        reasons.push(format!(
            "drawdown {:.1}% exceeds max drawdown {:.1}%",
            req.portfolio.drawdown_percent, req.limits.max_drawdown_percent
        ));
    }
    if req.portfolio.open_positions >= req.limits.max_open_positions {
        reasons.push(format!(
            "open positions {} at or above max_open_positions {}",
            req.portfolio.open_positions, req.limits.max_open_positions
        ));
    }
    if -req.portfolio.daily_pnl_percent > req.limits.max_daily_loss_percent {
        reasons.push(format!(
            "critical: daily loss {:.1}% exceeds max daily loss {:.1}%",
            -req.portfolio.daily_pnl_percent, req.limits.max_daily_loss_percent
        ));
    }
    if req.portfolio.consecutive_losses >= req.limits.max_consecutive_losses {
        reasons.push(format!(
            "critical: {} consecutive losses at or above limit {}",
            req.portfolio.consecutive_losses, req.limits.max_consecutive_losses
        ));
    }

    let approved = reasons.is_empty();

    let adjusted_quantity = if !approved
        && req.portfolio.total_exposure_percent > req.limits.max_total_exposure_percent
        && req.requested_quantity > Decimal::ZERO
    {
        let scale = (req.limits.max_total_exposure_percent / req.portfolio.total_exposure_percent).clamp(0.0, 1.0);
        Decimal::from_f64(scale).map(|s| req.requested_quantity * s)
    } else {
        None
    };

    RiskVerdict {
        approved,
        adjusted_quantity,
        risk_score: risk_score(req),
        reasons,
    }
}

fn risk_score(req: &RiskGateRequest) -> u8 {
    let ratios = [
        req.portfolio.current_risk_percent / req.limits.max_risk_per_trade_percent,
        req.portfolio.total_exposure_percent / req.limits.max_total_exposure_percent,
        req.portfolio.drawdown_percent / req.limits.max_drawdown_percent,
        (-req.portfolio.daily_pnl_percent).max(0.0) / req.limits.max_daily_loss_percent,
    ];
    let worst = ratios.iter().cloned().fold(0.0_f64, f64::max);
    (1.0 + worst.min(1.0) * 9.0).round().clamp(1.0, 10.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::Timeframe;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn base_bot() -> Bot {
        Bot {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            credential_id: Uuid::new_v4(),
            strategy_id: Uuid::new_v4(),
            symbol: "BTCUSD".into(),
            timeframe: Timeframe::H1,
            is_active: true,
            ai_enabled: true,
            max_open_trades: 2,
            min_interval_between_trades: chrono::Duration::minutes(5),
            last_eval_at: None,
            last_trade_at: None,
        }
    }

    fn healthy_portfolio() -> PortfolioSnapshot {
        PortfolioSnapshot {
            current_risk_percent: 1.0,
            total_exposure_percent: 10.0,
            drawdown_percent: 2.0,
            open_positions: 1,
            daily_pnl_percent: 0.5,
            consecutive_losses: 0,
            trading_halted: false,
        }
    }

    fn base_request(bot: &Bot) -> RiskGateRequest<'_> {
        RiskGateRequest {
            bot,
            has_credential: true,
            open_trades: 0,
            has_open_trade_for_symbol: false,
            has_pending_trade_for_symbol: false,
            asset_class: AssetClass::Crypto,
            now: Utc.with_ymd_and_hms(2026, 7, 30, 12, 0, 0).unwrap(),
            requested_quantity: dec!(1),
            portfolio: healthy_portfolio(),
            limits: PortfolioLimits::default(),
        }
    }

    #[test]
    fn approves_healthy_request() {
        let bot = base_bot();
        let verdict = evaluate(&base_request(&bot));
        assert!(verdict.approved);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn rejects_inactive_bot() {
        let mut bot = base_bot();
        bot.is_active = false;
        let verdict = evaluate(&base_request(&bot));
        assert!(!verdict.approved);
        assert!(verdict.reasons.iter().any(|r| r.contains("not active")));
    }

    #[test]
    fn rejects_and_suggests_adjusted_quantity_on_exposure_breach() {
        let bot = base_bot();
        let mut req = base_request(&bot);
        req.portfolio.total_exposure_percent = 40.0;
        let verdict = evaluate(&req);
        assert!(!verdict.approved);
        assert!(verdict.adjusted_quantity.is_some());
        assert!(verdict.adjusted_quantity.unwrap() < dec!(1));
    }

    #[test]
    fn circuit_breaker_reasons_are_marked_critical() {
        let bot = base_bot();
        let mut req = base_request(&bot);
        req.portfolio.consecutive_losses = 5;
        let verdict = evaluate(&req);
        assert!(verdict.reasons.iter().any(|r| r.starts_with("critical:")));
    }

    #[test]
    fn risk_score_climbs_with_exposure() {
        let bot = base_bot();
        let mut calm = base_request(&bot);
        calm.portfolio.total_exposure_percent = 5.0;
        let mut hot = base_request(&bot);
        hot.portfolio.total_exposure_percent = 19.0;
        assert!(evaluate(&hot).risk_score >= evaluate(&calm).risk_score);
    }
}

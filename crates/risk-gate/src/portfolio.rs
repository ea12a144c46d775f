/// Portfolio-wide snapshot fed into the gate by the caller; this crate never
/// computes it from raw positions, it only judges the numbers it's given.
#[derive(Debug, Clone, Copy)]
pub struct PortfolioSnapshot {
    pub current_risk_percent: f64,
    pub total_exposure_percent: f64,
    pub drawdown_percent: f64,
    pub open_positions: u32,
    pub daily_pnl_percent: f64,
    pub consecutive_losses: u32,
    pub trading_halted: bool,
}

/// Portfolio-level limits. Defaults match the 2%/20%/15%/5/5%/3 table.
#[derive(Debug, Clone, Copy)]
pub struct PortfolioLimits {
    pub max_risk_per_trade_percent: f64,
    pub max_total_exposure_percent: f64,
    pub max_drawdown_percent: f64,
    pub max_open_positions: u32,
    pub max_daily_loss_percent: f64,
    pub max_consecutive_losses: u32,
}

impl Default for PortfolioLimits {
    fn default() -> Self {
        Self {
            max_risk_per_trade_percent: 2.0,
            max_total_exposure_percent: 20.0,
            max_drawdown_percent: 15.0,
            max_open_positions: 5,
            max_daily_loss_percent: 5.0,
            max_consecutive_losses: 3,
        }
    }
}

pub mod gate;
pub mod market_hours;
pub mod portfolio;

pub use gate::{evaluate, RiskGateRequest, RiskVerdict};
pub use market_hours::is_market_open;
pub use portfolio::{PortfolioLimits, PortfolioSnapshot};

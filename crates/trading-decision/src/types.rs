use core_types::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Everything the LLM call is handed: the current price (may be unknown), a
/// prose summary of market conditions embedding the L6 read, and the agent
/// side-panels the teacher's `UnifiedAnalysis` bundled per-engine.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRequest {
    pub symbol: String,
    pub current_price: Option<Decimal>,
    pub market_conditions: String,
    pub risk_panel: String,
    pub technicals_panel: String,
    pub portfolio_panel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_image_base64: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTradeParams {
    pub direction: Direction,
    pub order_type: String,
    pub quantity: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLlmResponse {
    pub decision: String,
    pub confidence: f64,
    pub reasoning: String,
    pub trade_params: Option<RawTradeParams>,
}

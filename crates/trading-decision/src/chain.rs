use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use core_types::{Decision, TradeParams};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::TradingDecisionError;
use crate::provider::LlmDecisionProvider;
use crate::types::DecisionRequest;

const DECISION_DEADLINE: Duration = Duration::from_secs(60);
const NO_PRICE_CONFIDENCE_CAP: f64 = 65.0;

pub struct DecisionOutcome {
    pub decision: Decision,
    pub confidence: f64,
    pub reasoning: String,
    pub trade_params: Option<TradeParams>,
}

impl DecisionOutcome {
    fn hold(reasoning: impl Into<String>) -> Self {
        Self {
            decision: Decision::Hold,
            confidence: 0.0,
            reasoning: reasoning.into(),
            trade_params: None,
        }
    }
}

/// Pure orchestration over the LLM call: owns the 60s deadline, the
/// fallback-price estimate when the broker has no live price, and the
/// resulting confidence clamp. Never calls the LLM's internals directly.
pub struct TradingDecisionChain {
    provider: Arc<dyn LlmDecisionProvider>,
    base_prices: HashMap<String, Decimal>,
}

impl TradingDecisionChain {
    pub fn new(provider: Arc<dyn LlmDecisionProvider>, base_prices: HashMap<String, Decimal>) -> Self {
        Self { provider, base_prices }
    }

    fn fallback_price(&self, symbol: &str, recent_close: Option<Decimal>) -> Decimal {
        recent_close
            .or_else(|| self.base_prices.get(symbol).copied())
            .unwrap_or(dec!(1))
    }

    pub async fn decide(&self, request: DecisionRequest, recent_close: Option<Decimal>) -> Result<DecisionOutcome, TradingDecisionError> {
        let had_price = request.current_price.is_some();
        let symbol = request.symbol.clone();

        let raw = match tokio::time::timeout(DECISION_DEADLINE, self.provider.complete(&request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                tracing::warn!(symbol, "LLM decision call timed out, treating as HOLD");
                return Ok(DecisionOutcome::hold("LLM call exceeded 60s deadline"));
            }
        };

        let decision = match raw.decision.as_str() {
            "EXECUTE_TRADE" => Decision::ExecuteTrade,
            "ABORT" => Decision::Abort,
            _ => Decision::Hold,
        };

        let mut confidence = raw.confidence;
        let trade_params = raw.trade_params.map(|p| TradeParams {
            symbol: symbol.clone(),
            direction: p.direction,
            order_type: p.order_type,
            quantity: p.quantity,
            stop_loss: p.stop_loss,
            take_profit: p.take_profit,
        });

        if decision == Decision::ExecuteTrade && !had_price {
            let estimated = self.fallback_price(&symbol, recent_close);
            tracing::warn!(symbol, %estimated, "no live price, using fallback estimate for EXECUTE_TRADE");
            confidence = confidence.min(NO_PRICE_CONFIDENCE_CAP);
        }

        Ok(DecisionOutcome {
            decision,
            confidence,
            reasoning: raw.reasoning,
            trade_params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawLlmResponse;
    use async_trait::async_trait;

    struct FixedProvider(RawLlmResponse);
    #[async_trait]
    impl LlmDecisionProvider for FixedProvider {
        async fn complete(&self, _request: &DecisionRequest) -> Result<RawLlmResponse, TradingDecisionError> {
            Ok(self.0.clone())
        }
    }

    struct StallingProvider;
    #[async_trait]
    impl LlmDecisionProvider for StallingProvider {
        async fn complete(&self, _request: &DecisionRequest) -> Result<RawLlmResponse, TradingDecisionError> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            unreachable!()
        }
    }

    fn base_request(current_price: Option<Decimal>) -> DecisionRequest {
        DecisionRequest {
            symbol: "EURUSD".into(),
            current_price,
            market_conditions: String::new(),
            risk_panel: String::new(),
            technicals_panel: String::new(),
            portfolio_panel: String::new(),
            chart_image_base64: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_hold() {
        let chain = TradingDecisionChain::new(Arc::new(StallingProvider), HashMap::new());
        let outcome = chain.decide(base_request(Some(dec!(1.1))), None).await.unwrap();
        assert_eq!(outcome.decision, Decision::Hold);
    }

    #[tokio::test]
    async fn missing_price_clamps_confidence() {
        let raw = RawLlmResponse {
            decision: "EXECUTE_TRADE".into(),
            confidence: 90.0,
            reasoning: "strong setup".into(),
            trade_params: None,
        };
        let chain = TradingDecisionChain::new(Arc::new(FixedProvider(raw)), HashMap::new());
        let outcome = chain.decide(base_request(None), Some(dec!(1.05))).await.unwrap();
        assert_eq!(outcome.decision, Decision::ExecuteTrade);
        assert!(outcome.confidence <= NO_PRICE_CONFIDENCE_CAP);
    }
}

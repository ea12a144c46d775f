use core_types::OrchestrationError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum TradingDecisionError {
    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl From<TradingDecisionError> for OrchestrationError {
    fn from(e: TradingDecisionError) -> Self {
        OrchestrationError::AnalysisTimedOut(e.to_string())
    }
}

use core_types::OrchestrationError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StrategyParseError {
    #[error("strategy description is empty")]
    Empty,
}

impl From<StrategyParseError> for OrchestrationError {
    fn from(e: StrategyParseError) -> Self {
        OrchestrationError::InvalidInput(e.to_string())
    }
}

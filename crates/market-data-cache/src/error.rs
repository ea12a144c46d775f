use core_types::OrchestrationError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum MarketDataError {
    #[error("no market data available for {0}")]
    Unavailable(String),
}

impl From<MarketDataError> for OrchestrationError {
    fn from(e: MarketDataError) -> Self {
        match e {
            MarketDataError::Unavailable(s) => OrchestrationError::DataUnavailable(s),
        }
    }
}

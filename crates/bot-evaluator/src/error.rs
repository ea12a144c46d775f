use bot_coordinator::BotCoordinatorError;
use broker_gateway::BrokerError;
use core_types::OrchestrationError;
use market_data_cache::MarketDataError;
use thiserror::Error;
use trading_decision::TradingDecisionError;

#[derive(Error, Debug, Clone)]
pub enum BotEvaluatorError {
    #[error("bot is inactive")]
    Inactive,

    #[error(transparent)]
    Admission(#[from] BotCoordinatorError),

    #[error("evaluation store error: {0}")]
    Store(String),

    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Decision(#[from] TradingDecisionError),
}

impl From<BotEvaluatorError> for OrchestrationError {
    fn from(e: BotEvaluatorError) -> Self {
        match e {
            BotEvaluatorError::Inactive => OrchestrationError::InvalidInput("bot is inactive".into()),
            BotEvaluatorError::Admission(inner) => inner.into(),
            BotEvaluatorError::Store(s) => OrchestrationError::Fatal(s),
            BotEvaluatorError::MarketData(inner) => inner.into(),
            BotEvaluatorError::Broker(inner) => inner.into(),
            BotEvaluatorError::Decision(inner) => inner.into(),
        }
    }
}

pub mod chain;
pub mod error;
pub mod provider;
pub mod types;

pub use chain::{DecisionOutcome, TradingDecisionChain};
pub use error::TradingDecisionError;
pub use provider::{HttpLlmProvider, LlmDecisionProvider};
pub use types::{DecisionRequest, RawLlmResponse, RawTradeParams};

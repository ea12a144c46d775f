pub mod client;
pub mod epic;
pub mod error;
pub mod gateway;
pub mod retry;
pub mod types;

pub use client::{BinanceClient, CapitalClient, CoinbaseClient, CustomClient};
pub use error::BrokerError;
pub use gateway::BrokerGateway;
pub use types::*;

pub mod bots;
mod codec;
pub mod credentials;
pub mod error;
pub mod evaluation_store;
pub mod ownership;
pub mod performance;
pub mod pool;
pub mod position_store;
mod rows;
pub mod strategies;
#[cfg(test)]
mod test_support;

pub use error::PersistenceError;
pub use evaluation_store::SqlEvaluationStore;
pub use pool::{connect, init_schema};
pub use position_store::SqlPositionStore;
pub use rows::PerformanceSnapshot;

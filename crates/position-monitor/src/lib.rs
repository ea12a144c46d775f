pub mod error;
pub mod monitor;
pub mod rules;
pub mod store;
pub mod trailing;

pub use error::PositionMonitorError;
pub use monitor::{PositionMonitor, SyncReport, TickReport};
pub use store::{MonitoredTrade, PositionStore};

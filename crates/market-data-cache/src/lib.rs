pub mod cache;
pub mod error;
pub mod source;

pub use cache::{Fetched, MarketDataCache};
pub use error::MarketDataError;
pub use source::MarketDataSource;

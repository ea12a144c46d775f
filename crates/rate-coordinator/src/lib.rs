pub mod coordinator;
pub mod error;
pub mod queue;

pub use coordinator::{RateCoordinator, RateLease};
pub use error::RateCoordinatorError;

pub mod error;
pub mod ledger;

pub use error::PositionLedgerError;
pub use ledger::PositionLedger;

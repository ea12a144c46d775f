use core_types::OrchestrationError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PositionLedgerError {
    #[error("position {deal_id} could not be attributed to any bot")]
    Orphan { deal_id: String },
}

impl From<PositionLedgerError> for OrchestrationError {
    fn from(e: PositionLedgerError) -> Self {
        OrchestrationError::OwnershipAmbiguous(e.to_string())
    }
}

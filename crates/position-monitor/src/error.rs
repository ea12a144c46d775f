use broker_gateway::BrokerError;
use core_types::OrchestrationError;
use position_ledger::PositionLedgerError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PositionMonitorError {
    #[error("no broker session registered for credential {0}")]
    NoSession(uuid::Uuid),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Ledger(#[from] PositionLedgerError),

    #[error("position store error: {0}")]
    Store(String),
}

impl From<PositionMonitorError> for OrchestrationError {
    fn from(e: PositionMonitorError) -> Self {
        match e {
            PositionMonitorError::NoSession(id) => OrchestrationError::InvalidInput(format!("no broker session for credential {id}")),
            PositionMonitorError::Broker(inner) => inner.into(),
            PositionMonitorError::Ledger(inner) => inner.into(),
            PositionMonitorError::Store(s) => OrchestrationError::Fatal(s),
        }
    }
}

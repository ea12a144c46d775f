use core_types::OrchestrationError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    #[error("broker returned 401/expired session")]
    Unauthorized,

    #[error("broker rate limited the request")]
    RateLimited,

    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("unknown broker kind: {0}")]
    UnknownKind(String),

    #[error("symbol could not be resolved to an epic: {0}")]
    EpicResolutionFailed(String),
}

impl From<BrokerError> for OrchestrationError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::RateLimited => OrchestrationError::RateLimited(e.to_string()),
            BrokerError::Unauthorized => OrchestrationError::Unauthorized(e.to_string()),
            BrokerError::Unavailable(_) => OrchestrationError::BrokerUnavailable(e.to_string()),
            BrokerError::UnknownKind(_) => OrchestrationError::Fatal(e.to_string()),
            BrokerError::EpicResolutionFailed(_) => OrchestrationError::DataUnavailable(e.to_string()),
        }
    }
}

use core_types::OrchestrationError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RateCoordinatorError {
    #[error("admission deadline exceeded waiting for credential {0}")]
    AdmissionTimeout(String),

    #[error("credential {0} is in a rate-limit cooldown")]
    InCooldown(String),
}

impl From<RateCoordinatorError> for OrchestrationError {
    fn from(e: RateCoordinatorError) -> Self {
        match e {
            RateCoordinatorError::AdmissionTimeout(s) => OrchestrationError::AdmissionTimeout(s),
            RateCoordinatorError::InCooldown(s) => OrchestrationError::RateLimited(s),
        }
    }
}

use core_types::OrchestrationError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BotCoordinatorError {
    #[error("bot {0} is already executing")]
    AlreadyExecuting(uuid::Uuid),

    #[error("credential {0} has reached the concurrent-schedule cap")]
    CredentialSaturated(uuid::Uuid),
}

impl From<BotCoordinatorError> for OrchestrationError {
    fn from(e: BotCoordinatorError) -> Self {
        OrchestrationError::RateLimited(e.to_string())
    }
}

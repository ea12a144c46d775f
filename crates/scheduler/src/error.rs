use bot_coordinator::BotCoordinatorError;
use core_types::OrchestrationError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SchedulerError {
    #[error(transparent)]
    Coordinator(#[from] BotCoordinatorError),

    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

impl From<SchedulerError> for OrchestrationError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Coordinator(inner) => inner.into(),
            SchedulerError::Dispatch(s) => OrchestrationError::Fatal(s),
        }
    }
}

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::SchedulerError;

/// Hands a due bot off to whatever actually runs its evaluation — implemented
/// by the orchestration binary, which owns the Bot Evaluator and the broker
/// sessions the wheel itself has no business touching.
#[async_trait]
pub trait EvaluationDispatcher: Send + Sync {
    async fn dispatch(&self, bot_id: Uuid, credential_id: Uuid) -> Result<(), SchedulerError>;
}

use std::sync::Arc;

use async_trait::async_trait;
use bot_evaluator::BotEvaluator;
use scheduler::{EvaluationDispatcher, SchedulerError};
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Hands a due bot off to the real evaluator. Bounds total concurrent
/// evaluations across every credential with a single semaphore — a backstop
/// independent of `bot-coordinator`'s per-credential cap and `scheduler`'s
/// own per-tick batch cap, sized by `MAX_CONCURRENT_EVALUATIONS`.
pub struct EvaluatorDispatcher {
    evaluator: Arc<BotEvaluator>,
    permits: Arc<Semaphore>,
}

impl EvaluatorDispatcher {
    pub fn new(evaluator: Arc<BotEvaluator>, max_concurrent: usize) -> Self {
        Self {
            evaluator,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }
}

#[async_trait]
impl EvaluationDispatcher for EvaluatorDispatcher {
    async fn dispatch(&self, bot_id: Uuid, credential_id: Uuid) -> Result<(), SchedulerError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SchedulerError::Dispatch(e.to_string()))?;

        match self.evaluator.evaluate(bot_id).await {
            Ok(evaluation) => {
                tracing::info!(%bot_id, %credential_id, decision = ?evaluation.decision, "evaluation complete");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%bot_id, %credential_id, error = %e, "evaluation attempt failed");
                Err(SchedulerError::Dispatch(e.to_string()))
            }
        }
    }
}

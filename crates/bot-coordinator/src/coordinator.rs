use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::BotCoordinatorError;

const HARD_CAP_PER_CREDENTIAL: usize = 8;
const WARN_THRESHOLD_PER_CREDENTIAL: usize = 5;
const DEFAULT_MIN_GAP: Duration = Duration::from_secs(30);
const MIN_GAP_JITTER: Duration = Duration::from_millis(2000);

/// Small broker-of-brokers sitting in front of the rate coordinator. Holds
/// the authoritative `botId → credentialId` map and decides which bot may
/// start an evaluation next, entirely in memory — a restart rebuilds every
/// map empty, so no bot is ever considered "still executing" across a crash.
pub struct BotCoordinator {
    credential_of: DashMap<Uuid, Uuid>,
    executing: DashMap<Uuid, ()>,
    scheduled_per_credential: DashMap<Uuid, HashSet<Uuid>>,
    last_started_per_credential: DashMap<Uuid, Instant>,
    gap_lock: Mutex<()>,
    min_gap: Duration,
}

impl Default for BotCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_GAP)
    }
}

impl BotCoordinator {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            credential_of: DashMap::new(),
            executing: DashMap::new(),
            scheduled_per_credential: DashMap::new(),
            last_started_per_credential: DashMap::new(),
            gap_lock: Mutex::new(()),
            min_gap,
        }
    }

    pub fn register_bot(&self, bot_id: Uuid, credential_id: Uuid) {
        self.credential_of.insert(bot_id, credential_id);
    }

    pub fn credential_for(&self, bot_id: Uuid) -> Option<Uuid> {
        self.credential_of.get(&bot_id).map(|e| *e)
    }

    /// Admit `bot_id` to run one evaluation against `credential_id`. Rejects
    /// immediately if the bot is already mid-execution or the credential is
    /// at its hard cap; otherwise sleeps out any remaining jittered min-gap
    /// before granting.
    pub async fn request_bot_execution(
        &self,
        bot_id: Uuid,
        credential_id: Uuid,
    ) -> Result<(), BotCoordinatorError> {
        if self.executing.contains_key(&bot_id) {
            return Err(BotCoordinatorError::AlreadyExecuting(bot_id));
        }

        {
            let scheduled = self
                .scheduled_per_credential
                .entry(credential_id)
                .or_default();
            if scheduled.len() >= HARD_CAP_PER_CREDENTIAL {
                return Err(BotCoordinatorError::CredentialSaturated(credential_id));
            }
            if scheduled.len() >= WARN_THRESHOLD_PER_CREDENTIAL {
                tracing::warn!(
                    %credential_id,
                    scheduled = scheduled.len(),
                    "credential approaching concurrent-schedule cap"
                );
            }
        }

        // Serialise the gap check so two bots racing for the same credential
        // can't both read "no wait needed" and start together.
        let _guard = self.gap_lock.lock().await;
        if let Some(last) = self.last_started_per_credential.get(&credential_id).map(|e| *e) {
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..MIN_GAP_JITTER.as_millis() as u64));
            let required_gap = self.min_gap + jitter;
            let elapsed = last.elapsed();
            if elapsed < required_gap {
                tokio::time::sleep(required_gap - elapsed).await;
            }
        }

        self.executing.insert(bot_id, ());
        self.scheduled_per_credential
            .entry(credential_id)
            .or_default()
            .insert(bot_id);
        self.last_started_per_credential.insert(credential_id, Instant::now());

        Ok(())
    }

    pub fn complete_bot_execution(&self, bot_id: Uuid, credential_id: Uuid) {
        self.executing.remove(&bot_id);
        if let Some(mut scheduled) = self.scheduled_per_credential.get_mut(&credential_id) {
            scheduled.remove(&bot_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rejects_bot_already_executing() {
        let coordinator = BotCoordinator::new(Duration::from_millis(10));
        let bot = Uuid::new_v4();
        let credential = Uuid::new_v4();

        coordinator.request_bot_execution(bot, credential).await.unwrap();
        let err = coordinator.request_bot_execution(bot, credential).await.unwrap_err();
        assert!(matches!(err, BotCoordinatorError::AlreadyExecuting(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_beyond_hard_cap_per_credential() {
        let coordinator = BotCoordinator::new(Duration::from_millis(0));
        let credential = Uuid::new_v4();

        for _ in 0..HARD_CAP_PER_CREDENTIAL {
            let bot = Uuid::new_v4();
            coordinator.request_bot_execution(bot, credential).await.unwrap();
        }

        let overflow_bot = Uuid::new_v4();
        let err = coordinator
            .request_bot_execution(overflow_bot, credential)
            .await
            .unwrap_err();
        assert!(matches!(err, BotCoordinatorError::CredentialSaturated(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn completing_execution_frees_the_slot() {
        let coordinator = BotCoordinator::new(Duration::from_millis(0));
        let bot = Uuid::new_v4();
        let credential = Uuid::new_v4();

        coordinator.request_bot_execution(bot, credential).await.unwrap();
        coordinator.complete_bot_execution(bot, credential);
        coordinator.request_bot_execution(bot, credential).await.unwrap();
    }
}

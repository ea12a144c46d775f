use std::sync::Arc;

use bot_coordinator::BotCoordinator;
use chrono::{DateTime, Utc};
use core_types::Timeframe;
use dashmap::DashMap;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::dispatcher::EvaluationDispatcher;
use crate::wheel::{next_boundary, BotSchedule};

/// Upper bound on bots admitted per tick, the scheduler's own CPU-bound
/// liveness cap independent of the per-credential caps the coordinator
/// enforces.
const MAX_SCHEDULE_BATCH: usize = 256;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub due: u32,
    pub dispatched: u32,
    pub dropped: u32,
}

/// Timer wheel keyed by `(botId, timeframe)`. `tick` fires every due bot's
/// evaluation through the bot coordinator's admission gate; a bot whose prior
/// evaluation is still in flight is rejected by the coordinator
/// (`AlreadyExecuting`) and its overdue tick is dropped rather than queued —
/// there is never more than one pending tick per bot. Grounded on the trading
/// agent's periodic scan loop, generalised from one fixed interval to
/// per-bot timeframe cadences, and on a condition-scheduler's bounded
/// per-tick fan-out.
pub struct Scheduler {
    coordinator: Arc<BotCoordinator>,
    dispatcher: Arc<dyn EvaluationDispatcher>,
    schedules: DashMap<Uuid, BotSchedule>,
}

impl Scheduler {
    pub fn new(coordinator: Arc<BotCoordinator>, dispatcher: Arc<dyn EvaluationDispatcher>) -> Self {
        Self {
            coordinator,
            dispatcher,
            schedules: DashMap::new(),
        }
    }

    /// Registers (or re-registers) a bot's cadence, arming its first due time
    /// at the next timeframe boundary from `now`.
    pub fn register_bot(&self, bot_id: Uuid, credential_id: Uuid, timeframe: Timeframe, now: DateTime<Utc>) {
        self.coordinator.register_bot(bot_id, credential_id);
        self.schedules.insert(
            bot_id,
            BotSchedule {
                credential_id,
                timeframe,
                next_due: next_boundary(now, timeframe),
            },
        );
    }

    pub fn unregister_bot(&self, bot_id: Uuid) {
        self.schedules.remove(&bot_id);
    }

    pub fn next_due_at(&self, bot_id: Uuid) -> Option<DateTime<Utc>> {
        self.schedules.get(&bot_id).map(|e| e.next_due)
    }

    pub fn scheduled_bot_count(&self) -> usize {
        self.schedules.len()
    }

    /// Runs one wheel tick. Every overdue bot is re-armed for its next
    /// boundary immediately, regardless of whether this tick admits it, so a
    /// dropped or slow tick never causes a tight retry loop. Admission and
    /// dispatch then run concurrently across the due set.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut due: Vec<(Uuid, Uuid)> = Vec::new();
        for mut entry in self.schedules.iter_mut() {
            if entry.next_due <= now {
                let bot_id = *entry.key();
                let credential_id = entry.credential_id;
                entry.next_due = next_boundary(now, entry.timeframe);
                due.push((bot_id, credential_id));
            }
        }

        let mut report = TickReport {
            due: due.len() as u32,
            ..Default::default()
        };

        if due.len() > MAX_SCHEDULE_BATCH {
            let overflow = due.split_off(MAX_SCHEDULE_BATCH);
            tracing::warn!(
                total = report.due,
                capacity = MAX_SCHEDULE_BATCH,
                "scheduler tick exceeds per-tick batch cap, dropping overflow"
            );
            report.dropped += overflow.len() as u32;
        }

        if due.is_empty() {
            return report;
        }

        let mut tasks = JoinSet::new();
        for (bot_id, credential_id) in due {
            let coordinator = Arc::clone(&self.coordinator);
            let dispatcher = Arc::clone(&self.dispatcher);
            tasks.spawn(async move {
                match coordinator.request_bot_execution(bot_id, credential_id).await {
                    Ok(()) => {
                        let result = dispatcher.dispatch(bot_id, credential_id).await;
                        coordinator.complete_bot_execution(bot_id, credential_id);
                        if let Err(e) = result {
                            tracing::warn!(%bot_id, "evaluation dispatch failed: {}", e);
                        }
                        true
                    }
                    Err(e) => {
                        tracing::debug!(%bot_id, "tick dropped: {}", e);
                        false
                    }
                }
            });
        }

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(true) => report.dispatched += 1,
                Ok(false) => report.dropped += 1,
                Err(e) => {
                    tracing::error!("scheduler task panicked: {}", e);
                    report.dropped += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration as StdDuration;

    struct CountingDispatcher {
        calls: AtomicU32,
        fail_next: std::sync::atomic::AtomicBool,
    }

    impl CountingDispatcher {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_next: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl EvaluationDispatcher for CountingDispatcher {
        async fn dispatch(&self, _bot_id: Uuid, _credential_id: Uuid) -> Result<(), SchedulerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(SchedulerError::Dispatch("simulated failure".into()));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_a_due_bot_exactly_once() {
        let coordinator = Arc::new(BotCoordinator::new(StdDuration::from_millis(0)));
        let dispatcher = Arc::new(CountingDispatcher::new());
        let scheduler = Scheduler::new(coordinator, dispatcher.clone());

        let bot_id = Uuid::new_v4();
        let credential_id = Uuid::new_v4();
        let now = Utc::now();
        scheduler.register_bot(bot_id, credential_id, Timeframe::M1, now);

        let due_at = scheduler.next_due_at(bot_id).unwrap();
        let report = scheduler.tick(due_at).await;
        assert_eq!(report.due, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);

        // Not due again immediately.
        let report = scheduler.tick(due_at).await;
        assert_eq!(report.due, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn re_arms_for_the_next_boundary_after_a_tick() {
        let coordinator = Arc::new(BotCoordinator::new(StdDuration::from_millis(0)));
        let dispatcher = Arc::new(CountingDispatcher::new());
        let scheduler = Scheduler::new(coordinator, dispatcher);

        let bot_id = Uuid::new_v4();
        let credential_id = Uuid::new_v4();
        let now = Utc::now();
        scheduler.register_bot(bot_id, credential_id, Timeframe::M1, now);

        let first_due = scheduler.next_due_at(bot_id).unwrap();
        scheduler.tick(first_due).await;
        let next_due = scheduler.next_due_at(bot_id).unwrap();
        assert!(next_due > first_due);
    }

    #[tokio::test(start_paused = true)]
    async fn a_dispatch_failure_still_frees_the_bot_for_the_next_tick() {
        let coordinator = Arc::new(BotCoordinator::new(StdDuration::from_millis(0)));
        let dispatcher = Arc::new(CountingDispatcher::new());
        dispatcher.fail_next.store(true, Ordering::SeqCst);
        let scheduler = Scheduler::new(coordinator.clone(), dispatcher.clone());

        let bot_id = Uuid::new_v4();
        let credential_id = Uuid::new_v4();
        let now = Utc::now();
        scheduler.register_bot(bot_id, credential_id, Timeframe::M1, now);

        let due_at = scheduler.next_due_at(bot_id).unwrap();
        let report = scheduler.tick(due_at).await;
        // dispatch failed, but the bot is still counted dispatched (admitted)
        // and the coordinator slot was freed regardless.
        assert_eq!(report.dispatched, 1);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);

        coordinator.request_bot_execution(bot_id, credential_id).await.unwrap();
    }
}

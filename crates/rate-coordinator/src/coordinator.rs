use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use crate::error::RateCoordinatorError;
use crate::queue::PendingAdmission;

const DEFAULT_MIN_GAP: Duration = Duration::from_millis(500);
const COOLDOWN_BASE: Duration = Duration::from_secs(2);
const COOLDOWN_MAX_DOUBLINGS: u32 = 5;

struct CredentialGate {
    max_concurrent: u32,
    in_flight: Mutex<u32>,
    last_started_at: Mutex<Option<Instant>>,
    cooldown_until: Mutex<Option<Instant>>,
    cooldown_attempts: AtomicU32,
    waiters: Mutex<BinaryHeap<PendingAdmission>>,
    seq: AtomicU64,
}

impl CredentialGate {
    fn new(max_concurrent: u32) -> Self {
        Self {
            max_concurrent,
            in_flight: Mutex::new(0),
            last_started_at: Mutex::new(None),
            cooldown_until: Mutex::new(None),
            cooldown_attempts: AtomicU32::new(0),
            waiters: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
        }
    }

    async fn wait_out_cooldown(&self, deadline: Instant) -> Result<(), RateCoordinatorError> {
        let until = *self.cooldown_until.lock().await;
        if let Some(until) = until {
            let now = Instant::now();
            if until > now {
                if until > deadline {
                    return Err(RateCoordinatorError::InCooldown(
                        "cooldown extends past admission deadline".into(),
                    ));
                }
                tokio::time::sleep(until - now).await;
            }
        }
        Ok(())
    }

    async fn enforce_min_gap(&self, min_gap: Duration, deadline: Instant) -> Result<(), RateCoordinatorError> {
        let mut last = self.last_started_at.lock().await;
        let now = Instant::now();
        if let Some(prev) = *last {
            let earliest = prev + min_gap;
            if earliest > now {
                if earliest > deadline {
                    return Err(RateCoordinatorError::AdmissionTimeout(
                        "minimum gap would exceed admission deadline".into(),
                    ));
                }
                tokio::time::sleep(earliest - now).await;
            }
        }
        *last = Some(Instant::now());
        Ok(())
    }

    async fn acquire(self: &Arc<Self>, priority: u8, deadline: Instant, min_gap: Duration) -> Result<RateLease, RateCoordinatorError> {
        self.wait_out_cooldown(deadline).await?;

        {
            let mut in_flight = self.in_flight.lock().await;
            let waiters = self.waiters.lock().await;
            if *in_flight < self.max_concurrent && waiters.is_empty() {
                *in_flight += 1;
                drop(waiters);
                drop(in_flight);
                self.enforce_min_gap(min_gap, deadline).await?;
                self.cooldown_attempts.store(0, Ordering::SeqCst);
                return Ok(RateLease { gate: self.clone() });
            }
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.waiters.lock().await;
            waiters.push(PendingAdmission {
                priority,
                seq,
                grant: tx,
            });
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, rx).await {
            Ok(Ok(())) => {
                self.enforce_min_gap(min_gap, deadline).await?;
                self.cooldown_attempts.store(0, Ordering::SeqCst);
                Ok(RateLease { gate: self.clone() })
            }
            _ => Err(RateCoordinatorError::AdmissionTimeout(
                "no slot became available before the deadline".into(),
            )),
        }
    }

    async fn release(&self) {
        let mut waiters = self.waiters.lock().await;
        if let Some(next) = waiters.pop() {
            // Slot transfers directly to the highest-priority waiter; in_flight
            // is unchanged since one holder is simply replaced by another.
            let _ = next.grant.send(());
        } else {
            let mut in_flight = self.in_flight.lock().await;
            *in_flight = in_flight.saturating_sub(1);
        }
    }

    async fn enter_cooldown(&self) {
        let attempts = self.cooldown_attempts.fetch_add(1, Ordering::SeqCst);
        let doublings = attempts.min(COOLDOWN_MAX_DOUBLINGS);
        let backoff = COOLDOWN_BASE * 2u32.pow(doublings);
        let jitter_ms = rand::thread_rng().gen_range(0..250);
        let until = Instant::now() + backoff + Duration::from_millis(jitter_ms);
        *self.cooldown_until.lock().await = Some(until);
    }
}

/// Held while a credential's slot is in use; the slot is released (and handed
/// to the next queued waiter, if any) when the lease is dropped.
pub struct RateLease {
    gate: Arc<CredentialGate>,
}

impl Drop for RateLease {
    fn drop(&mut self) {
        let gate = self.gate.clone();
        tokio::spawn(async move { gate.release().await });
    }
}

/// Per-credential admission control: caps in-flight broker calls at the
/// credential's `max_concurrent`, enforces a minimum gap between successive
/// admissions, and backs a credential off into a jittered exponential
/// cooldown whenever the broker reports a rate limit.
pub struct RateCoordinator {
    gates: DashMap<Uuid, Arc<CredentialGate>>,
    min_gap: Duration,
}

impl Default for RateCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_GAP)
    }
}

impl RateCoordinator {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            gates: DashMap::new(),
            min_gap,
        }
    }

    fn gate(&self, credential_id: Uuid, max_concurrent: u32) -> Arc<CredentialGate> {
        self.gates
            .entry(credential_id)
            .or_insert_with(|| Arc::new(CredentialGate::new(max_concurrent)))
            .clone()
    }

    /// Requests admission for `credential_id`. `priority` is higher-wins;
    /// ties break FIFO by arrival order. Returns `AdmissionTimeout` if no
    /// slot frees up before `deadline`.
    pub async fn acquire(
        &self,
        credential_id: Uuid,
        max_concurrent: u32,
        priority: u8,
        deadline: Instant,
    ) -> Result<RateLease, RateCoordinatorError> {
        let gate = self.gate(credential_id, max_concurrent);
        gate.acquire(priority, deadline, self.min_gap).await
    }

    /// Records a RATE_LIMITED outcome from the broker, pushing the
    /// credential into cooldown with jittered exponential backoff.
    pub async fn record_rate_limited(&self, credential_id: Uuid, max_concurrent: u32) {
        let gate = self.gate(credential_id, max_concurrent);
        gate.enter_cooldown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn respects_max_concurrent() {
        let coord = RateCoordinator::new(Duration::from_millis(0));
        let cred = Uuid::new_v4();
        let deadline = Instant::now() + Duration::from_secs(5);

        let l1 = coord.acquire(cred, 1, 5, deadline).await.unwrap();
        let second = coord.acquire(cred, 1, 5, Instant::now() + Duration::from_millis(50)).await;
        assert!(second.is_err());
        drop(l1);
    }

    #[tokio::test(start_paused = true)]
    async fn higher_priority_waiter_admitted_first() {
        let coord = Arc::new(RateCoordinator::new(Duration::from_millis(0)));
        let cred = Uuid::new_v4();
        let deadline = Instant::now() + Duration::from_secs(10);

        let holder = coord.acquire(cred, 1, 5, deadline).await.unwrap();

        let c1 = coord.clone();
        let low = tokio::spawn(async move { c1.acquire(cred, 1, 1, deadline).await.map(|_| 1) });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let c2 = coord.clone();
        let high = tokio::spawn(async move { c2.acquire(cred, 1, 9, deadline).await.map(|_| 2) });
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(holder);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let high_res = high.await.unwrap();
        assert_eq!(high_res.unwrap(), 2);
        drop(low);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_credential_enters_cooldown() {
        let coord = RateCoordinator::new(Duration::from_millis(0));
        let cred = Uuid::new_v4();
        coord.record_rate_limited(cred, 1).await;

        let deadline = Instant::now() + Duration::from_millis(100);
        let result = coord.acquire(cred, 1, 5, deadline).await;
        assert!(result.is_err());
    }
}

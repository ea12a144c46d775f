use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::BrokerError;

/// Exponential backoff schedule used on 429/5xx: 2s -> 4s -> 8s, max 3 retries.
const BACKOFF_SCHEDULE_SECS: [u64; 3] = [2, 4, 8];

/// Runs `op` with the standard retry/backoff policy. Retries only on
/// `RateLimited`/`Unavailable`; `Unauthorized` and unknown-kind errors are
/// surfaced immediately since retrying them cannot help.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, BrokerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BrokerError>>,
{
    let mut last_err = None;
    for (attempt, delay_secs) in BACKOFF_SCHEDULE_SECS.iter().enumerate() {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e @ BrokerError::RateLimited) | Err(e @ BrokerError::Unavailable(_)) => {
                tracing::warn!(attempt = attempt + 1, "broker call failed, backing off: {}", e);
                last_err = Some(e);
                let jitter_ms = rand::thread_rng().gen_range(0..250);
                tokio::time::sleep(Duration::from_secs(*delay_secs) + Duration::from_millis(jitter_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
    // Final attempt after exhausting the schedule.
    match op().await {
        Ok(v) => Ok(v),
        Err(_) => Err(BrokerError::Unavailable(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "retries exhausted".into()),
        )),
    }
}

/// Applies the call deadline (60s default, 30s for price lookups per §4.L1).
pub async fn with_deadline<T>(
    deadline: Duration,
    fut: impl Future<Output = Result<T, BrokerError>>,
) -> Result<T, BrokerError> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => Err(BrokerError::Unavailable("call exceeded deadline".into())),
    }
}

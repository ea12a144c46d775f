use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::client::BrokerClient;
use crate::error::BrokerError;
use crate::types::Epic;

const CACHE_TTL: Duration = Duration::hours(24);

struct CacheEntry {
    epic: Epic,
    cached_at: DateTime<Utc>,
}

/// Resolves a user-facing symbol to the broker's internal epic, caching the
/// result for 24h with a reverse mapping populated alongside it.
///
/// Resolution is multi-stage: (1) hard-coded common mappings, (2) direct
/// crypto-style candidates (`BTCUSD`), (3) vendor-prefixed CFD candidates
/// (`CS.D.<SYM>.CFD.IP`), each verified via `market_details` when the broker
/// can confirm it. The first verified candidate wins; if none verify, the
/// most likely candidate is still returned with a warning so the caller can
/// attempt a trade rather than failing outright.
pub struct EpicResolver {
    forward: DashMap<String, CacheEntry>,
    reverse: DashMap<Epic, String>,
}

impl Default for EpicResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl EpicResolver {
    pub fn new() -> Self {
        Self {
            forward: DashMap::new(),
            reverse: DashMap::new(),
        }
    }

    fn hardcoded_mapping(symbol: &str) -> Option<&'static str> {
        match symbol.to_ascii_uppercase().as_str() {
            "EURUSD" => Some("CS.D.EURUSD.CFD.IP"),
            "GBPUSD" => Some("CS.D.GBPUSD.CFD.IP"),
            "USDJPY" => Some("CS.D.USDJPY.CFD.IP"),
            _ => None,
        }
    }

    fn candidates(symbol: &str) -> Vec<String> {
        let upper = symbol.to_ascii_uppercase();
        let mut out = Vec::new();
        if let Some(hard) = Self::hardcoded_mapping(&upper) {
            out.push(hard.to_string());
        }
        // Direct-format candidate, for crypto pairs quoted without separators.
        out.push(upper.clone());
        // Vendor-prefixed CFD candidate.
        out.push(format!("CS.D.{upper}.CFD.IP"));
        out
    }

    /// Returns the resolved epic, and `true` if it came from the cache.
    pub async fn resolve(
        &self,
        client: &dyn BrokerClient,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<(Epic, bool), BrokerError> {
        if let Some(entry) = self.forward.get(symbol) {
            if now - entry.cached_at < CACHE_TTL {
                return Ok((entry.epic.clone(), true));
            }
        }

        let candidates = Self::candidates(symbol);
        let mut fallback = candidates.first().cloned();

        for candidate in &candidates {
            match client.resolve_epic_candidate(symbol, candidate).await {
                Ok(details) if details.tradeable => {
                    self.forward.insert(
                        symbol.to_string(),
                        CacheEntry {
                            epic: details.epic.clone(),
                            cached_at: now,
                        },
                    );
                    self.reverse.insert(details.epic.clone(), symbol.to_string());
                    return Ok((details.epic, false));
                }
                Ok(_) | Err(_) => {
                    fallback.get_or_insert_with(|| candidate.clone());
                    continue;
                }
            }
        }

        match fallback {
            Some(epic) => {
                tracing::warn!(
                    symbol,
                    epic = %epic,
                    "epic resolution could not verify any candidate, using best guess"
                );
                Ok((epic, false))
            }
            None => Err(BrokerError::EpicResolutionFailed(symbol.to_string())),
        }
    }

    pub fn symbol_for_epic(&self, epic: &str) -> Option<String> {
        self.reverse.get(epic).map(|e| e.clone())
    }
}

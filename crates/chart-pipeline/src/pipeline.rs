use std::sync::Arc;
use std::time::Duration;

use broker_gateway::Candle;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ChartError;
use crate::indicator::normalize_indicators;
use crate::renderer::ChartRenderer;
use crate::store::ObjectStore;

const PIPELINE_DEADLINE: Duration = Duration::from_secs(45);

#[derive(Debug, Clone)]
pub struct ChartResult {
    pub url: String,
    pub used_local_fallback: bool,
}

/// OHLC → renderer → PNG bytes → object store, bounded end-to-end by a single
/// deadline. A timeout or placeholder result means the chart is unavailable;
/// callers must proceed without an image or abort, never substitute a
/// placeholder into a trading decision.
pub struct ChartPipeline {
    renderer: Arc<dyn ChartRenderer>,
    primary_store: Arc<dyn ObjectStore>,
    fallback_store: Arc<dyn ObjectStore>,
}

impl ChartPipeline {
    pub fn new(
        renderer: Arc<dyn ChartRenderer>,
        primary_store: Arc<dyn ObjectStore>,
        fallback_store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            renderer,
            primary_store,
            fallback_store,
        }
    }

    pub async fn generate(
        &self,
        bot_owner: Uuid,
        symbol: &str,
        candles: &[Candle],
        indicators_raw: &Value,
    ) -> Result<ChartResult, ChartError> {
        match tokio::time::timeout(PIPELINE_DEADLINE, self.generate_inner(bot_owner, symbol, candles, indicators_raw)).await {
            Ok(result) => result,
            Err(_) => Err(ChartError::Timeout),
        }
    }

    async fn generate_inner(
        &self,
        bot_owner: Uuid,
        symbol: &str,
        candles: &[Candle],
        indicators_raw: &Value,
    ) -> Result<ChartResult, ChartError> {
        let indicators = normalize_indicators(indicators_raw);
        let bytes = self.renderer.render(symbol, candles, &indicators).await?;

        let key = format!("{}/charts/{}.png", bot_owner, Uuid::new_v4());
        match self.primary_store.upload(&key, &bytes).await {
            Ok(url) => Ok(ChartResult {
                url,
                used_local_fallback: false,
            }),
            Err(e) => {
                tracing::warn!("object store upload failed, falling back to local disk: {}", e);
                let url = self.fallback_store.upload(&key, &bytes).await?;
                Ok(ChartResult {
                    url,
                    used_local_fallback: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectStore;
    use async_trait::async_trait;

    struct FailingStore;
    #[async_trait]
    impl ObjectStore for FailingStore {
        async fn upload(&self, _key: &str, _bytes: &[u8]) -> Result<String, ChartError> {
            Err(ChartError::UploadFailed("unreachable".into()))
        }
    }

    struct EchoRenderer;
    #[async_trait]
    impl ChartRenderer for EchoRenderer {
        async fn render(
            &self,
            _symbol: &str,
            _candles: &[Candle],
            _indicators: &std::collections::BTreeMap<String, Value>,
        ) -> Result<Vec<u8>, ChartError> {
            Ok(vec![1, 2, 3])
        }
    }

    struct MemoryStore;
    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn upload(&self, key: &str, _bytes: &[u8]) -> Result<String, ChartError> {
            Ok(format!("mem://{key}"))
        }
    }

    #[tokio::test]
    async fn falls_back_to_local_store_on_primary_failure() {
        let pipeline = ChartPipeline::new(Arc::new(EchoRenderer), Arc::new(FailingStore), Arc::new(MemoryStore));
        let result = pipeline
            .generate(Uuid::new_v4(), "EURUSD", &[], &serde_json::json!([]))
            .await
            .unwrap();
        assert!(result.used_local_fallback);
        assert!(result.url.starts_with("mem://"));
    }
}

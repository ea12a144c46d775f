use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use broker_gateway::Candle;
use serde_json::Value;

use crate::error::ChartError;

/// Renders OHLC + indicators into image bytes. The renderer itself is a thin
/// external collaborator (subprocess or sidecar service behind an HTTP
/// endpoint), not code this crate draws pixels with.
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    async fn render(
        &self,
        symbol: &str,
        candles: &[Candle],
        indicators: &BTreeMap<String, Value>,
    ) -> Result<Vec<u8>, ChartError>;
}

/// Calls a renderer endpoint over HTTP, falling back to a secondary endpoint
/// if the primary is unreachable.
pub struct HttpChartRenderer {
    http: reqwest::Client,
    primary_endpoint: String,
    fallback_endpoint: Option<String>,
}

impl HttpChartRenderer {
    pub fn new(primary_endpoint: impl Into<String>, fallback_endpoint: Option<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("chart renderer http client builds"),
            primary_endpoint: primary_endpoint.into(),
            fallback_endpoint,
        }
    }

    async fn call(&self, endpoint: &str, body: &Value) -> Result<Vec<u8>, ChartError> {
        let resp = self
            .http
            .post(endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| ChartError::RendererUnavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ChartError::RendererUnavailable(format!("status {}", resp.status())));
        }
        let header_placeholder = resp
            .headers()
            .get("x-placeholder")
            .map(|v| v == "true")
            .unwrap_or(false);
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ChartError::RendererUnavailable(e.to_string()))?;
        if header_placeholder || bytes.is_empty() {
            return Err(ChartError::PlaceholderRejected);
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ChartRenderer for HttpChartRenderer {
    async fn render(
        &self,
        symbol: &str,
        candles: &[Candle],
        indicators: &BTreeMap<String, Value>,
    ) -> Result<Vec<u8>, ChartError> {
        let body = serde_json::json!({
            "symbol": symbol,
            "candles": candles,
            "indicators": indicators,
        });

        match self.call(&self.primary_endpoint, &body).await {
            Ok(bytes) => Ok(bytes),
            Err(ChartError::PlaceholderRejected) => Err(ChartError::PlaceholderRejected),
            Err(primary_err) => match &self.fallback_endpoint {
                Some(fallback) => self.call(fallback, &body).await,
                None => Err(primary_err),
            },
        }
    }
}

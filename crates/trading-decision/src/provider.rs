use std::time::Duration;

use async_trait::async_trait;

use crate::error::TradingDecisionError;
use crate::types::{DecisionRequest, RawLlmResponse};

/// The LLM itself is a thin external collaborator; this trait is the only
/// seam `trading-decision` needs against it.
#[async_trait]
pub trait LlmDecisionProvider: Send + Sync {
    async fn complete(&self, request: &DecisionRequest) -> Result<RawLlmResponse, TradingDecisionError>;
}

/// Default implementation, built the way `ml-client`'s `SignalModelsClient`
/// wraps `reqwest::Client`: one shared client, an explicit timeout, and a
/// bounded idle-connection pool.
pub struct HttpLlmProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLlmProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .pool_max_idle_per_host(10)
                .build()
                .expect("llm provider http client builds"),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl LlmDecisionProvider for HttpLlmProvider {
    async fn complete(&self, request: &DecisionRequest) -> Result<RawLlmResponse, TradingDecisionError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| TradingDecisionError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TradingDecisionError::ProviderUnavailable(format!("status {}", resp.status())));
        }

        resp.json::<RawLlmResponse>()
            .await
            .map_err(|e| TradingDecisionError::ProviderUnavailable(e.to_string()))
    }
}

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Process-level configuration, loaded once at startup the way the trading
/// agent's own `AgentConfig::from_env` does: typed fields, `unwrap_or_else`
/// defaults for anything with a sane one, `context` on anything that must be
/// set explicitly in production.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub credentials_encryption_key_set: bool,

    pub llm_endpoint: String,
    pub llm_timeout_seconds: u64,

    pub chart_renderer_primary_endpoint: String,
    pub chart_renderer_fallback_endpoint: Option<String>,
    pub object_store_endpoint: Option<String>,
    pub object_store_local_fallback_dir: String,

    pub max_concurrent_evaluations: usize,
    pub bot_coordinator_max_per_credential: u32,
    pub bot_coordinator_min_gap_ms: u64,
    pub rate_coordinator_min_gap_ms: u64,
    pub position_monitor_tick_seconds: u64,
    pub scheduler_tick_seconds: u64,

    pub log_format: String,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:orchestration.db".to_string()),
            credentials_encryption_key_set: env::var("CREDENTIALS_ENCRYPTION_KEY").is_ok(),

            llm_endpoint: env::var("LLM_ENDPOINT").context("LLM_ENDPOINT not set")?,
            llm_timeout_seconds: env::var("LLM_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            chart_renderer_primary_endpoint: env::var("CHART_RENDERER_ENDPOINT")
                .context("CHART_RENDERER_ENDPOINT not set")?,
            chart_renderer_fallback_endpoint: env::var("CHART_RENDERER_FALLBACK_ENDPOINT").ok(),
            object_store_endpoint: env::var("OBJECT_STORE_ENDPOINT").ok(),
            object_store_local_fallback_dir: env::var("OBJECT_STORE_LOCAL_FALLBACK_DIR")
                .unwrap_or_else(|_| "./chart-store-fallback".to_string()),

            max_concurrent_evaluations: env::var("MAX_CONCURRENT_EVALUATIONS")
                .unwrap_or_else(|_| "16".to_string())
                .parse()?,
            bot_coordinator_max_per_credential: env::var("BOT_COORDINATOR_MAX_PER_CREDENTIAL")
                .unwrap_or_else(|_| "8".to_string())
                .parse()?,
            bot_coordinator_min_gap_ms: env::var("BOT_COORDINATOR_MIN_GAP_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()?,
            rate_coordinator_min_gap_ms: env::var("RATE_COORDINATOR_MIN_GAP_MS")
                .unwrap_or_else(|_| "250".to_string())
                .parse()?,
            position_monitor_tick_seconds: env::var("POSITION_MONITOR_TICK_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            scheduler_tick_seconds: env::var("SCHEDULER_TICK_SECONDS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()?,

            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
        })
    }

    pub fn bot_coordinator_min_gap(&self) -> Duration {
        Duration::from_millis(self.bot_coordinator_min_gap_ms)
    }

    pub fn rate_coordinator_min_gap(&self) -> Duration {
        Duration::from_millis(self.rate_coordinator_min_gap_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED_VARS: &[(&str, &str)] = &[
        ("LLM_ENDPOINT", "http://localhost:9000/decide"),
        ("CHART_RENDERER_ENDPOINT", "http://localhost:9100/render"),
    ];
    const OPTIONAL_VARS: &[&str] = &[
        "DATABASE_URL",
        "CREDENTIALS_ENCRYPTION_KEY",
        "LLM_TIMEOUT_SECONDS",
        "CHART_RENDERER_FALLBACK_ENDPOINT",
        "OBJECT_STORE_ENDPOINT",
        "OBJECT_STORE_LOCAL_FALLBACK_DIR",
        "MAX_CONCURRENT_EVALUATIONS",
        "BOT_COORDINATOR_MAX_PER_CREDENTIAL",
        "BOT_COORDINATOR_MIN_GAP_MS",
        "RATE_COORDINATOR_MIN_GAP_MS",
        "POSITION_MONITOR_TICK_SECONDS",
        "SCHEDULER_TICK_SECONDS",
        "LOG_FORMAT",
    ];

    fn clear_all() {
        for (k, _) in REQUIRED_VARS {
            env::remove_var(k);
        }
        for k in OPTIONAL_VARS {
            env::remove_var(k);
        }
    }

    #[test]
    fn missing_required_endpoint_is_rejected_with_context() {
        clear_all();
        let err = ServiceConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("LLM_ENDPOINT"));
        clear_all();
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_unset() {
        clear_all();
        for (k, v) in REQUIRED_VARS {
            env::set_var(k, v);
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.database_url, "sqlite:orchestration.db");
        assert!(!config.credentials_encryption_key_set);
        assert_eq!(config.max_concurrent_evaluations, 16);
        assert_eq!(config.bot_coordinator_max_per_credential, 8);
        assert_eq!(config.scheduler_tick_seconds, 15);
        assert_eq!(config.position_monitor_tick_seconds, 30);
        assert_eq!(config.log_format, "text");
        assert!(config.chart_renderer_fallback_endpoint.is_none());

        clear_all();
    }

    #[test]
    fn duration_helpers_convert_millis_fields() {
        clear_all();
        for (k, v) in REQUIRED_VARS {
            env::set_var(k, v);
        }
        env::set_var("BOT_COORDINATOR_MIN_GAP_MS", "45000");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.bot_coordinator_min_gap(), Duration::from_secs(45));

        clear_all();
    }
}

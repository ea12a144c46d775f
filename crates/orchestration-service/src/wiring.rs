use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use broker_gateway::gateway::build_client;
use broker_gateway::BrokerGateway;
use bot_coordinator::BotCoordinator;
use bot_evaluator::BotEvaluator;
use chart_pipeline::{ChartPipeline, ChartRenderer, HttpChartRenderer, HttpObjectStore, LocalFileStore, ObjectStore};
use persistence::{SqlEvaluationStore, SqlPositionStore};
use position_ledger::PositionLedger;
use position_monitor::PositionMonitor;
use rate_coordinator::RateCoordinator;
use sqlx::AnyPool;
use trading_decision::{HttpLlmProvider, TradingDecisionChain};
use uuid::Uuid;

use crate::config::ServiceConfig;

/// Everything the tick loops need a handle to. Built once at startup; every
/// field is internally `Arc`-shared the way the trading agent shares its own
/// components across `run_trading_cycle` calls.
pub struct Runtime {
    pub pool: AnyPool,
    pub bot_coordinator: Arc<BotCoordinator>,
    pub rate_coordinator: Arc<RateCoordinator>,
    pub bot_evaluator: Arc<BotEvaluator>,
    pub position_monitor: Arc<PositionMonitor>,
}

pub async fn build_runtime(config: &ServiceConfig, pool: AnyPool) -> Result<Runtime> {
    let bot_coordinator = Arc::new(BotCoordinator::new(config.bot_coordinator_min_gap()));
    let rate_coordinator = Arc::new(RateCoordinator::new(config.rate_coordinator_min_gap()));
    let ledger = Arc::new(PositionLedger::new());

    let renderer: Arc<dyn ChartRenderer> = Arc::new(HttpChartRenderer::new(
        config.chart_renderer_primary_endpoint.clone(),
        config.chart_renderer_fallback_endpoint.clone(),
    ));
    let primary_store: Arc<dyn ObjectStore> = match &config.object_store_endpoint {
        Some(endpoint) => Arc::new(HttpObjectStore::new(endpoint.clone())),
        None => Arc::new(LocalFileStore::new(config.object_store_local_fallback_dir.clone())),
    };
    let fallback_store: Arc<dyn ObjectStore> = Arc::new(LocalFileStore::new(config.object_store_local_fallback_dir.clone()));
    let chart_pipeline = Arc::new(ChartPipeline::new(renderer, primary_store, fallback_store));

    let llm_provider = Arc::new(HttpLlmProvider::new(
        config.llm_endpoint.clone(),
        std::time::Duration::from_secs(config.llm_timeout_seconds),
    ));
    let decision_chain = Arc::new(TradingDecisionChain::new(llm_provider, HashMap::new()));

    let evaluation_store: Arc<dyn bot_evaluator::EvaluationStore> = Arc::new(SqlEvaluationStore::new(pool.clone()));
    let bot_evaluator = Arc::new(BotEvaluator::new(
        evaluation_store,
        bot_coordinator.clone(),
        rate_coordinator.clone(),
        chart_pipeline,
        decision_chain,
        ledger.clone(),
    ));

    let position_store: Arc<dyn position_monitor::store::PositionStore> = Arc::new(SqlPositionStore::new(pool.clone()));
    let position_monitor = Arc::new(PositionMonitor::new(position_store, rate_coordinator.clone(), ledger));

    register_credentials(&pool, &bot_evaluator, &position_monitor).await?;

    Ok(Runtime {
        pool,
        bot_coordinator,
        rate_coordinator,
        bot_evaluator,
        position_monitor,
    })
}

/// Builds one `BrokerGateway` per distinct credential and registers it with
/// both the evaluator and the position monitor — each keeps its own
/// `DashMap<Uuid, Arc<BrokerGateway>>` (L1 sessions are shared, never owned
/// by a single bot), so both must learn about a credential before any bot on
/// it can run.
async fn register_credentials(
    pool: &AnyPool,
    bot_evaluator: &Arc<BotEvaluator>,
    position_monitor: &Arc<PositionMonitor>,
) -> Result<()> {
    let bots = persistence::bots::list_active_bots(pool).await?;
    let mut seen: HashMap<Uuid, ()> = HashMap::new();

    for bot in &bots {
        if seen.contains_key(&bot.credential_id) {
            continue;
        }
        seen.insert(bot.credential_id, ());

        let credential = persistence::credentials::load_credential(pool, bot.credential_id).await?;
        let secrets = persistence::credentials::load_credential_secrets(pool, bot.credential_id).await?;
        let client = build_client(credential.broker_kind, &secrets.base_url, &secrets.api_key)?;
        let gateway = Arc::new(BrokerGateway::new(client));

        bot_evaluator.register_credential(bot.credential_id, gateway.clone());
        position_monitor.register_credential(bot.credential_id, gateway);
    }

    Ok(())
}

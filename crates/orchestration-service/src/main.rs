use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::signal::unix::SignalKind;
use tokio::time;

mod config;
mod dispatch;
mod wiring;

use config::ServiceConfig;
use dispatch::EvaluatorDispatcher;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = ServiceConfig::from_env()?;
    init_tracing(&config.log_format);

    std::panic::set_hook(Box::new(|info| {
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting bot orchestration core");
    tracing::info!(
        scheduler_tick_seconds = config.scheduler_tick_seconds,
        position_monitor_tick_seconds = config.position_monitor_tick_seconds,
        max_concurrent_evaluations = config.max_concurrent_evaluations,
        bot_coordinator_max_per_credential = config.bot_coordinator_max_per_credential,
        "configuration loaded"
    );
    if !config.credentials_encryption_key_set {
        tracing::warn!("CREDENTIALS_ENCRYPTION_KEY not set — credentials will be stored in plaintext");
    }

    let pool = persistence::connect(&config.database_url).await?;
    tracing::info!("Connected to {}", config.database_url);

    let runtime = wiring::build_runtime(&config, pool).await?;
    tracing::info!("Broker sessions, evaluator, and position monitor wired up");

    let dispatcher: Arc<dyn scheduler::EvaluationDispatcher> = Arc::new(EvaluatorDispatcher::new(
        runtime.bot_evaluator.clone(),
        config.max_concurrent_evaluations,
    ));
    let sched = scheduler::Scheduler::new(runtime.bot_coordinator.clone(), dispatcher);

    let active_bots = persistence::bots::list_active_bots(&runtime.pool).await?;
    let now = Utc::now();
    for bot in &active_bots {
        sched.register_bot(bot.id, bot.credential_id, bot.timeframe, now);
    }
    tracing::info!(count = active_bots.len(), "registered active bots with the scheduler");

    let mut scheduler_interval = time::interval(Duration::from_secs(config.scheduler_tick_seconds));
    let mut monitor_interval = time::interval(Duration::from_secs(config.position_monitor_tick_seconds));
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;

    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    let mut credential_ids: Vec<uuid::Uuid> = active_bots.iter().map(|b| b.credential_id).collect();
    credential_ids.sort();
    credential_ids.dedup();

    let mut credential_max_concurrent = std::collections::HashMap::new();
    for &credential_id in &credential_ids {
        let credential = persistence::credentials::load_credential(&runtime.pool, credential_id).await?;
        credential_max_concurrent.insert(credential_id, credential.max_concurrent);
    }

    loop {
        tokio::select! {
            _ = scheduler_interval.tick() => {
                let report = sched.tick(Utc::now()).await;
                tracing::debug!(due = report.due, dispatched = report.dispatched, dropped = report.dropped, "scheduler tick");
            }
            _ = monitor_interval.tick() => {
                for &credential_id in &credential_ids {
                    let max_concurrent = credential_max_concurrent.get(&credential_id).copied().unwrap_or(1);
                    if let Err(e) = runtime.position_monitor.tick(credential_id, max_concurrent).await {
                        tracing::warn!(%credential_id, error = %e, "position monitor tick failed");
                    }
                    if let Err(e) = runtime.position_monitor.sync(credential_id, max_concurrent).await {
                        tracing::warn!(%credential_id, error = %e, "position monitor sync failed");
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("shutting down gracefully");
                break;
            }
        }
    }

    tracing::info!("bot orchestration core stopped");
    Ok(())
}

fn init_tracing(log_format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

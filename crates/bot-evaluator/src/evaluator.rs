use std::sync::Arc;
use std::time::Instant;

use broker_gateway::{BrokerError, BrokerGateway, BrokerPosition, PriceQuote};
use chart_pipeline::ChartPipeline;
use chrono::{DateTime, Utc};
use core_types::{Decision, Evaluation, TradeParams, TradeStatus};
use dashmap::DashMap;
use rate_coordinator::RateCoordinator;
use risk_gate::{PortfolioLimits, RiskGateRequest};
use rust_decimal::Decimal;
use trading_decision::{DecisionRequest, TradingDecisionChain};
use uuid::Uuid;

use crate::error::BotEvaluatorError;
use crate::higher_tf_adapter::CacheHigherTimeframeAdapter;
use crate::source::BrokerMarketDataSource;
use crate::store::{EvaluationContext, EvaluationStore};

type Cache = market_data_cache::MarketDataCache<BrokerMarketDataSource>;

const PRIMARY_LOOKBACK: usize = 100;
const EXECUTION_PRIORITY: u8 = 60;
const EXECUTION_DEADLINE: std::time::Duration = std::time::Duration::from_secs(20);
const CHART_UNAVAILABLE_CONFIDENCE_PENALTY: f64 = 20.0;

fn hold(id: Uuid, bot_id: Uuid, started_at: DateTime<Utc>, reasoning: String) -> Evaluation {
    Evaluation {
        id,
        bot_id,
        started_at,
        chart_ref: None,
        decision: Decision::Hold,
        confidence: 0.0,
        reasoning,
        trade_params: None,
    }
}

fn format_market_conditions(ctx: &multi_timeframe::HigherTimeframeContext) -> String {
    format!(
        "higher timeframe {:?}: trend={:?} momentum={:?} confidence={:.0}",
        ctx.timeframe, ctx.trend, ctx.momentum, ctx.confidence
    )
}

fn format_risk_panel(portfolio: &risk_gate::PortfolioSnapshot) -> String {
    format!(
        "current_risk={:.2}% exposure={:.2}% drawdown={:.2}% consecutive_losses={}",
        portfolio.current_risk_percent, portfolio.total_exposure_percent, portfolio.drawdown_percent, portfolio.consecutive_losses
    )
}

fn format_technicals_panel(strategy: &core_types::Strategy) -> String {
    format!(
        "indicators=[{}] entry=[{}] exit=[{}]",
        strategy.indicators.join(", "),
        strategy.entry_conditions.join(", "),
        strategy.exit_conditions.join(", ")
    )
}

fn format_portfolio_panel(portfolio: &risk_gate::PortfolioSnapshot) -> String {
    format!(
        "open_positions={} daily_pnl={:.2}% halted={}",
        portfolio.open_positions, portfolio.daily_pnl_percent, portfolio.trading_halted
    )
}

/// One invocation = one evaluation attempt, grounded on the trading agent's
/// per-tick cycle: admit, gather market context, ask for a decision, persist
/// the outcome no matter what, and always report completion so the
/// coordinator frees the bot's slot.
pub struct BotEvaluator {
    store: Arc<dyn EvaluationStore>,
    coordinator: Arc<bot_coordinator::BotCoordinator>,
    rate_coordinator: Arc<RateCoordinator>,
    chart_pipeline: Arc<ChartPipeline>,
    decision_chain: Arc<TradingDecisionChain>,
    ledger: Arc<position_ledger::PositionLedger>,
    gateways: DashMap<Uuid, Arc<BrokerGateway>>,
    caches: DashMap<Uuid, Arc<Cache>>,
}

impl BotEvaluator {
    pub fn new(
        store: Arc<dyn EvaluationStore>,
        coordinator: Arc<bot_coordinator::BotCoordinator>,
        rate_coordinator: Arc<RateCoordinator>,
        chart_pipeline: Arc<ChartPipeline>,
        decision_chain: Arc<TradingDecisionChain>,
        ledger: Arc<position_ledger::PositionLedger>,
    ) -> Self {
        Self {
            store,
            coordinator,
            rate_coordinator,
            chart_pipeline,
            decision_chain,
            ledger,
            gateways: DashMap::new(),
            caches: DashMap::new(),
        }
    }

    /// Registers the broker session for a credential. Must be called before
    /// any bot on that credential is evaluated; re-registering drops the
    /// cached market-data client so a fresh session takes effect immediately.
    pub fn register_credential(&self, credential_id: Uuid, gateway: Arc<BrokerGateway>) {
        self.gateways.insert(credential_id, gateway);
        self.caches.remove(&credential_id);
    }

    async fn lease(&self, credential_id: Uuid, max_concurrent: u32) -> Result<rate_coordinator::RateLease, rate_coordinator::RateCoordinatorError> {
        self.rate_coordinator
            .acquire(credential_id, max_concurrent, EXECUTION_PRIORITY, Instant::now() + EXECUTION_DEADLINE)
            .await
    }

    /// Pushes the credential into L2 cooldown on a broker 429 so the next
    /// lease attempt backs off instead of hammering a rate-limited broker.
    async fn note_rate_limited(&self, credential_id: Uuid, max_concurrent: u32, error: &BrokerError) {
        if matches!(error, BrokerError::RateLimited) {
            self.rate_coordinator.record_rate_limited(credential_id, max_concurrent).await;
        }
    }

    fn cache_for(&self, credential: &core_types::Credential) -> Result<Arc<Cache>, BotEvaluatorError> {
        if let Some(cache) = self.caches.get(&credential.id) {
            return Ok(cache.clone());
        }
        let gateway = self
            .gateways
            .get(&credential.id)
            .ok_or_else(|| BotEvaluatorError::Store(format!("no broker session registered for credential {}", credential.id)))?
            .clone();
        let source = BrokerMarketDataSource::new(gateway, self.rate_coordinator.clone(), credential.id, credential.max_concurrent);
        let cache = Arc::new(Cache::new(source));
        self.caches.insert(credential.id, cache.clone());
        Ok(cache)
    }

    /// Runs one evaluation attempt for `bot_id`. Returns `Err` only for
    /// pre-admission rejections (inactive bot, coordinator refusal) that the
    /// caller should retry later rather than treat as a completed attempt;
    /// every other outcome — including every failure once admitted — is
    /// folded into a persisted `Evaluation` and returned `Ok`.
    pub async fn evaluate(&self, bot_id: Uuid) -> Result<Evaluation, BotEvaluatorError> {
        let ctx = self.store.load_context(bot_id).await?;
        if !ctx.bot.is_active {
            return Err(BotEvaluatorError::Inactive);
        }

        self.coordinator
            .request_bot_execution(ctx.bot.id, ctx.bot.credential_id)
            .await?;

        let now = Utc::now();
        let evaluation = self.run_attempt(&ctx, now).await;

        self.coordinator.complete_bot_execution(ctx.bot.id, ctx.bot.credential_id);

        if let Err(e) = self.store.save_evaluation(&evaluation).await {
            tracing::error!(bot_id = %ctx.bot.id, "failed to persist evaluation: {}", e);
        }

        Ok(evaluation)
    }

    async fn run_attempt(&self, ctx: &EvaluationContext, now: DateTime<Utc>) -> Evaluation {
        let eval_id = Uuid::new_v4();
        let bot_id = ctx.bot.id;

        if !risk_gate::is_market_open(ctx.asset_class, now) {
            tracing::info!(%bot_id, "market closed for this asset class, holding");
            return hold(eval_id, bot_id, now, "market is closed for this asset class".into());
        }

        let cache = match self.cache_for(&ctx.credential) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(%bot_id, "no broker session available: {}", e);
                return hold(eval_id, bot_id, now, format!("broker session unavailable: {e}"));
            }
        };

        let price = match cache.get_price(&ctx.bot.symbol).await {
            Ok(fetched) => {
                if fetched.degraded {
                    tracing::warn!(%bot_id, symbol = %ctx.bot.symbol, "serving a degraded price quote");
                }
                Some(fetched.value)
            }
            Err(e) => {
                tracing::warn!(%bot_id, "price fetch failed, continuing in degraded mode: {}", e);
                None
            }
        };

        let candles = match cache.get_ohlc(&ctx.bot.symbol, ctx.bot.timeframe, PRIMARY_LOOKBACK).await {
            Ok(fetched) => fetched.value,
            Err(e) => {
                tracing::warn!(%bot_id, "ohlc fetch failed, continuing without candles: {}", e);
                Vec::new()
            }
        };

        let mut chart_unavailable = candles.is_empty();
        let chart_ref = if candles.is_empty() {
            None
        } else {
            let indicators_raw = serde_json::json!(ctx.strategy.indicators);
            match self
                .chart_pipeline
                .generate(ctx.bot.user_id, &ctx.bot.symbol, &candles, &indicators_raw)
                .await
            {
                Ok(result) => Some(result.url),
                Err(e) => {
                    tracing::warn!(%bot_id, "chart generation failed, continuing without a chart: {}", e);
                    chart_unavailable = true;
                    None
                }
            }
        };

        let higher_tf_source = CacheHigherTimeframeAdapter::new(cache.clone());
        let higher_tf = multi_timeframe::analyze(&higher_tf_source, &ctx.bot.symbol, ctx.bot.timeframe).await;

        let request = DecisionRequest {
            symbol: ctx.bot.symbol.clone(),
            current_price: price.as_ref().map(|q| q.bid),
            market_conditions: format_market_conditions(&higher_tf),
            risk_panel: format_risk_panel(&ctx.portfolio),
            technicals_panel: format_technicals_panel(&ctx.strategy),
            portfolio_panel: format_portfolio_panel(&ctx.portfolio),
            chart_image_base64: None,
        };

        let recent_close = candles.last().map(|c| c.close).or(ctx.recent_close);

        let outcome = match self.decision_chain.decide(request, recent_close).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(%bot_id, "decision call failed: {}", e);
                return hold(eval_id, bot_id, now, format!("decision call failed: {e}"));
            }
        };

        let mut reasoning = outcome.reasoning.clone();
        let mut confidence = outcome.confidence;

        if chart_unavailable {
            confidence = (confidence - CHART_UNAVAILABLE_CONFIDENCE_PENALTY).max(0.0);
            reasoning = format!("{reasoning} (reason=chart_unavailable)");
        }

        if outcome.decision == Decision::ExecuteTrade
            && ctx.bot.ai_enabled
            && confidence >= ctx.strategy.confidence_threshold
        {
            if let Some(params) = &outcome.trade_params {
                let note = self.try_execute(ctx, eval_id, params, price.as_ref(), now).await;
                reasoning = format!("{reasoning} ({note})");
            }
        }

        Evaluation {
            id: eval_id,
            bot_id,
            started_at: now,
            chart_ref,
            decision: outcome.decision,
            confidence,
            reasoning,
            trade_params: outcome.trade_params,
        }
    }

    /// L9 → L1 → L8: risk-check the proposed trade, submit it, record the
    /// resulting Trade row, and register ownership of the opened position.
    /// Returns a short note folded into the evaluation's reasoning; every
    /// failure here is logged and absorbed rather than propagated, since the
    /// evaluation itself still completes and must still be persisted.
    async fn try_execute(
        &self,
        ctx: &EvaluationContext,
        eval_id: Uuid,
        params: &TradeParams,
        price: Option<&PriceQuote>,
        now: DateTime<Utc>,
    ) -> String {
        let verdict = risk_gate::evaluate(&RiskGateRequest {
            bot: &ctx.bot,
            has_credential: true,
            open_trades: ctx.open_trade_count,
            has_open_trade_for_symbol: ctx.has_open_trade_for_symbol,
            has_pending_trade_for_symbol: ctx.has_pending_trade_for_symbol,
            asset_class: ctx.asset_class,
            now,
            requested_quantity: params.quantity,
            portfolio: ctx.portfolio,
            limits: PortfolioLimits::default(),
        });

        if !verdict.approved {
            tracing::warn!(bot_id = %ctx.bot.id, reasons = ?verdict.reasons, "risk gate rejected trade");
            return format!("risk gate rejected: {}", verdict.reasons.join("; "));
        }

        let quantity = verdict.adjusted_quantity.unwrap_or(params.quantity);

        let gateway = match self.gateways.get(&ctx.credential.id) {
            Some(g) => g.clone(),
            None => return "no broker session registered for execution".to_string(),
        };

        let epic = {
            match self.lease(ctx.credential.id, ctx.credential.max_concurrent).await {
                Ok(_lease) => match gateway.resolve_epic(&ctx.bot.symbol).await {
                    Ok(epic) => epic,
                    Err(e) => {
                        self.note_rate_limited(ctx.credential.id, ctx.credential.max_concurrent, &e).await;
                        tracing::warn!(bot_id = %ctx.bot.id, "epic resolution failed: {}", e);
                        return format!("epic resolution failed: {e}");
                    }
                },
                Err(e) => {
                    tracing::warn!(bot_id = %ctx.bot.id, "rate coordinator lease failed: {}", e);
                    return format!("rate coordinator lease failed: {e}");
                }
            }
        };

        let open_result = {
            match self.lease(ctx.credential.id, ctx.credential.max_concurrent).await {
                Ok(_lease) => match gateway
                    .open_position(&epic, params.direction, quantity, params.stop_loss, params.take_profit)
                    .await
                {
                    Ok(result) => result,
                    Err(e) => {
                        self.note_rate_limited(ctx.credential.id, ctx.credential.max_concurrent, &e).await;
                        tracing::warn!(bot_id = %ctx.bot.id, "order submission failed: {}", e);
                        return format!("order submission failed: {e}");
                    }
                },
                Err(e) => {
                    tracing::warn!(bot_id = %ctx.bot.id, "rate coordinator lease failed: {}", e);
                    return format!("rate coordinator lease failed: {e}");
                }
            }
        };

        let entry_price = price
            .map(|q| match params.direction {
                core_types::Direction::Buy => q.ask,
                core_types::Direction::Sell => q.bid,
            })
            .or(ctx.recent_close)
            .unwrap_or(Decimal::ZERO);

        let trade = core_types::Trade {
            id: Uuid::new_v4(),
            bot_id: ctx.bot.id,
            credential_id: ctx.credential.id,
            symbol: ctx.bot.symbol.clone(),
            direction: params.direction,
            quantity,
            entry_price,
            stop_loss: params.stop_loss,
            take_profit: params.take_profit,
            current_price: Some(entry_price),
            status: TradeStatus::Open,
            opened_at: Some(now),
            closed_at: None,
            broker_deal_id: Some(open_result.deal_id.clone()),
            profit_loss: None,
            rationale: format!("evaluation {eval_id}"),
            ai_confidence: 0.0,
            evaluation_id: Some(eval_id),
        };

        if let Err(e) = self.store.save_trade(&trade).await {
            tracing::error!(bot_id = %ctx.bot.id, "failed to persist trade row: {}", e);
        }

        let broker_position = BrokerPosition {
            deal_id: open_result.deal_id.clone(),
            epic,
            symbol: ctx.bot.symbol.clone(),
            direction: params.direction,
            size: quantity,
            entry_price,
            created_at: now,
        };

        // The deal id is already present on `trade`, so this resolves on the
        // first attribution stage; the capacity closures are unreachable.
        if let Err(e) = self
            .ledger
            .attribute(&broker_position, std::slice::from_ref(&trade), |_| 0, |_| u32::MAX, now)
        {
            tracing::error!(bot_id = %ctx.bot.id, "failed to register ownership of the opened position: {}", e);
        }

        if let Err(e) = self.store.update_last_trade_at(ctx.bot.id, now).await {
            tracing::error!(bot_id = %ctx.bot.id, "failed to update last_trade_at: {}", e);
        }

        format!("opened position {}", open_result.deal_id)
    }
}

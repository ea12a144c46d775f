use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use broker_gateway::BrokerGateway;
use chrono::{DateTime, Utc};
use core_types::{Direction, Trade, TradeStatus};
use dashmap::DashMap;
use rate_coordinator::RateCoordinator;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::PositionMonitorError;
use crate::rules::{first_firing_rule, stop_or_target_hit, RuleFire};
use crate::store::{MonitoredTrade, PositionStore};
use crate::trailing::{next_stop_loss, trailing_rule};

const ADMISSION_PRIORITY: u8 = 40;
const ADMISSION_DEADLINE: std::time::Duration = std::time::Duration::from_secs(15);
const MAX_TIME_IN_POSITION_MINUTES: i64 = 24 * 60;
const EMERGENCY_STOP_PNL_PERCENT: f64 = -10.0;

/// What one `tick` did, for logging/metrics at the call site.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub checked: u32,
    pub closed: u32,
    pub scaled_out: u32,
    pub trailed: u32,
}

/// What one `sync` did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub attributed: u32,
    pub orphaned: u32,
}

/// Per-credential loop over OPEN trades: mark-to-market, stop/target
/// crossing, descending-priority strategy rules, trailing stop, the 24 h
/// time guard, and the -10 % emergency stop. Grounded on the trading agent's
/// position-check cycle (one pass over all positions, degraded-mode
/// tolerant) generalised from one broker account to many bot-owned trades
/// sharing a credential.
pub struct PositionMonitor {
    store: Arc<dyn PositionStore>,
    rate_coordinator: Arc<RateCoordinator>,
    ledger: Arc<position_ledger::PositionLedger>,
    gateways: DashMap<Uuid, Arc<BrokerGateway>>,
}

impl PositionMonitor {
    pub fn new(store: Arc<dyn PositionStore>, rate_coordinator: Arc<RateCoordinator>, ledger: Arc<position_ledger::PositionLedger>) -> Self {
        Self {
            store,
            rate_coordinator,
            ledger,
            gateways: DashMap::new(),
        }
    }

    pub fn register_credential(&self, credential_id: Uuid, gateway: Arc<BrokerGateway>) {
        self.gateways.insert(credential_id, gateway);
    }

    fn gateway_for(&self, credential_id: Uuid) -> Result<Arc<BrokerGateway>, PositionMonitorError> {
        self.gateways
            .get(&credential_id)
            .map(|g| g.clone())
            .ok_or(PositionMonitorError::NoSession(credential_id))
    }

    async fn lease(&self, credential_id: Uuid, max_concurrent: u32) -> Result<rate_coordinator::RateLease, PositionMonitorError> {
        self.rate_coordinator
            .acquire(credential_id, max_concurrent, ADMISSION_PRIORITY, Instant::now() + ADMISSION_DEADLINE)
            .await
            .map_err(|e| PositionMonitorError::Store(e.to_string()))
    }

    /// Runs one tick over every OPEN trade for `credential_id`.
    pub async fn tick(&self, credential_id: Uuid, max_concurrent: u32) -> Result<TickReport, PositionMonitorError> {
        let gateway = self.gateway_for(credential_id)?;
        let monitored = self.store.load_open_trades(credential_id).await?;
        let mut report = TickReport::default();
        let now = Utc::now();

        for entry in monitored {
            report.checked += 1;
            if let Err(e) = self.tick_trade(&gateway, credential_id, max_concurrent, entry, now, &mut report).await {
                tracing::warn!(credential_id = %credential_id, "position tick failed for a trade: {}", e);
            }
        }

        Ok(report)
    }

    async fn tick_trade(
        &self,
        gateway: &Arc<BrokerGateway>,
        credential_id: Uuid,
        max_concurrent: u32,
        entry: MonitoredTrade,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), PositionMonitorError> {
        let MonitoredTrade { mut trade, rules, timeframe_minutes } = entry;

        let epic = {
            let _lease = self.lease(credential_id, max_concurrent).await?;
            gateway.resolve_epic(&trade.symbol).await?
        };
        let price = {
            let _lease = self.lease(credential_id, max_concurrent).await?;
            gateway.get_latest_price(&epic).await?
        };
        let current = match trade.direction {
            Direction::Buy => price.bid,
            Direction::Sell => price.ask,
        };
        trade.current_price = Some(current);
        self.store.update_current_price(trade.id, current).await?;

        if let Some(reason) = stop_or_target_hit(&trade, current) {
            self.close_full(gateway, credential_id, max_concurrent, &trade, current, reason, now).await?;
            report.closed += 1;
            return Ok(());
        }

        let pnl_percent = trade.unrealised_pnl_percent().unwrap_or(0.0);

        if let Some(fire) = first_firing_rule(&rules, &trade, pnl_percent, now, timeframe_minutes) {
            match fire {
                RuleFire::CloseFull { reason } => {
                    self.close_full(gateway, credential_id, max_concurrent, &trade, current, &reason, now).await?;
                    report.closed += 1;
                    return Ok(());
                }
                RuleFire::ClosePartial { scale_out_percent, reason } => {
                    self.scale_out(gateway, credential_id, max_concurrent, &mut trade, current, scale_out_percent, &reason, now)
                        .await?;
                    report.scaled_out += 1;
                }
            }
        }

        if let Some(rule) = trailing_rule(&rules) {
            if let Some(new_sl) = next_stop_loss(&trade, rule, pnl_percent, current) {
                self.store.update_stop_loss(trade.id, new_sl).await?;
                trade.stop_loss = Some(new_sl);
                report.trailed += 1;
            }
        }

        let minutes_open = (now - trade.opened_at.expect("open trade carries opened_at")).num_minutes();
        if minutes_open >= MAX_TIME_IN_POSITION_MINUTES {
            self.close_full(gateway, credential_id, max_concurrent, &trade, current, "maximum time in position exceeded", now)
                .await?;
            report.closed += 1;
            return Ok(());
        }

        if pnl_percent <= EMERGENCY_STOP_PNL_PERCENT {
            self.close_full(gateway, credential_id, max_concurrent, &trade, current, "Emergency stop - excessive loss", now)
                .await?;
            report.closed += 1;
        }

        Ok(())
    }

    async fn close_full(
        &self,
        gateway: &Arc<BrokerGateway>,
        credential_id: Uuid,
        max_concurrent: u32,
        trade: &Trade,
        exit_price: Decimal,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PositionMonitorError> {
        let deal_id = trade.broker_deal_id.clone().unwrap_or_default();
        {
            let _lease = self.lease(credential_id, max_concurrent).await?;
            gateway.close_position(&deal_id, trade.direction, trade.quantity).await?;
        }
        let profit_loss = realised_pnl(trade, exit_price, trade.quantity);
        self.store.close_trade(trade.id, now, profit_loss, reason).await
    }

    async fn scale_out(
        &self,
        gateway: &Arc<BrokerGateway>,
        credential_id: Uuid,
        max_concurrent: u32,
        trade: &mut Trade,
        exit_price: Decimal,
        scale_out_percent: f64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PositionMonitorError> {
        let fraction = Decimal::from_f64(scale_out_percent / 100.0).unwrap_or_default();
        let closed_quantity = trade.quantity * fraction;
        let remaining_quantity = trade.quantity - closed_quantity;

        let deal_id = trade.broker_deal_id.clone().unwrap_or_default();
        {
            let _lease = self.lease(credential_id, max_concurrent).await?;
            gateway.close_position(&deal_id, trade.direction, closed_quantity).await?;
        }

        let profit_loss = realised_pnl(trade, exit_price, closed_quantity);
        let closed_portion = Trade {
            id: Uuid::new_v4(),
            bot_id: trade.bot_id,
            credential_id: trade.credential_id,
            symbol: trade.symbol.clone(),
            direction: trade.direction,
            quantity: closed_quantity,
            entry_price: trade.entry_price,
            stop_loss: trade.stop_loss,
            take_profit: trade.take_profit,
            current_price: Some(exit_price),
            status: TradeStatus::Closed,
            opened_at: trade.opened_at,
            closed_at: Some(now),
            broker_deal_id: Some(format!("{deal_id}-partial")),
            profit_loss: Some(profit_loss),
            rationale: "Partial".into(),
            ai_confidence: trade.ai_confidence,
            evaluation_id: trade.evaluation_id,
        };
        tracing::info!(trade_id = %trade.id, %reason, %scale_out_percent, "scaling out of position");
        self.store.scale_out(trade.id, remaining_quantity, closed_portion).await?;
        trade.quantity = remaining_quantity;
        Ok(())
    }

    /// Reconciles broker-reported positions against local Trade rows for
    /// unfamiliar deal ids — the "position-sync tick" the ledger's ownership
    /// rules are written for.
    pub async fn sync(&self, credential_id: Uuid, max_concurrent: u32) -> Result<SyncReport, PositionMonitorError> {
        let gateway = self.gateway_for(credential_id)?;
        let positions = {
            let _lease = self.lease(credential_id, max_concurrent).await?;
            gateway.list_positions().await?
        };

        let monitored = self.store.load_open_trades(credential_id).await?;
        let trades: Vec<Trade> = monitored.into_iter().map(|m| m.trade).collect();

        let mut open_counts: HashMap<Uuid, u32> = HashMap::new();
        for t in &trades {
            if matches!(t.status, TradeStatus::Open | TradeStatus::Pending) {
                *open_counts.entry(t.bot_id).or_insert(0) += 1;
            }
        }
        let mut max_open: HashMap<Uuid, u32> = HashMap::new();
        for bot_id in open_counts.keys().copied().collect::<Vec<_>>() {
            let cap = self.store.max_open_trades(bot_id).await?;
            max_open.insert(bot_id, cap);
        }

        let now = Utc::now();
        let mut report = SyncReport::default();

        for position in positions {
            if self.ledger.owner_of(&position.deal_id).is_some() {
                continue;
            }
            let symbol = position.symbol.clone();
            match self.ledger.attribute(
                &position,
                &trades,
                |bot_id| open_counts.get(&bot_id).copied().unwrap_or(0),
                |bot_id| max_open.get(&bot_id).copied().unwrap_or(0),
                now,
            ) {
                Ok(ownership) => {
                    report.attributed += 1;
                    if let Some(matched) = trades
                        .iter()
                        .find(|t| t.bot_id == ownership.bot_id && t.symbol == symbol && t.broker_deal_id.is_none())
                    {
                        self.store.set_broker_deal_id(matched.id, position.deal_id.clone()).await?;
                    }
                }
                Err(_) => report.orphaned += 1,
            }
        }

        Ok(report)
    }
}

fn realised_pnl(trade: &Trade, exit_price: Decimal, quantity: Decimal) -> Decimal {
    match trade.direction {
        Direction::Buy => (exit_price - trade.entry_price) * quantity,
        Direction::Sell => (trade.entry_price - exit_price) * quantity,
    }
}
